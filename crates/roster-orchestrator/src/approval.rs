//! Capability approval gate
//!
//! Wraps a [`CapabilityInvoker`] so that capabilities whose risk level the
//! [`ApprovalPolicy`] marks as approval-required are not invoked until a human
//! approved them.

use async_trait::async_trait;
use roster_core::{
    find_capability, ApprovalPolicy, CapabilityRef, Catalog, Result, RiskLevel, RosterError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// Executes a capability against its provider
#[async_trait]
pub trait CapabilityInvoker: Send + Sync {
    async fn invoke(&self, capability: &CapabilityRef, params: &Value) -> Result<Value>;
}

/// A human's answer to an approval request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Denied { reason: String },
}

/// What the human is asked to approve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub capability: CapabilityRef,
    pub risk: RiskLevel,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    Completed(Value),
    AwaitingApproval(ApprovalRequest),
    Denied {
        capability: CapabilityRef,
        reason: String,
    },
}

/// Risk assessment of one capability under the approval policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalCheck {
    pub capability: CapabilityRef,
    pub risk: RiskLevel,
    pub requires_approval: bool,
}

/// Looks capabilities up in the catalog and applies the policy table
#[derive(Clone)]
pub struct ApprovalGate {
    catalog: Arc<dyn Catalog>,
    policy: ApprovalPolicy,
}

impl ApprovalGate {
    pub fn new(catalog: Arc<dyn Catalog>, policy: ApprovalPolicy) -> Self {
        Self { catalog, policy }
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Capabilities missing from the catalog have no risk and are an error
    pub async fn check(&self, capability: &CapabilityRef) -> Result<ApprovalCheck> {
        let providers = self.catalog.capabilities().await?;
        let risk = find_capability(&providers, capability)
            .map(|info| info.risk)
            .ok_or_else(|| {
                RosterError::Capability(format!("{} is not in the catalog", capability))
            })?;
        Ok(ApprovalCheck {
            capability: capability.clone(),
            risk,
            requires_approval: self.policy.requires_approval(risk),
        })
    }
}

/// Invoker that consults the approval policy first
pub struct GatedInvoker {
    inner: Arc<dyn CapabilityInvoker>,
    gate: ApprovalGate,
}

impl GatedInvoker {
    pub fn new(
        inner: Arc<dyn CapabilityInvoker>,
        catalog: Arc<dyn Catalog>,
        policy: ApprovalPolicy,
    ) -> Self {
        Self::with_gate(inner, ApprovalGate::new(catalog, policy))
    }

    pub fn with_gate(inner: Arc<dyn CapabilityInvoker>, gate: ApprovalGate) -> Self {
        Self { inner, gate }
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        self.gate.policy()
    }

    /// Invoke `capability` unless it needs an approval that was not given
    ///
    /// A denial never reaches the inner invoker, whatever the risk level.
    #[instrument(skip(self, params, decision), fields(capability = %capability))]
    pub async fn invoke(
        &self,
        capability: &CapabilityRef,
        params: &Value,
        decision: Option<&ApprovalDecision>,
    ) -> Result<InvocationOutcome> {
        if let Some(ApprovalDecision::Denied { reason }) = decision {
            info!("invocation denied: {}", reason);
            return Ok(InvocationOutcome::Denied {
                capability: capability.clone(),
                reason: reason.clone(),
            });
        }

        let check = self.gate.check(capability).await?;
        if check.requires_approval && decision.is_none() {
            info!("{} risk capability awaits approval", check.risk);
            return Ok(InvocationOutcome::AwaitingApproval(ApprovalRequest {
                capability: check.capability,
                risk: check.risk,
                params: params.clone(),
            }));
        }

        let output = self.inner.invoke(capability, params).await?;
        Ok(InvocationOutcome::Completed(output))
    }
}

/// Invoker that records calls and returns a fixed response
#[derive(Debug, Default)]
pub struct MockInvoker {
    response: Value,
    calls: Mutex<Vec<(CapabilityRef, Value)>>,
}

impl MockInvoker {
    pub fn new(response: Value) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(CapabilityRef, Value)> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CapabilityInvoker for MockInvoker {
    async fn invoke(&self, capability: &CapabilityRef, params: &Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((capability.clone(), params.clone()));
        Ok(self.response.clone())
    }
}
