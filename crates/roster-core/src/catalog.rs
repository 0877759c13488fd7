//! Capability/trigger catalog interface
//!
//! The catalog is an external read-only service. The engine receives it
//! through its execution context, never through a global.

use crate::{CapabilityRef, Result, RiskLevel, RosterError, TriggerRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single invocable action offered by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInfo {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub params_schema: serde_json::Value,
    #[serde(default)]
    pub risk: RiskLevel,
}

/// Capabilities grouped by provider, as the catalog returns them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProvider {
    pub provider_id: String,
    pub capabilities: Vec<CapabilityInfo>,
}

/// An activation event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInfo {
    pub id: String,
    pub provider_id: String,
    pub description: String,
}

impl TriggerInfo {
    pub fn reference(&self) -> TriggerRef {
        TriggerRef::new(&self.provider_id, &self.id)
    }
}

/// Read-only catalog queries
#[async_trait]
pub trait Catalog: Send + Sync {
    /// List capabilities grouped by provider
    async fn capabilities(&self) -> Result<Vec<CapabilityProvider>>;

    /// List triggers
    async fn triggers(&self) -> Result<Vec<TriggerInfo>>;
}

/// In-memory catalog, also loadable from a JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub capabilities: Vec<CapabilityProvider>,
    #[serde(default)]
    pub triggers: Vec<TriggerInfo>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability under `provider_id`, creating the provider entry if needed
    pub fn with_capability(
        mut self,
        provider_id: &str,
        id: &str,
        description: &str,
        risk: RiskLevel,
    ) -> Self {
        let info = CapabilityInfo {
            id: id.to_string(),
            description: description.to_string(),
            params_schema: serde_json::json!({ "type": "object" }),
            risk,
        };
        match self
            .capabilities
            .iter_mut()
            .find(|p| p.provider_id == provider_id)
        {
            Some(provider) => provider.capabilities.push(info),
            None => self.capabilities.push(CapabilityProvider {
                provider_id: provider_id.to_string(),
                capabilities: vec![info],
            }),
        }
        self
    }

    pub fn with_trigger(mut self, provider_id: &str, id: &str, description: &str) -> Self {
        self.triggers.push(TriggerInfo {
            id: id.to_string(),
            provider_id: provider_id.to_string(),
            description: description.to_string(),
        });
        self
    }

    /// Load a catalog from a JSON file of the shape `{capabilities: [...], triggers: [...]}`
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            RosterError::Catalog(format!("Failed to parse catalog {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn capabilities(&self) -> Result<Vec<CapabilityProvider>> {
        Ok(self.capabilities.clone())
    }

    async fn triggers(&self) -> Result<Vec<TriggerInfo>> {
        Ok(self.triggers.clone())
    }
}

/// Find a capability in a catalog response
pub fn find_capability<'a>(
    providers: &'a [CapabilityProvider],
    capability: &CapabilityRef,
) -> Option<&'a CapabilityInfo> {
    providers
        .iter()
        .filter(|p| p.provider_id == capability.provider_id)
        .flat_map(|p| p.capabilities.iter())
        .find(|c| c.id == capability.id)
}
