//! Per-call execution context
//!
//! Everything a thread needs from the caller is passed in explicitly; the
//! engine reads no ambient globals.

use crate::approval::{ApprovalGate, CapabilityInvoker, GatedInvoker};
use roster_core::{ApprovalPolicy, Catalog, ConversationEntry};
use std::sync::Arc;

#[derive(Clone)]
pub struct ExecutionContext {
    /// Catalog queried by the matcher
    pub catalog: Arc<dyn Catalog>,
    /// Organization the catalog is scoped to, for logs
    pub organization_id: Option<String>,
    /// Answers given before the thread started
    pub conversation: Vec<ConversationEntry>,
    /// Risk levels whose capabilities wait for a human approval
    pub approval: ApprovalPolicy,
}

impl ExecutionContext {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            organization_id: None,
            conversation: Vec::new(),
            approval: ApprovalPolicy::default(),
        }
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_conversation(mut self, conversation: Vec<ConversationEntry>) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn with_approval(mut self, approval: ApprovalPolicy) -> Self {
        self.approval = approval;
        self
    }

    /// Approval gate over this context's catalog and policy
    pub fn approval_gate(&self) -> ApprovalGate {
        ApprovalGate::new(self.catalog.clone(), self.approval.clone())
    }

    /// Wrap `inner` so invocations go through [`ExecutionContext::approval_gate`]
    pub fn gated(&self, inner: Arc<dyn CapabilityInvoker>) -> GatedInvoker {
        GatedInvoker::with_gate(inner, self.approval_gate())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("organization_id", &self.organization_id)
            .field("conversation", &self.conversation.len())
            .field("approval", &self.approval)
            .finish_non_exhaustive()
    }
}
