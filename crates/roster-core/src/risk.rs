//! Capability risk levels and the approval policy table

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How much damage a capability invocation can do
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Invalid risk level: {}", s)),
        }
    }
}

/// Which risk levels need a human approval before invocation
///
/// An explicit table rather than a membership test on a list, so every level
/// has a defined answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    require_approval: BTreeSet<RiskLevel>,
}

impl ApprovalPolicy {
    pub fn new(levels: impl IntoIterator<Item = RiskLevel>) -> Self {
        Self {
            require_approval: levels.into_iter().collect(),
        }
    }

    /// Policy that never asks
    pub fn permissive() -> Self {
        Self::new([])
    }

    pub fn requires_approval(&self, risk: RiskLevel) -> bool {
        self.require_approval.contains(&risk)
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::new([RiskLevel::High])
    }
}
