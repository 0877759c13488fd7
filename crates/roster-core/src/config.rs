//! Configuration management for roster
//!
//! Engine limits, model selection, catalog source, checkpoint location and the
//! approval policy, loaded from `.roster/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{ApprovalPolicy, Result, RiskLevel, RosterError};

/// Repository-level roster configuration
///
/// Loaded from `.roster/config.toml` in the working directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Execution limits
    #[serde(default)]
    pub engine: EngineConfig,

    /// Model selection
    #[serde(default)]
    pub model: ModelSection,

    /// Where capabilities and triggers come from
    #[serde(default)]
    pub catalog: CatalogSection,

    /// Checkpoint storage
    #[serde(default)]
    pub store: StoreSection,

    /// Capability approval policy
    #[serde(default)]
    pub approval: ApprovalSection,
}

/// How branches are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    #[default]
    Concurrent,
    Sequential,
}

/// Engine execution limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model turns plus tool calls a branch may spend before it is terminated
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,

    /// Corrective re-asks after a final answer fails validation
    #[serde(default = "default_validation_retries")]
    pub validation_retries: usize,

    #[serde(default)]
    pub concurrency: ConcurrencyMode,

    /// Upper bound on branches running at the same time
    #[serde(default = "default_max_parallel_branches")]
    pub max_parallel_branches: usize,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    /// Default model to use (opus, sonnet, haiku)
    #[serde(default = "default_model")]
    pub default: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Environment variable containing API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Catalog source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSection {
    /// JSON catalog file for offline runs
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Base URL of the catalog service
    #[serde(default)]
    pub base_url: Option<String>,

    /// Organization the catalog queries are scoped to
    #[serde(default)]
    pub organization_id: Option<String>,
}

/// Checkpoint storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

/// Risk levels that need a human approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSection {
    #[serde(default = "default_require_approval")]
    pub require_approval: Vec<RiskLevel>,
}

impl ApprovalSection {
    pub fn policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::new(self.require_approval.iter().copied())
    }
}

// Default value providers
fn default_recursion_limit() -> usize {
    25
}

fn default_validation_retries() -> usize {
    1
}

fn default_max_parallel_branches() -> usize {
    8
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_max_tokens() -> usize {
    8192
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".roster/checkpoints")
}

fn default_require_approval() -> Vec<RiskLevel> {
    vec![RiskLevel::High]
}

impl RosterConfig {
    /// Load configuration from `.roster/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".roster/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self = toml::from_str(&content)
                .map_err(|e| RosterError::Config(format!("Failed to parse config file: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.roster/config.toml`
    pub fn write_default(root: &Path) -> Result<PathBuf> {
        let config_dir = root.join(".roster");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| RosterError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.engine.recursion_limit == 0 {
            return Err(RosterError::Config(
                "engine.recursion_limit must be at least 1".to_string(),
            ));
        }
        if self.engine.max_parallel_branches == 0 {
            return Err(RosterError::Config(
                "engine.max_parallel_branches must be at least 1".to_string(),
            ));
        }
        if self.catalog.file.is_some() && self.catalog.base_url.is_some() {
            return Err(RosterError::Config(
                "catalog.file and catalog.base_url are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recursion_limit: default_recursion_limit(),
            validation_retries: default_validation_retries(),
            concurrency: ConcurrencyMode::default(),
            max_parallel_branches: default_max_parallel_branches(),
        }
    }
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            default: default_model(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self {
            require_approval: default_require_approval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = RosterConfig::default();
        assert_eq!(config.engine.recursion_limit, 25);
        assert_eq!(config.engine.validation_retries, 1);
        assert_eq!(config.engine.concurrency, ConcurrencyMode::Concurrent);
        assert_eq!(config.model.default, "sonnet");
        assert!(config.approval.policy().requires_approval(RiskLevel::High));
    }

    #[test]
    fn test_load_missing_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = RosterConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.store.dir, PathBuf::from(".roster/checkpoints"));
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempdir().unwrap();
        let path = RosterConfig::write_default(dir.path()).unwrap();
        assert!(path.exists());

        let config = RosterConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.engine.max_parallel_branches, 8);
    }

    #[test]
    fn test_partial_config() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".roster")).unwrap();
        std::fs::write(
            dir.path().join(".roster/config.toml"),
            "[engine]\nrecursion_limit = 5\nconcurrency = \"sequential\"\n\n[approval]\nrequire_approval = [\"medium\", \"high\"]\n",
        )
        .unwrap();

        let config = RosterConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.engine.recursion_limit, 5);
        assert_eq!(config.engine.validation_retries, 1);
        assert_eq!(config.engine.concurrency, ConcurrencyMode::Sequential);
        assert!(config.approval.policy().requires_approval(RiskLevel::Medium));
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config = RosterConfig::default();
        config.engine.recursion_limit = 0;
        assert!(matches!(config.validate(), Err(RosterError::Config(_))));
    }
}
