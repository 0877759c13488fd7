//! Authentication for the Anthropic API
//!
//! The key is read from the environment variable named in `model.api_key_env`,
//! falling back to `ANTHROPIC_API_KEY`.

use roster_core::{Result, RosterError};
use std::env;

const FALLBACK_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Get authentication token for Anthropic API
///
/// Priority:
/// 1. The configured variable (`api_key_env`)
/// 2. ANTHROPIC_API_KEY
pub fn get_auth_token(api_key_env: &str) -> Result<String> {
    if let Ok(key) = env::var(api_key_env) {
        if !key.trim().is_empty() {
            tracing::debug!("Using API key from {}", api_key_env);
            return Ok(key);
        }
    }

    if api_key_env != FALLBACK_KEY_ENV {
        if let Ok(key) = env::var(FALLBACK_KEY_ENV) {
            tracing::debug!("Using {}", FALLBACK_KEY_ENV);
            return Ok(key);
        }
    }

    Err(RosterError::Auth(format!(
        "No API key found. Set {} (or {}) to an Anthropic API key",
        api_key_env, FALLBACK_KEY_ENV
    )))
}
