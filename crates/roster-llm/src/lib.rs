//! # roster-llm
//!
//! Clients for the external collaborators of the roster engine.
//!
//! - [`LanguageModel`]: one completion call, history and tool specs in,
//!   text and tool calls out
//! - [`AnthropicModel`]: Anthropic Messages API implementation with retry and
//!   a circuit breaker for rate limit protection
//! - [`HttpCatalog`]: capability/trigger catalog service client
//! - [`ScriptedModel`]: closure-driven fake for tests
//!
//! ## Structured answers
//!
//! A model delivers its final structured answer by calling the reserved
//! [`SUBMIT_TOOL`], whose input schema is the expected response schema. A bare
//! JSON text reply is accepted as well.

mod anthropic;
mod auth;
mod catalog_http;
mod circuit_breaker;
mod model;
mod types;

pub use anthropic::AnthropicModel;
pub use auth::get_auth_token;
pub use catalog_http::HttpCatalog;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use model::{LanguageModel, ScriptedModel};
pub use types::*;
