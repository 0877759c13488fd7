//! # roster-core
//!
//! Core types for the roster agent-building engine.
//!
//! A free-text job description is decomposed into workflows, every workflow is
//! matched against a catalog of capabilities and triggers, and each match is
//! assembled into an [`Agent`]. The joined result is an [`AiEmployee`].
//!
//! ## Core Paradigm
//!
//! - Workflows are produced once and are read-only afterwards
//! - Every workflow is owned by exactly one branch
//! - A branch ends as an agent or as an unsatisfied workflow, never both
//! - Catalog identifiers are copied from catalog responses, never invented
//! - Human answers are append-only conversation entries

mod catalog;
pub mod config;
mod error;
pub mod fail_open;
mod risk;
mod types;

pub use catalog::{
    find_capability, Catalog, CapabilityInfo, CapabilityProvider, StaticCatalog, TriggerInfo,
};
pub use config::{
    ApprovalSection, CatalogSection, ConcurrencyMode, EngineConfig, ModelSection, RosterConfig,
    StoreSection,
};
pub use error::{Result, RosterError};
pub use risk::{ApprovalPolicy, RiskLevel};
pub use types::*;
