//! Roster Planning - prompts and output gates
//!
//! This crate holds everything about the three reasoning stages that does not
//! need I/O: the prompt text each stage is configured with, the response
//! schemas the model must answer in, and the validation that decides whether an
//! answer is accepted, corrected, or replaced by a fallback.

pub mod assembly;
pub mod decomposition;
pub mod matching;
pub mod prompts;

pub use assembly::parse_assembly;
pub use decomposition::{derive_employee, fallback, parse_decomposition, Decomposition};
pub use matching::{check_identifiers, parse_match, strip_fabricated, MatchResult, Stripped};
