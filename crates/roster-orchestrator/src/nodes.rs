//! The three reasoning stages as step tasks

use crate::step::{StepConfig, StepState, StepTask};
use crate::tools::Tool;
use roster_core::{AgentDraft, Result, RosterError, Workflow};
use roster_planning::{
    check_identifiers, parse_assembly, parse_decomposition, parse_match, prompts, Decomposition,
    MatchResult,
};
use serde_json::Value;

pub const DECOMPOSER_TAG: &str = "decomposer";
pub const MATCHER_TAG: &str = "matcher";
pub const ASSEMBLER_TAG: &str = "assembler";

/// Splits the job description into workflows
pub struct Decomposer<'a> {
    pub job_description: &'a str,
}

impl StepTask for Decomposer<'_> {
    type Output = Decomposition;

    fn config(&self) -> StepConfig {
        StepConfig {
            tag: DECOMPOSER_TAG,
            system: prompts::DECOMPOSER_SYSTEM,
            tools: vec![Tool::AskHuman],
            required_tools: vec![],
            response_schema: prompts::decomposition_schema(),
        }
    }

    fn accept(&self, answer: &Value, _state: &StepState) -> Result<Decomposition> {
        parse_decomposition(self.job_description, answer)
    }

    fn invalid(&self, reason: String) -> RosterError {
        RosterError::Decomposition(reason)
    }
}

/// Matches one workflow against the catalog
pub struct Matcher<'a> {
    pub workflow: &'a Workflow,
}

impl StepTask for Matcher<'_> {
    type Output = MatchResult;

    fn config(&self) -> StepConfig {
        StepConfig {
            tag: MATCHER_TAG,
            system: prompts::MATCHER_SYSTEM,
            tools: vec![Tool::FetchCapabilities, Tool::FetchTriggers, Tool::AskHuman],
            required_tools: vec![Tool::FetchCapabilities, Tool::FetchTriggers],
            response_schema: prompts::match_schema(),
        }
    }

    fn accept(&self, answer: &Value, state: &StepState) -> Result<MatchResult> {
        let result = parse_match(self.workflow, answer)?;
        if let MatchResult::Agent(ref draft) = result {
            // Only the most recent catalog responses count
            check_identifiers(
                draft,
                state.last_capabilities.as_deref().unwrap_or_default(),
                state.last_triggers.as_deref().unwrap_or_default(),
            )?;
        }
        Ok(result)
    }

    fn invalid(&self, reason: String) -> RosterError {
        RosterError::Matching(reason)
    }
}

/// Writes the behavior prompt of a matched agent
pub struct Assembler<'a> {
    pub workflow: &'a Workflow,
    pub draft: &'a AgentDraft,
}

impl StepTask for Assembler<'_> {
    type Output = String;

    fn config(&self) -> StepConfig {
        StepConfig {
            tag: ASSEMBLER_TAG,
            system: prompts::ASSEMBLER_SYSTEM,
            tools: vec![Tool::AskHuman],
            required_tools: vec![],
            response_schema: prompts::assembly_schema(),
        }
    }

    fn accept(&self, answer: &Value, _state: &StepState) -> Result<String> {
        parse_assembly(answer)
    }

    fn invalid(&self, reason: String) -> RosterError {
        RosterError::Assembly(reason)
    }
}
