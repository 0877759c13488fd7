//! Core type definitions for roster

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ordered step of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub description: String,
    /// What the step needs from the outside world (a capability, a data source, ...)
    pub requirement: String,
}

impl WorkflowStep {
    pub fn new(description: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            requirement: requirement.into(),
        }
    }
}

/// A decomposed unit of the job description
///
/// Produced once by the decomposer and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// The job description this workflow was cut from
    pub original_description: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    /// When the workflow should run ("every monday", "when an invoice arrives", ...)
    pub activation: String,
}

impl Workflow {
    /// Catch-all workflow covering the whole job description.
    ///
    /// Used when decomposition output cannot be validated.
    pub fn generic(job_description: &str) -> Self {
        Self {
            original_description: job_description.to_string(),
            description: job_description.to_string(),
            steps: vec![
                WorkflowStep::new(
                    "Gather the information the job description refers to",
                    "A capability that can read the relevant data",
                ),
                WorkflowStep::new(
                    "Carry out the work the job description asks for",
                    "A capability that can act on the relevant data",
                ),
            ],
            activation: "As described in the job description".to_string(),
        }
    }
}

/// Opaque capability identifier copied from a catalog response
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRef {
    pub provider_id: String,
    pub id: String,
}

impl CapabilityRef {
    pub fn new(provider_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for CapabilityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.id)
    }
}

impl std::str::FromStr for CapabilityRef {
    type Err = String;

    /// Parses `providerId/id`; the id itself may contain further slashes
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((provider, id)) if !provider.is_empty() && !id.is_empty() => {
                Ok(Self::new(provider, id))
            }
            _ => Err(format!("Invalid capability '{}', expected providerId/id", s)),
        }
    }
}

/// Opaque trigger identifier copied from a catalog response
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRef {
    pub provider_id: String,
    pub id: String,
}

impl TriggerRef {
    pub fn new(provider_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for TriggerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.id)
    }
}

/// The trigger an agent is activated by, with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTrigger {
    #[serde(flatten)]
    pub reference: TriggerRef,
    #[serde(default)]
    pub trigger_params: serde_json::Value,
}

/// Matched agent before its behavior prompt is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDraft {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<CapabilityRef>,
    pub trigger: AgentTrigger,
}

impl AgentDraft {
    /// Finish the draft with its natural-language operating instructions
    pub fn with_prompt(self, prompt: impl Into<String>) -> Agent {
        Agent {
            id: None,
            name: self.name,
            description: self.description,
            capabilities: self.capabilities,
            trigger: self.trigger,
            prompt: prompt.into(),
        }
    }
}

/// Terminal successful outcome of a branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub capabilities: Vec<CapabilityRef>,
    pub trigger: AgentTrigger,
    pub prompt: String,
}

/// Terminal outcome of a branch when nothing in the catalog fits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsatisfiedWorkflow {
    pub description: String,
    pub explanation: String,
}

impl UnsatisfiedWorkflow {
    pub fn new(description: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            explanation: explanation.into(),
        }
    }
}

/// One human question/answer pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub question: String,
    pub answer: String,
    /// Identifier of the tool call that asked the question
    pub node_context: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        node_context: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            node_context: node_context.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Terminal outcome of one branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BranchOutcome {
    Agent(Agent),
    Unsatisfied(UnsatisfiedWorkflow),
}

/// A branch that ended with an engine-local error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchFailure {
    pub branch_id: String,
    pub workflow_description: String,
    pub error: String,
}

/// The joined result of a thread
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiEmployee {
    pub name: String,
    pub description: String,
    pub unsatisfied_workflows: Vec<UnsatisfiedWorkflow>,
    pub agents: Vec<Agent>,
}

impl AiEmployee {
    /// Total number of branch outcomes in this result
    pub fn outcome_count(&self) -> usize {
        self.agents.len() + self.unsatisfied_workflows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capability_ref_parse() {
        let parsed: CapabilityRef = "shop/pricing.update".parse().unwrap();
        assert_eq!(parsed, CapabilityRef::new("shop", "pricing.update"));
        assert_eq!(parsed.to_string(), "shop/pricing.update");
        assert!("pricing.update".parse::<CapabilityRef>().is_err());
        assert!("/pricing.update".parse::<CapabilityRef>().is_err());
    }

    fn draft() -> AgentDraft {
        AgentDraft {
            name: "Pricing bot".to_string(),
            description: "Adjusts prices".to_string(),
            capabilities: vec![CapabilityRef::new("shop", "pricing.update")],
            trigger: AgentTrigger {
                reference: TriggerRef::new("scheduler", "cron"),
                trigger_params: json!({"expression": "0 9 * * 1"}),
            },
        }
    }

    #[test]
    fn test_draft_with_prompt() {
        let agent = draft().with_prompt("Check prices every monday");
        assert_eq!(agent.name, "Pricing bot");
        assert_eq!(agent.prompt, "Check prices every monday");
        assert!(agent.id.is_none());
    }

    #[test]
    fn test_agent_wire_format() {
        let agent = draft().with_prompt("p");
        let value = serde_json::to_value(&agent).unwrap();
        assert_eq!(value["capabilities"][0]["providerId"], "shop");
        // Trigger reference is flattened next to its params
        assert_eq!(value["trigger"]["id"], "cron");
        assert_eq!(value["trigger"]["triggerParams"]["expression"], "0 9 * * 1");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_generic_workflow_has_multiple_steps() {
        let workflow = Workflow::generic("Do the books");
        assert_eq!(workflow.original_description, "Do the books");
        assert!(workflow.steps.len() > 1);
        assert!(workflow.steps.iter().all(|s| !s.requirement.is_empty()));
    }

    #[test]
    fn test_branch_outcome_tagging() {
        let outcome = BranchOutcome::Unsatisfied(UnsatisfiedWorkflow::new("taxes", "no filing api"));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["kind"], "unsatisfied");
        assert_eq!(value["explanation"], "no filing api");
    }

    #[test]
    fn test_outcome_count() {
        let employee = AiEmployee {
            name: "n".into(),
            description: "d".into(),
            unsatisfied_workflows: vec![UnsatisfiedWorkflow::new("a", "b")],
            agents: vec![draft().with_prompt("p")],
        };
        assert_eq!(employee.outcome_count(), 2);
    }
}
