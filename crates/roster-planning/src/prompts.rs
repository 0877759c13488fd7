//! Prompt templates and response schemas for the three reasoning stages

use roster_core::{AgentDraft, ConversationEntry, Workflow};
use serde_json::{json, Value};

/// System prompt for decomposing a job description
pub const DECOMPOSER_SYSTEM: &str = "\
You split a job description into independent workflows that software agents can run.

Rules:
- Each workflow is a self-contained piece of recurring work with its own activation \
(a schedule or an event).
- Each workflow has MORE THAN ONE step, and every step states its requirement: the \
data source, integration or action it depends on.
- Do not merge unrelated work into one workflow and do not split one piece of work \
across workflows.
- If the job description is ambiguous in a way that changes the decomposition, call \
ask_human with one precise question. Never ask something already answered.
- Deliver the result by calling submit_result.";

/// System prompt for matching a workflow against the catalog
pub const MATCHER_SYSTEM: &str = "\
You decide whether a workflow can be automated with the capabilities and triggers \
available to this organization.

Rules:
- Call fetch_capabilities and fetch_triggers before answering.
- Only use providerId/id pairs exactly as they appear in those results. Never invent \
identifiers.
- If the available capabilities cover every step, answer with an agent: a name, a \
short description, the capabilities it needs and one trigger with its triggerParams.
- If they do not, answer with an unsatisfiedWorkflow whose explanation names what is \
missing.
- If a choice depends on information only the human has, call ask_human. Never ask \
something already answered.
- Deliver the result by calling submit_result.";

/// System prompt for writing an agent's behavior prompt
pub const ASSEMBLER_SYSTEM: &str = "\
You write the operating instructions for an autonomous agent.

The instructions are read by the agent every time its trigger fires. Describe, step \
by step, how to carry out the workflow using exactly the capabilities it was given, \
what to check before acting, and when to stop. Refer to capabilities by id.
If something essential is unclear, call ask_human. Never ask something already \
answered.
Deliver the result by calling submit_result.";

/// Schema of the decomposer answer
pub fn decomposition_schema() -> Value {
    json!({
        "type": "object",
        "required": ["workflows"],
        "properties": {
            "name": {"type": "string", "description": "Short name for the AI employee"},
            "description": {"type": "string"},
            "workflows": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["description", "steps", "activation"],
                    "properties": {
                        "originalDescription": {"type": "string"},
                        "description": {"type": "string"},
                        "steps": {
                            "type": "array",
                            "minItems": 2,
                            "items": {
                                "type": "object",
                                "required": ["description", "requirement"],
                                "properties": {
                                    "description": {"type": "string"},
                                    "requirement": {"type": "string", "minLength": 1}
                                }
                            }
                        },
                        "activation": {"type": "string"}
                    }
                }
            }
        }
    })
}

fn reference_schema() -> Value {
    json!({
        "type": "object",
        "required": ["providerId", "id"],
        "properties": {
            "providerId": {"type": "string"},
            "id": {"type": "string"}
        }
    })
}

/// Schema of the matcher answer
pub fn match_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "agent": {
                "type": "object",
                "required": ["name", "description", "capabilities", "trigger"],
                "properties": {
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                    "capabilities": {"type": "array", "minItems": 1, "items": reference_schema()},
                    "trigger": {
                        "type": "object",
                        "required": ["providerId", "id"],
                        "properties": {
                            "providerId": {"type": "string"},
                            "id": {"type": "string"},
                            "triggerParams": {"type": "object"}
                        }
                    }
                }
            },
            "unsatisfiedWorkflow": {
                "type": "object",
                "required": ["explanation"],
                "properties": {
                    "description": {"type": "string"},
                    "explanation": {"type": "string", "minLength": 1}
                }
            }
        }
    })
}

/// Schema of the assembler answer
pub fn assembly_schema() -> Value {
    json!({
        "type": "object",
        "required": ["prompt"],
        "properties": {
            "prompt": {"type": "string", "minLength": 1}
        }
    })
}

fn render_history(history: &[ConversationEntry]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\n## Answers already given by the human\n");
    for entry in history {
        out.push_str(&format!("- Q: {}\n  A: {}\n", entry.question, entry.answer));
    }
    out
}

fn render_workflow(workflow: &Workflow) -> String {
    let steps: Vec<String> = workflow
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {} (requires: {})", i + 1, step.description, step.requirement))
        .collect();

    format!(
        "## Workflow\n{}\n\nActivation: {}\n\nSteps:\n{}\n\nPart of the job: {}",
        workflow.description,
        workflow.activation,
        steps.join("\n"),
        workflow.original_description
    )
}

/// First user message for the decomposer
pub fn decomposition_request(job_description: &str, history: &[ConversationEntry]) -> String {
    format!(
        "## Job description\n{}{}",
        job_description.trim(),
        render_history(history)
    )
}

/// First user message for the matcher
pub fn matching_request(workflow: &Workflow, history: &[ConversationEntry]) -> String {
    format!("{}{}", render_workflow(workflow), render_history(history))
}

/// First user message for the assembler
pub fn assembly_request(
    workflow: &Workflow,
    draft: &AgentDraft,
    history: &[ConversationEntry],
) -> String {
    let capabilities: Vec<String> = draft.capabilities.iter().map(ToString::to_string).collect();
    format!(
        "{}\n\n## Agent\nName: {}\nDescription: {}\nCapabilities: {}\nTrigger: {} {}{}",
        render_workflow(workflow),
        draft.name,
        draft.description,
        capabilities.join(", "),
        draft.trigger.reference,
        draft.trigger.trigger_params,
        render_history(history)
    )
}
