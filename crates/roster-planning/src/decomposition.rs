//! Job description decomposition gate
//!
//! A decomposition is only accepted when every workflow has more than one step
//! and every step names its requirement. Anything else is rejected with a
//! reason the model can act on; once retries run out the caller falls back to
//! a single generic workflow.

use roster_core::{Result, RosterError, Workflow, WorkflowStep};
use serde::Deserialize;
use serde_json::Value;

const MAX_NAME_WORDS: usize = 6;

/// Validated decomposer output
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub name: String,
    pub description: String,
    pub workflows: Vec<Workflow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDecomposition {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    workflows: Vec<RawWorkflow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWorkflow {
    #[serde(default)]
    original_description: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    steps: Vec<RawStep>,
    #[serde(default)]
    activation: String,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    description: String,
    #[serde(default)]
    requirement: Option<String>,
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Validate a decomposer answer against the job it was produced for
pub fn parse_decomposition(job_description: &str, answer: &Value) -> Result<Decomposition> {
    let raw: RawDecomposition = serde_json::from_value(answer.clone()).map_err(|e| {
        RosterError::Decomposition(format!("answer does not match the schema: {}", e))
    })?;

    if raw.workflows.is_empty() {
        return Err(RosterError::Decomposition(
            "no workflows were returned".to_string(),
        ));
    }

    let mut workflows = Vec::with_capacity(raw.workflows.len());
    for (index, workflow) in raw.workflows.into_iter().enumerate() {
        let label = format!("workflow {} ('{}')", index + 1, workflow.description.trim());

        if blank(&workflow.description) {
            return Err(RosterError::Decomposition(format!(
                "workflow {} has an empty description",
                index + 1
            )));
        }
        if workflow.steps.len() < 2 {
            return Err(RosterError::Decomposition(format!(
                "{} has {} step(s); every workflow needs more than one step",
                label,
                workflow.steps.len()
            )));
        }

        let mut steps = Vec::with_capacity(workflow.steps.len());
        for (step_index, step) in workflow.steps.into_iter().enumerate() {
            let requirement = step.requirement.unwrap_or_default();
            if blank(&requirement) {
                return Err(RosterError::Decomposition(format!(
                    "step {} of {} has no requirement",
                    step_index + 1,
                    label
                )));
            }
            steps.push(WorkflowStep::new(step.description, requirement));
        }

        workflows.push(Workflow {
            original_description: workflow
                .original_description
                .filter(|d| !blank(d))
                .unwrap_or_else(|| job_description.to_string()),
            description: workflow.description,
            steps,
            activation: workflow.activation,
        });
    }

    let (derived_name, derived_description) = derive_employee(job_description);
    Ok(Decomposition {
        name: raw.name.filter(|n| !blank(n)).unwrap_or(derived_name),
        description: raw
            .description
            .filter(|d| !blank(d))
            .unwrap_or(derived_description),
        workflows,
    })
}

/// Single generic workflow covering the whole job description
pub fn fallback(job_description: &str) -> Decomposition {
    let (name, description) = derive_employee(job_description);
    Decomposition {
        name,
        description,
        workflows: vec![Workflow::generic(job_description)],
    }
}

/// Employee name and description derived from the job description
///
/// The name is the first clause, capped at a handful of words.
pub fn derive_employee(job_description: &str) -> (String, String) {
    let description = job_description.trim().to_string();
    let clause = description
        .split(|c| matches!(c, ';' | '.' | '\n' | ','))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .unwrap_or("");

    let words: Vec<&str> = clause.split_whitespace().take(MAX_NAME_WORDS).collect();
    let name = if words.is_empty() {
        "AI employee".to_string()
    } else {
        let mut name = words.join(" ");
        if let Some(first) = name.get(..1) {
            name = first.to_uppercase() + &name[1..];
        }
        name
    };

    (name, description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const JOB: &str = "Monitor inventory and adjust pricing; notify finance weekly";

    fn two_workflows() -> Value {
        json!({
            "name": "Store operator",
            "workflows": [
                {
                    "description": "Adjust pricing from inventory levels",
                    "steps": [
                        {"description": "Read stock levels", "requirement": "inventory read access"},
                        {"description": "Update prices", "requirement": "pricing write access"}
                    ],
                    "activation": "daily"
                },
                {
                    "originalDescription": "notify finance weekly",
                    "description": "Weekly finance notification",
                    "steps": [
                        {"description": "Summarize the week", "requirement": "inventory read access"},
                        {"description": "Send to finance", "requirement": "finance notification channel"}
                    ],
                    "activation": "every monday"
                }
            ]
        })
    }

    #[test]
    fn test_valid_decomposition() {
        let decomposition = parse_decomposition(JOB, &two_workflows()).unwrap();
        assert_eq!(decomposition.workflows.len(), 2);
        assert_eq!(decomposition.name, "Store operator");
        assert_eq!(decomposition.description, JOB);
        assert_eq!(decomposition.workflows[0].original_description, JOB);
        assert_eq!(
            decomposition.workflows[1].original_description,
            "notify finance weekly"
        );
    }

    #[test]
    fn test_single_step_workflow_rejected() {
        let answer = json!({
            "workflows": [{
                "description": "Do everything",
                "steps": [{"description": "Everything", "requirement": "magic"}],
                "activation": "always"
            }]
        });
        let err = parse_decomposition(JOB, &answer).unwrap_err();
        assert!(matches!(err, RosterError::Decomposition(ref m) if m.contains("more than one step")));
    }

    #[test]
    fn test_missing_requirement_rejected() {
        let answer = json!({
            "workflows": [{
                "description": "Pricing",
                "steps": [
                    {"description": "Read stock", "requirement": "inventory"},
                    {"description": "Update prices", "requirement": "  "}
                ],
                "activation": "daily"
            }]
        });
        let err = parse_decomposition(JOB, &answer).unwrap_err();
        assert!(err.to_string().contains("no requirement"));

        let answer = json!({
            "workflows": [{
                "description": "Pricing",
                "steps": [
                    {"description": "Read stock", "requirement": "inventory"},
                    {"description": "Update prices"}
                ]
            }]
        });
        assert!(parse_decomposition(JOB, &answer).is_err());
    }

    #[test]
    fn test_malformed_answers_rejected() {
        assert!(parse_decomposition(JOB, &json!({"workflows": []})).is_err());
        assert!(parse_decomposition(JOB, &json!("just text")).is_err());
        assert!(parse_decomposition(JOB, &json!({"flows": []})).is_err());
    }

    #[test]
    fn test_fallback_is_single_generic_workflow() {
        let decomposition = fallback(JOB);
        assert_eq!(decomposition.workflows, vec![Workflow::generic(JOB)]);
        assert!(decomposition.workflows[0].steps.len() > 1);
        assert_eq!(decomposition.name, "Monitor inventory and adjust pricing");
    }

    #[test]
    fn test_derive_employee() {
        let (name, description) = derive_employee("  file our tax return every year  ");
        assert_eq!(name, "File our tax return every year");
        assert_eq!(description, "file our tax return every year");

        let (name, _) = derive_employee("");
        assert_eq!(name, "AI employee");

        let (name, _) = derive_employee("one two three four five six seven eight");
        assert_eq!(name, "One two three four five six");
    }
}
