//! Matcher answer parsing and identifier checks
//!
//! Identifiers on a matched agent must come from the catalog responses the
//! branch actually received. Anything else is stripped and reported so the
//! model can be asked again.

use roster_core::{
    find_capability, AgentDraft, AgentTrigger, CapabilityProvider, CapabilityRef, Result,
    RosterError, TriggerInfo, TriggerRef, UnsatisfiedWorkflow, Workflow,
};
use serde::Deserialize;
use serde_json::Value;

/// What the matcher concluded for one workflow
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Agent(AgentDraft),
    Unsatisfied(UnsatisfiedWorkflow),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMatch {
    #[serde(default)]
    agent: Option<RawAgent>,
    #[serde(default)]
    unsatisfied_workflow: Option<RawUnsatisfied>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAgent {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    capabilities: Vec<CapabilityRef>,
    trigger: Option<AgentTrigger>,
}

#[derive(Debug, Deserialize)]
struct RawUnsatisfied {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    explanation: String,
}

/// Parse a matcher answer of the shape `{agent}` or `{unsatisfiedWorkflow}`
pub fn parse_match(workflow: &Workflow, answer: &Value) -> Result<MatchResult> {
    let raw: RawMatch = serde_json::from_value(answer.clone())
        .map_err(|e| RosterError::Matching(format!("answer does not match the schema: {}", e)))?;

    match (raw.agent, raw.unsatisfied_workflow) {
        (Some(_), Some(_)) => Err(RosterError::Matching(
            "answer must contain either an agent or an unsatisfiedWorkflow, not both".to_string(),
        )),
        (None, None) => Err(RosterError::Matching(
            "answer must contain an agent or an unsatisfiedWorkflow".to_string(),
        )),
        (None, Some(unsatisfied)) => {
            if unsatisfied.explanation.trim().is_empty() {
                return Err(RosterError::Matching(
                    "unsatisfiedWorkflow needs a non-empty explanation".to_string(),
                ));
            }
            Ok(MatchResult::Unsatisfied(UnsatisfiedWorkflow::new(
                unsatisfied
                    .description
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| workflow.description.clone()),
                unsatisfied.explanation,
            )))
        }
        (Some(agent), None) => {
            if agent.name.trim().is_empty() {
                return Err(RosterError::Matching("agent needs a name".to_string()));
            }
            if agent.capabilities.is_empty() {
                return Err(RosterError::Matching(
                    "agent needs at least one capability".to_string(),
                ));
            }
            let trigger = agent
                .trigger
                .ok_or_else(|| RosterError::Matching("agent needs a trigger".to_string()))?;

            let description = if agent.description.trim().is_empty() {
                workflow.description.clone()
            } else {
                agent.description
            };

            Ok(MatchResult::Agent(AgentDraft {
                name: agent.name,
                description,
                capabilities: agent.capabilities,
                trigger,
            }))
        }
    }
}

/// A draft with unknown identifiers removed
#[derive(Debug, Clone, PartialEq)]
pub struct Stripped {
    pub capabilities: Vec<CapabilityRef>,
    pub trigger: Option<TriggerRef>,
    /// Identifiers that were not present in the catalog responses
    pub rejected: Vec<String>,
}

/// Remove identifiers that the given catalog responses do not contain
pub fn strip_fabricated(
    draft: &AgentDraft,
    capabilities: &[CapabilityProvider],
    triggers: &[TriggerInfo],
) -> Stripped {
    let mut rejected = Vec::new();

    let kept = draft
        .capabilities
        .iter()
        .filter(|capability| {
            let known = find_capability(capabilities, capability).is_some();
            if !known {
                rejected.push(format!("capability {}", capability));
            }
            known
        })
        .cloned()
        .collect();

    let reference = &draft.trigger.reference;
    let trigger = if triggers.iter().any(|t| &t.reference() == reference) {
        Some(reference.clone())
    } else {
        rejected.push(format!("trigger {}", reference));
        None
    };

    Stripped {
        capabilities: kept,
        trigger,
        rejected,
    }
}

/// Accept a draft only if all its identifiers are known
///
/// The error message lists the rejected identifiers and what would remain
/// after stripping them, which is what the model is re-asked with.
pub fn check_identifiers(
    draft: &AgentDraft,
    capabilities: &[CapabilityProvider],
    triggers: &[TriggerInfo],
) -> Result<()> {
    let stripped = strip_fabricated(draft, capabilities, triggers);
    if stripped.rejected.is_empty() {
        return Ok(());
    }

    let remaining: Vec<String> = stripped
        .capabilities
        .iter()
        .map(ToString::to_string)
        .chain(stripped.trigger.iter().map(|t| format!("trigger {}", t)))
        .collect();

    Err(RosterError::Matching(format!(
        "these identifiers were not returned by the most recent catalog responses: {}. \
         Only use identifiers copied from fetch_capabilities and fetch_triggers results. \
         Still valid: [{}]",
        stripped.rejected.join(", "),
        remaining.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::{RiskLevel, StaticCatalog};
    use serde_json::json;

    fn workflow() -> Workflow {
        Workflow::generic("Monitor inventory and adjust pricing")
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_capability("shop", "inventory.read", "Read stock", RiskLevel::Low)
            .with_capability("shop", "pricing.update", "Change prices", RiskLevel::Medium)
            .with_trigger("scheduler", "cron", "Runs on a schedule")
    }

    fn agent_answer(capabilities: Value, trigger_id: &str) -> Value {
        json!({
            "agent": {
                "name": "Pricing bot",
                "description": "Keeps prices in line with stock",
                "capabilities": capabilities,
                "trigger": {
                    "providerId": "scheduler",
                    "id": trigger_id,
                    "triggerParams": {"cron": "0 9 * * *"}
                }
            }
        })
    }

    #[test]
    fn test_parse_agent() {
        let answer = agent_answer(
            json!([{"providerId": "shop", "id": "inventory.read"}]),
            "cron",
        );
        match parse_match(&workflow(), &answer).unwrap() {
            MatchResult::Agent(draft) => {
                assert_eq!(draft.name, "Pricing bot");
                assert_eq!(draft.trigger.reference, TriggerRef::new("scheduler", "cron"));
                assert_eq!(draft.trigger.trigger_params["cron"], "0 9 * * *");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_unsatisfied() {
        let answer = json!({"unsatisfiedWorkflow": {"explanation": "No tax filing capability"}});
        match parse_match(&workflow(), &answer).unwrap() {
            MatchResult::Unsatisfied(u) => {
                assert_eq!(u.description, workflow().description);
                assert_eq!(u.explanation, "No tax filing capability");
            }
            other => panic!("unexpected {:?}", other),
        }

        let empty = json!({"unsatisfiedWorkflow": {"explanation": ""}});
        assert!(parse_match(&workflow(), &empty).is_err());
    }

    #[test]
    fn test_parse_rejects_both_or_neither() {
        let both = json!({
            "agent": {"name": "x", "capabilities": [], "trigger": null},
            "unsatisfiedWorkflow": {"explanation": "y"}
        });
        assert!(parse_match(&workflow(), &both).is_err());
        assert!(parse_match(&workflow(), &json!({})).is_err());
    }

    #[test]
    fn test_parse_rejects_agent_without_capabilities() {
        let answer = agent_answer(json!([]), "cron");
        assert!(parse_match(&workflow(), &answer).is_err());
    }

    #[test]
    fn test_strip_fabricated() {
        let catalog = catalog();
        let answer = agent_answer(
            json!([
                {"providerId": "shop", "id": "inventory.read"},
                {"providerId": "shop", "id": "tax.file"}
            ]),
            "webhook",
        );
        let MatchResult::Agent(draft) = parse_match(&workflow(), &answer).unwrap() else {
            panic!("expected agent");
        };

        let stripped = strip_fabricated(&draft, &catalog.capabilities, &catalog.triggers);
        assert_eq!(
            stripped.capabilities,
            vec![CapabilityRef::new("shop", "inventory.read")]
        );
        assert_eq!(stripped.trigger, None);
        assert_eq!(
            stripped.rejected,
            vec!["capability shop/tax.file", "trigger scheduler/webhook"]
        );

        let err = check_identifiers(&draft, &catalog.capabilities, &catalog.triggers).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("shop/tax.file"));
        assert!(message.contains("Still valid: [shop/inventory.read]"));
    }

    #[test]
    fn test_known_identifiers_pass() {
        let catalog = catalog();
        let answer = agent_answer(
            json!([
                {"providerId": "shop", "id": "inventory.read"},
                {"providerId": "shop", "id": "pricing.update"}
            ]),
            "cron",
        );
        let MatchResult::Agent(draft) = parse_match(&workflow(), &answer).unwrap() else {
            panic!("expected agent");
        };
        assert!(check_identifiers(&draft, &catalog.capabilities, &catalog.triggers).is_ok());

        // Nothing is known when no catalog response was received
        assert!(check_identifiers(&draft, &[], &[]).is_err());
    }
}
