//! Shared fixtures: a small catalog and a scripted model that plays all three stages

#![allow(dead_code)]

use roster_core::{EngineConfig, RiskLevel, StaticCatalog};
use roster_llm::{CompletionRequest, ContentBlock, ModelReply, ScriptedModel};
use roster_orchestrator::{Engine, ExecutionContext, NullSink};
use roster_store::CheckpointStore;
use serde_json::{json, Value};
use std::sync::Arc;

pub const INVENTORY_JOB: &str = "Monitor inventory levels daily, adjust prices when stock is low, \
     and email a weekly summary to finance.";
pub const PRICING: &str = "Adjust prices when stock runs low";
pub const FINANCE: &str = "Send the weekly finance summary";

pub const TAX_JOB: &str = "File our quarterly tax return with the IRS.";
pub const TAX: &str = "File the quarterly tax return";

pub const WEEKLY_JOB: &str = "Monitor inventory and adjust pricing; notify finance weekly";
pub const ADJUST_PRICING: &str = "Monitor inventory and adjust pricing";
pub const NOTIFY_FINANCE: &str = "Notify finance weekly";
/// The only capability ids the weekly catalog offers
pub const WEEKLY_CAPABILITIES: [&str; 3] = ["inventory.read", "pricing.update", "finance.notify"];

pub const FINANCE_QUESTION: &str = "How long should the finance summary be?";

pub fn catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_capability("shop", "inventory.read", "Read stock levels", RiskLevel::Low)
        .with_capability("shop", "pricing.update", "Change product prices", RiskLevel::Medium)
        .with_capability("mail", "report.send", "Email a report", RiskLevel::High)
        .with_trigger("scheduler", "cron", "Run on a schedule")
        .with_trigger("shop", "stock.low", "Stock fell below a threshold")
}

/// Three capabilities and a cron trigger
pub fn weekly_catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_capability("store", "inventory.read", "Read stock levels", RiskLevel::Low)
        .with_capability("store", "pricing.update", "Change product prices", RiskLevel::Medium)
        .with_capability("store", "finance.notify", "Notify the finance team", RiskLevel::Low)
        .with_trigger("scheduler", "cron", "Run on a schedule")
}

/// Every `providerId/id` the catalog offers
pub fn catalog_ids() -> Vec<String> {
    let catalog = catalog();
    catalog
        .capabilities
        .iter()
        .flat_map(|p| p.capabilities.iter().map(move |c| format!("{}/{}", p.provider_id, c.id)))
        .collect()
}

pub fn workflow(description: &str, first: &str, second: &str) -> Value {
    json!({
        "description": description,
        "activation": "As described",
        "steps": [
            {"description": first, "requirement": "Read access to the shop"},
            {"description": second, "requirement": "Write access to the target system"}
        ]
    })
}

pub fn agent_answer(name: &str, capabilities: &[(&str, &str)], trigger: (&str, &str)) -> Value {
    let capabilities: Vec<Value> = capabilities
        .iter()
        .map(|(provider, id)| json!({"providerId": provider, "id": id}))
        .collect();
    json!({
        "agent": {
            "name": name,
            "capabilities": capabilities,
            "trigger": {"providerId": trigger.0, "id": trigger.1}
        }
    })
}

pub fn unsatisfied_answer(explanation: &str) -> Value {
    json!({"unsatisfiedWorkflow": {"explanation": explanation}})
}

/// What the scripted model answers, per stage
#[derive(Clone, Default)]
pub struct World {
    pub name: &'static str,
    pub workflows: Vec<Value>,
    /// Matcher answers per workflow description, one per attempt
    pub matches: Vec<(&'static str, Vec<Value>)>,
    /// Assembler asks the human this question once, per workflow description
    pub assembler_questions: Vec<(&'static str, &'static str)>,
    /// Decomposer asks the human this question once
    pub decomposer_question: Option<&'static str>,
    /// Matchers of these workflows fetch forever
    pub looping_matchers: Vec<&'static str>,
}

impl World {
    /// The inventory, pricing and finance shop
    pub fn shop() -> Self {
        Self {
            name: "Shop operator",
            workflows: vec![
                workflow(PRICING, "Read stock levels", "Lower or raise prices"),
                workflow(FINANCE, "Collect the week's sales", "Email finance"),
            ],
            matches: vec![
                (
                    PRICING,
                    vec![agent_answer(
                        "Pricing agent",
                        &[("shop", "inventory.read"), ("shop", "pricing.update")],
                        ("shop", "stock.low"),
                    )],
                ),
                (
                    FINANCE,
                    vec![agent_answer(
                        "Finance reporter",
                        &[("shop", "inventory.read"), ("mail", "report.send")],
                        ("scheduler", "cron"),
                    )],
                ),
            ],
            ..Self::default()
        }
    }

    pub fn tax() -> Self {
        Self {
            name: "Tax clerk",
            workflows: vec![workflow(TAX, "Gather the quarter's income", "Submit the return")],
            matches: vec![(
                TAX,
                vec![unsatisfied_answer(
                    "No capability in the catalog can file a tax return",
                )],
            )],
            ..Self::default()
        }
    }

    /// Inventory pricing plus a weekly finance notice, over [`weekly_catalog`]
    pub fn weekly() -> Self {
        Self {
            name: "Store operator",
            workflows: vec![
                workflow(ADJUST_PRICING, "Read stock levels", "Update prices"),
                workflow(NOTIFY_FINANCE, "Summarize the week", "Notify finance"),
            ],
            matches: vec![
                (
                    ADJUST_PRICING,
                    vec![agent_answer(
                        "Pricing agent",
                        &[("store", "inventory.read"), ("store", "pricing.update")],
                        ("scheduler", "cron"),
                    )],
                ),
                (
                    NOTIFY_FINANCE,
                    vec![agent_answer(
                        "Finance notifier",
                        &[("store", "finance.notify")],
                        ("scheduler", "cron"),
                    )],
                ),
            ],
            ..Self::default()
        }
    }

    pub fn asking_finance(mut self) -> Self {
        self.assembler_questions.push((FINANCE, FINANCE_QUESTION));
        self
    }
}

/// Description of the workflow a matcher or assembler request is about
pub fn workflow_of(request: &CompletionRequest) -> String {
    request
        .first_user_text()
        .strip_prefix("## Workflow\n")
        .and_then(|rest| rest.lines().next())
        .unwrap_or_default()
        .to_string()
}

fn slug(text: &str) -> String {
    text.to_lowercase().replace(' ', "-")
}

fn fetch_both(turn: usize) -> ModelReply {
    ModelReply::new(vec![
        ContentBlock::ToolUse {
            id: format!("caps-{}", turn),
            name: "fetch_capabilities".to_string(),
            input: json!({}),
        },
        ContentBlock::ToolUse {
            id: format!("trig-{}", turn),
            name: "fetch_triggers".to_string(),
            input: json!({}),
        },
    ])
}

pub fn model(world: World) -> ScriptedModel {
    ScriptedModel::new(move |req| {
        let turn = req.messages.len();
        match req.tag.as_str() {
            "decomposer" => {
                if let Some(question) = world.decomposer_question {
                    if req.results_for("ask_human").is_empty() {
                        return Ok(ModelReply::tool_call(
                            "ask-scope",
                            "ask_human",
                            json!({ "question": question }),
                        ));
                    }
                }
                Ok(ModelReply::submit(
                    format!("decompose-{}", turn),
                    json!({
                        "name": world.name,
                        "description": "Staffed from the job description",
                        "workflows": world.workflows,
                    }),
                ))
            }
            "matcher" => {
                let workflow = workflow_of(req);
                if world.looping_matchers.iter().any(|w| *w == workflow) {
                    return Ok(ModelReply::tool_call(
                        format!("loop-{}", turn),
                        "fetch_capabilities",
                        json!({}),
                    ));
                }
                if req.results_for("fetch_capabilities").is_empty()
                    || req.results_for("fetch_triggers").is_empty()
                {
                    return Ok(fetch_both(turn));
                }

                let attempt = req.results_for("submit_result").len();
                let answers = world
                    .matches
                    .iter()
                    .find(|(w, _)| *w == workflow)
                    .map(|(_, answers)| answers.clone())
                    .unwrap_or_default();
                let answer = answers
                    .get(attempt)
                    .or(answers.last())
                    .cloned()
                    .unwrap_or_else(|| unsatisfied_answer("Nothing in the catalog fits"));
                Ok(ModelReply::submit(format!("match-{}", turn), answer))
            }
            _ => {
                let workflow = workflow_of(req);
                let answers = req.results_for("ask_human");
                if let Some((_, question)) =
                    world.assembler_questions.iter().find(|(w, _)| *w == workflow)
                {
                    if answers.is_empty() {
                        return Ok(ModelReply::tool_call(
                            format!("ask-{}", slug(&workflow)),
                            "ask_human",
                            json!({ "question": question }),
                        ));
                    }
                }

                let mut prompt = format!("You are responsible for: {}.", workflow);
                for answer in answers {
                    prompt.push_str(&format!(" The human said: {}.", answer));
                }
                Ok(ModelReply::submit(
                    format!("assemble-{}", turn),
                    json!({ "prompt": prompt }),
                ))
            }
        }
    })
}

pub fn context() -> ExecutionContext {
    ExecutionContext::new(Arc::new(catalog())).with_organization("org-test")
}

pub fn engine(world: World, store: Arc<dyn CheckpointStore>, config: EngineConfig) -> Engine {
    Engine::new(Arc::new(model(world)), store, config).with_event_sink(Arc::new(NullSink))
}
