//! Step runner: one bounded reasoning loop
//!
//! A step sends its accumulated history to the model, executes the catalog
//! tools it asks for, and repeats until the model submits a final answer that
//! the step's task accepts. A call to `ask_human` is never executed: the step
//! stops with [`StepOutcome::Suspended`] and keeps everything it needs to
//! continue in its serializable [`StepState`].

use crate::tools::{question_of, submit_spec, Tool};
use roster_core::{
    Catalog, CapabilityProvider, ConversationEntry, EngineConfig, Result, RosterError,
    TriggerInfo,
};
use roster_llm::{
    CompletionRequest, ContentBlock, LanguageModel, Message, ToolCall, ToolSpec, SUBMIT_TOOL,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Static configuration of a reasoning stage
#[derive(Debug, Clone)]
pub struct StepConfig {
    /// Label for logs and for routing in fake models
    pub tag: &'static str,
    pub system: &'static str,
    pub tools: Vec<Tool>,
    /// Tools that must have run successfully before a final answer is accepted
    pub required_tools: Vec<Tool>,
    pub response_schema: Value,
}

impl StepConfig {
    fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(Tool::spec)
            .chain(std::iter::once(submit_spec(self.response_schema.clone())))
            .collect()
    }
}

/// A reasoning stage: its configuration and its output gate
pub trait StepTask: Send + Sync {
    type Output: Send;

    fn config(&self) -> StepConfig;

    /// Accept a final answer or explain why it was rejected
    fn accept(&self, answer: &Value, state: &StepState) -> Result<Self::Output>;

    /// Stage-specific error for a rejected answer
    fn invalid(&self, reason: String) -> RosterError;
}

/// The `ask_human` call a suspended step is waiting on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingToolCall {
    pub tool_call_id: String,
    pub question: String,
}

/// Everything needed to continue a step, including after a process restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub messages: Vec<Message>,
    /// Model calls and executed tool calls charged so far
    pub turns: usize,
    pub corrections: usize,
    #[serde(default)]
    pub last_capabilities: Option<Vec<CapabilityProvider>>,
    #[serde(default)]
    pub last_triggers: Option<Vec<TriggerInfo>>,
    #[serde(default)]
    pub pending: Option<PendingToolCall>,
    /// Calls of the last model turn not processed yet
    #[serde(default)]
    pub queued_calls: Vec<ToolCall>,
    /// Results gathered for the last model turn
    #[serde(default)]
    pub queued_results: Vec<ContentBlock>,
}

impl StepState {
    /// New step opening with `request`, continuing a budget of `turns`
    pub fn new(request: impl Into<String>, turns: usize) -> Self {
        Self {
            messages: vec![Message::user_text(request)],
            turns,
            ..Self::default()
        }
    }

    pub fn has_called(&self, tool: Tool) -> bool {
        match tool {
            Tool::FetchCapabilities => self.last_capabilities.is_some(),
            Tool::FetchTriggers => self.last_triggers.is_some(),
            Tool::AskHuman => self.messages.iter().any(|m| {
                m.tool_calls()
                    .iter()
                    .any(|c| c.name == Tool::AskHuman.name())
            }),
        }
    }
}

/// How a step run ended
#[derive(Debug)]
pub enum StepOutcome<T> {
    /// The task accepted a final answer
    Finished(T),
    /// Waiting for a human answer to this call
    Suspended(PendingToolCall),
    /// Answers kept failing validation until the retries ran out
    Rejected(RosterError),
}

fn tool_result(id: &str, content: impl Into<String>, is_error: bool) -> ContentBlock {
    ContentBlock::ToolResult {
        tool_use_id: id.to_string(),
        content: content.into(),
        is_error,
    }
}

fn correction(error: &RosterError) -> String {
    format!(
        "Your answer was rejected: {}. Fix it and call {} again.",
        error, SUBMIT_TOOL
    )
}

fn normalize(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Answer already given to the same question, if any
fn known_answer<'e>(known: &'e [ConversationEntry], question: &str) -> Option<&'e str> {
    let wanted = normalize(question);
    known
        .iter()
        .rev()
        .find(|entry| normalize(&entry.question) == wanted)
        .map(|entry| entry.answer.as_str())
}

/// Parse a JSON object out of a text reply, tolerating code fences and prose
pub(crate) fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Runs steps against one model and one catalog
pub struct StepRunner<'a> {
    model: &'a dyn LanguageModel,
    catalog: &'a dyn Catalog,
    recursion_limit: usize,
    validation_retries: usize,
}

impl<'a> StepRunner<'a> {
    pub fn new(model: &'a dyn LanguageModel, catalog: &'a dyn Catalog, config: &EngineConfig) -> Self {
        Self {
            model,
            catalog,
            recursion_limit: config.recursion_limit,
            validation_retries: config.validation_retries,
        }
    }

    fn charge_turn(&self, state: &mut StepState) -> Result<()> {
        if state.turns >= self.recursion_limit {
            return Err(RosterError::RecursionLimitExceeded {
                limit: self.recursion_limit,
            });
        }
        state.turns += 1;
        Ok(())
    }

    /// Run until the step finishes, suspends or is rejected
    ///
    /// `known` holds the conversation entries visible to this step; a question
    /// already answered there is answered again from it instead of suspending.
    #[instrument(skip_all, fields(tag = task.config().tag))]
    pub async fn run<T: StepTask>(
        &self,
        task: &T,
        state: &mut StepState,
        known: &[ConversationEntry],
    ) -> Result<StepOutcome<T::Output>> {
        if let Some(ref pending) = state.pending {
            return Ok(StepOutcome::Suspended(pending.clone()));
        }
        let config = task.config();

        loop {
            if let Some(pending) = self.drain_queue(&config, state, known).await? {
                return Ok(StepOutcome::Suspended(pending));
            }

            self.charge_turn(state)?;
            let request = CompletionRequest {
                tag: config.tag.to_string(),
                system: config.system.to_string(),
                messages: state.messages.clone(),
                tools: config.tool_specs(),
            };
            let message = self.model.complete(&request).await?.into_message();
            let calls = message.tool_calls();
            let text = message.text();
            state.messages.push(message);

            if let Some(submit) = calls.iter().find(|c| c.name == SUBMIT_TOOL) {
                let error = match self.evaluate(task, &config, state, &submit.input) {
                    Ok(output) => return Ok(StepOutcome::Finished(output)),
                    Err(error) => error,
                };
                if state.corrections >= self.validation_retries {
                    warn!("{}: answer rejected, no retries left: {}", config.tag, error);
                    return Ok(StepOutcome::Rejected(error));
                }
                state.corrections += 1;
                debug!("{}: asking for a corrected answer: {}", config.tag, error);

                let results = calls
                    .iter()
                    .map(|c| {
                        if c.id == submit.id {
                            tool_result(&c.id, correction(&error), true)
                        } else {
                            tool_result(
                                &c.id,
                                "Not executed: a final answer was submitted in the same turn",
                                true,
                            )
                        }
                    })
                    .collect();
                state.messages.push(Message::tool_results(results));
                continue;
            }

            if !calls.is_empty() {
                state.queued_calls = calls;
                continue;
            }

            let verdict = match extract_json(&text) {
                Some(answer) => self.evaluate(task, &config, state, &answer),
                None => Err(task.invalid(format!(
                    "no final answer found, deliver it by calling {}",
                    SUBMIT_TOOL
                ))),
            };
            let error = match verdict {
                Ok(output) => return Ok(StepOutcome::Finished(output)),
                Err(error) => error,
            };
            if state.corrections >= self.validation_retries {
                warn!("{}: answer rejected, no retries left: {}", config.tag, error);
                return Ok(StepOutcome::Rejected(error));
            }
            state.corrections += 1;
            state.messages.push(Message::user_text(correction(&error)));
        }
    }

    /// Inject the human answer for the pending call and continue the step
    pub async fn resume<T: StepTask>(
        &self,
        task: &T,
        state: &mut StepState,
        answer: &str,
        known: &[ConversationEntry],
    ) -> Result<StepOutcome<T::Output>> {
        let pending = state.pending.take().ok_or_else(|| {
            RosterError::NoPendingInterrupt(format!("step {}", task.config().tag))
        })?;
        state
            .queued_results
            .push(tool_result(&pending.tool_call_id, answer, false));
        self.run(task, state, known).await
    }

    fn evaluate<T: StepTask>(
        &self,
        task: &T,
        config: &StepConfig,
        state: &StepState,
        answer: &Value,
    ) -> Result<T::Output> {
        let missing: Vec<&str> = config
            .required_tools
            .iter()
            .filter(|tool| !state.has_called(**tool))
            .map(Tool::name)
            .collect();
        if !missing.is_empty() {
            return Err(task.invalid(format!(
                "call {} before submitting a final answer",
                missing.join(" and ")
            )));
        }
        task.accept(answer, state)
    }

    /// Process queued tool calls in order; stops at the first `ask_human`
    async fn drain_queue(
        &self,
        config: &StepConfig,
        state: &mut StepState,
        known: &[ConversationEntry],
    ) -> Result<Option<PendingToolCall>> {
        while !state.queued_calls.is_empty() {
            let call = state.queued_calls.remove(0);
            let tool = Tool::from_name(&call.name).filter(|t| config.tools.contains(t));

            let result = match tool {
                None => {
                    let available: Vec<&str> = config.tools.iter().map(Tool::name).collect();
                    warn!("{}: model requested unknown tool {}", config.tag, call.name);
                    tool_result(
                        &call.id,
                        format!(
                            "Unknown tool '{}'. Available tools: {}, {}",
                            call.name,
                            available.join(", "),
                            SUBMIT_TOOL
                        ),
                        true,
                    )
                }
                Some(Tool::AskHuman) => match question_of(&call.input) {
                    None => tool_result(&call.id, "ask_human requires a non-empty question", true),
                    Some(question) => match known_answer(known, &question) {
                        Some(answer) => {
                            debug!("{}: answering '{}' from history", config.tag, question);
                            tool_result(&call.id, answer, false)
                        }
                        None => {
                            let pending = PendingToolCall {
                                tool_call_id: call.id,
                                question,
                            };
                            state.pending = Some(pending.clone());
                            return Ok(Some(pending));
                        }
                    },
                },
                Some(Tool::FetchCapabilities) => {
                    self.charge_turn(state)?;
                    let capabilities = self.catalog.capabilities().await?;
                    let content = serde_json::to_string(&capabilities)?;
                    state.last_capabilities = Some(capabilities);
                    tool_result(&call.id, content, false)
                }
                Some(Tool::FetchTriggers) => {
                    self.charge_turn(state)?;
                    let triggers = self.catalog.triggers().await?;
                    let content = serde_json::to_string(&triggers)?;
                    state.last_triggers = Some(triggers);
                    tool_result(&call.id, content, false)
                }
            };
            state.queued_results.push(result);
        }

        if !state.queued_results.is_empty() {
            let results = std::mem::take(&mut state.queued_results);
            state.messages.push(Message::tool_results(results));
        }
        Ok(None)
    }
}
