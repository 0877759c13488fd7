//! Branch driver
//!
//! Executes the actions of the pure branch state machine: runs the matcher
//! and assembler steps and turns their outcomes back into events until the
//! branch terminates or suspends.

use crate::checkpoint::BranchRecord;
use crate::events::{publish, EventSink, LifecycleEvent};
use crate::nodes::{Assembler, Matcher};
use crate::state_machine::{transition, BranchAction, BranchEvent, BranchState};
use crate::step::{StepOutcome, StepRunner, StepState};
use roster_core::{AgentDraft, BranchOutcome, ConversationEntry, UnsatisfiedWorkflow};
use roster_planning::{prompts, MatchResult};
use tracing::{debug, warn};

pub struct BranchDriver<'a> {
    runner: &'a StepRunner<'a>,
    sink: &'a dyn EventSink,
    thread_id: &'a str,
}

impl<'a> BranchDriver<'a> {
    pub fn new(runner: &'a StepRunner<'a>, sink: &'a dyn EventSink, thread_id: &'a str) -> Self {
        Self {
            runner,
            sink,
            thread_id,
        }
    }

    /// Advance a branch until it terminates or suspends
    ///
    /// With `answer`, the branch must be suspended; the answer is recorded in
    /// the branch's own conversation and delivered to the pending call.
    pub async fn drive(&self, record: &mut BranchRecord, answer: Option<String>) {
        let mut answer = answer;
        let mut event = match (&record.state, &answer) {
            (BranchState::Start, None) => {
                publish(
                    self.sink,
                    LifecycleEvent::BranchStarted {
                        thread_id: self.thread_id.to_string(),
                        branch_id: record.branch_id.clone(),
                        workflow: record.workflow.description.clone(),
                    },
                )
                .await;
                BranchEvent::Begin
            }
            (
                BranchState::Suspended {
                    tool_call_id,
                    question,
                    ..
                },
                Some(text),
            ) => {
                let tool_call_id = tool_call_id.clone();
                record.conversation.push(ConversationEntry::new(
                    question.clone(),
                    text.clone(),
                    tool_call_id.clone(),
                ));
                publish(
                    self.sink,
                    LifecycleEvent::BranchResumed {
                        thread_id: self.thread_id.to_string(),
                        branch_id: record.branch_id.clone(),
                        interrupt_id: tool_call_id.clone(),
                    },
                )
                .await;
                BranchEvent::HumanAnswered { tool_call_id }
            }
            (state, _) => {
                debug!(
                    branch = %record.branch_id,
                    "nothing to drive in {} state",
                    state.name()
                );
                return;
            }
        };

        loop {
            let current = std::mem::replace(&mut record.state, BranchState::Start);
            let (next, actions) = transition(current, event);
            record.state = next;

            let mut follow_up = None;
            for action in actions {
                match action {
                    BranchAction::LogActivity { message } => {
                        debug!(branch = %record.branch_id, "{}", message);
                    }
                    BranchAction::RunMatcher => {
                        let request = prompts::matching_request(&record.workflow, &record.conversation);
                        record.step = Some(StepState::new(request, record.turns));
                        follow_up = Some(self.matcher_step(record, None).await);
                    }
                    BranchAction::ResumeMatcher => {
                        follow_up = Some(self.matcher_step(record, answer.take()).await);
                    }
                    BranchAction::RunAssembler { draft } => {
                        let request =
                            prompts::assembly_request(&record.workflow, &draft, &record.conversation);
                        record.step = Some(StepState::new(request, record.turns));
                        follow_up = Some(self.assembler_step(record, &draft, None).await);
                    }
                    BranchAction::ResumeAssembler { draft } => {
                        follow_up = Some(self.assembler_step(record, &draft, answer.take()).await);
                    }
                    BranchAction::AwaitHuman {
                        tool_call_id,
                        question,
                    } => {
                        publish(
                            self.sink,
                            LifecycleEvent::BranchSuspended {
                                thread_id: self.thread_id.to_string(),
                                branch_id: record.branch_id.clone(),
                                interrupt_id: tool_call_id,
                                question,
                            },
                        )
                        .await;
                    }
                    BranchAction::Emit(outcome) => {
                        record.step = None;
                        let kind = match outcome {
                            BranchOutcome::Agent(_) => "agent",
                            BranchOutcome::Unsatisfied(_) => "unsatisfied",
                        };
                        publish(
                            self.sink,
                            LifecycleEvent::BranchCompleted {
                                thread_id: self.thread_id.to_string(),
                                branch_id: record.branch_id.clone(),
                                outcome: kind.to_string(),
                            },
                        )
                        .await;
                    }
                    BranchAction::ReportFailure { error } => {
                        record.step = None;
                        warn!(branch = %record.branch_id, "branch failed: {}", error);
                        publish(
                            self.sink,
                            LifecycleEvent::BranchFailed {
                                thread_id: self.thread_id.to_string(),
                                branch_id: record.branch_id.clone(),
                                error,
                            },
                        )
                        .await;
                    }
                }
            }

            match follow_up {
                Some(next_event) => event = next_event,
                None => break,
            }
        }
    }

    async fn matcher_step(&self, record: &mut BranchRecord, answer: Option<String>) -> BranchEvent {
        let Some(mut step) = record.step.take() else {
            return missing_step("matcher");
        };
        let matcher = Matcher {
            workflow: &record.workflow,
        };
        let result = match answer {
            Some(answer) => {
                self.runner
                    .resume(&matcher, &mut step, &answer, &record.conversation)
                    .await
            }
            None => self.runner.run(&matcher, &mut step, &record.conversation).await,
        };
        record.turns = step.turns;

        let event = match result {
            Ok(StepOutcome::Finished(MatchResult::Agent(draft))) => BranchEvent::Matched { draft },
            Ok(StepOutcome::Finished(MatchResult::Unsatisfied(unsatisfied))) => {
                BranchEvent::NoMatch { unsatisfied }
            }
            Ok(StepOutcome::Suspended(pending)) => BranchEvent::HumanInputRequested {
                tool_call_id: pending.tool_call_id,
                question: pending.question,
            },
            Ok(StepOutcome::Rejected(error)) => BranchEvent::NoMatch {
                unsatisfied: UnsatisfiedWorkflow::new(
                    record.workflow.description.clone(),
                    format!("No valid agent could be matched: {}", error),
                ),
            },
            Err(error) => BranchEvent::Error {
                message: error.to_string(),
            },
        };
        record.step = Some(step);
        event
    }

    async fn assembler_step(
        &self,
        record: &mut BranchRecord,
        draft: &AgentDraft,
        answer: Option<String>,
    ) -> BranchEvent {
        let Some(mut step) = record.step.take() else {
            return missing_step("assembler");
        };
        let assembler = Assembler {
            workflow: &record.workflow,
            draft,
        };
        let result = match answer {
            Some(answer) => {
                self.runner
                    .resume(&assembler, &mut step, &answer, &record.conversation)
                    .await
            }
            None => self.runner.run(&assembler, &mut step, &record.conversation).await,
        };
        record.turns = step.turns;

        let event = match result {
            Ok(StepOutcome::Finished(prompt)) => BranchEvent::Assembled { prompt },
            Ok(StepOutcome::Suspended(pending)) => BranchEvent::HumanInputRequested {
                tool_call_id: pending.tool_call_id,
                question: pending.question,
            },
            Ok(StepOutcome::Rejected(error)) => BranchEvent::NoMatch {
                unsatisfied: UnsatisfiedWorkflow::new(
                    record.workflow.description.clone(),
                    format!("Agent instructions could not be produced: {}", error),
                ),
            },
            Err(error) => BranchEvent::Error {
                message: error.to_string(),
            },
        };
        record.step = Some(step);
        event
    }
}

fn missing_step(stage: &str) -> BranchEvent {
    BranchEvent::Error {
        message: format!("no {} step state to continue", stage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelSink;
    use roster_core::{EngineConfig, RiskLevel, StaticCatalog, Workflow};
    use roster_llm::{ModelReply, ScriptedModel};
    use serde_json::json;
    use tokio_stream::StreamExt;

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_capability("shop", "pricing.update", "Change prices", RiskLevel::Medium)
            .with_trigger("scheduler", "cron", "Schedule")
    }

    fn fetch_both() -> ModelReply {
        ModelReply::new(vec![
            roster_llm::ContentBlock::ToolUse {
                id: "caps".to_string(),
                name: "fetch_capabilities".to_string(),
                input: json!({}),
            },
            roster_llm::ContentBlock::ToolUse {
                id: "trig".to_string(),
                name: "fetch_triggers".to_string(),
                input: json!({}),
            },
        ])
    }

    fn agent_answer() -> serde_json::Value {
        json!({
            "agent": {
                "name": "Pricing bot",
                "capabilities": [{"providerId": "shop", "id": "pricing.update"}],
                "trigger": {"providerId": "scheduler", "id": "cron"}
            }
        })
    }

    /// Matcher fetches then submits; assembler asks once, then submits
    fn asking_model() -> ScriptedModel {
        ScriptedModel::new(|req| match req.tag.as_str() {
            "matcher" if req.results_for("fetch_capabilities").is_empty() => Ok(fetch_both()),
            "matcher" => Ok(ModelReply::submit("m1", agent_answer())),
            _ => match req.results_for("ask_human").first() {
                None => Ok(ModelReply::tool_call(
                    "ask-tone",
                    "ask_human",
                    json!({"question": "What tone?"}),
                )),
                Some(answer) => Ok(ModelReply::submit(
                    "a1",
                    json!({"prompt": format!("Adjust prices. Tone: {}", answer)}),
                )),
            },
        })
    }

    #[tokio::test]
    async fn test_branch_suspends_in_assembler_and_resumes() {
        let model = asking_model();
        let catalog = catalog();
        let config = EngineConfig::default();
        let runner = StepRunner::new(&model, &catalog, &config);
        let (sink, stream) = ChannelSink::new();
        let driver = BranchDriver::new(&runner, &sink, "t1");

        let mut record = BranchRecord::new(Workflow::generic("Keep prices competitive"), &[]);
        driver.drive(&mut record, None).await;
        match &record.state {
            BranchState::Suspended {
                resume_into,
                tool_call_id,
                ..
            } => {
                assert_eq!(tool_call_id, "ask-tone");
                assert!(matches!(**resume_into, BranchState::Assembling { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(record.step.is_some());

        // Restart: the record survives serialization
        let mut record: BranchRecord =
            serde_json::from_value(serde_json::to_value(&record).unwrap()).unwrap();
        driver.drive(&mut record, Some("Friendly".to_string())).await;

        match &record.state {
            BranchState::DoneAgent { agent } => {
                assert_eq!(agent.prompt, "Adjust prices. Tone: Friendly");
                assert_eq!(agent.description, "Keep prices competitive");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(record.step.is_none());
        assert_eq!(record.own_entries().len(), 1);
        assert_eq!(record.own_entries()[0].node_context, "ask-tone");

        drop(driver);
        drop(sink);
        let events: Vec<LifecycleEvent> = stream.collect().await;
        let names: Vec<&str> = events
            .iter()
            .map(|e| match e {
                LifecycleEvent::BranchStarted { .. } => "started",
                LifecycleEvent::BranchSuspended { .. } => "suspended",
                LifecycleEvent::BranchResumed { .. } => "resumed",
                LifecycleEvent::BranchCompleted { .. } => "completed",
                _ => "other",
            })
            .collect();
        assert_eq!(names, vec!["started", "suspended", "resumed", "completed"]);
    }

    #[tokio::test]
    async fn test_recursion_limit_fails_branch() {
        let model = ScriptedModel::new(|_| {
            Ok(ModelReply::tool_call("c", "fetch_capabilities", json!({})))
        });
        let catalog = catalog();
        let config = EngineConfig {
            recursion_limit: 4,
            ..EngineConfig::default()
        };
        let runner = StepRunner::new(&model, &catalog, &config);
        let sink = crate::events::NullSink;
        let driver = BranchDriver::new(&runner, &sink, "t1");

        let mut record = BranchRecord::new(Workflow::generic("Loop forever"), &[]);
        driver.drive(&mut record, None).await;
        match &record.state {
            BranchState::Failed { error } => assert!(error.contains("Recursion limit")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(record.turns, 4);
    }

    #[tokio::test]
    async fn test_rejected_assembly_becomes_unsatisfied() {
        let model = ScriptedModel::new(|req| match req.tag.as_str() {
            "matcher" if req.results_for("fetch_capabilities").is_empty() => Ok(fetch_both()),
            "matcher" => Ok(ModelReply::submit("m1", agent_answer())),
            _ => Ok(ModelReply::submit("a", json!({"prompt": "   "}))),
        });
        let catalog = catalog();
        let config = EngineConfig::default();
        let runner = StepRunner::new(&model, &catalog, &config);
        let sink = crate::events::NullSink;
        let driver = BranchDriver::new(&runner, &sink, "t1");

        let mut record = BranchRecord::new(Workflow::generic("Keep prices competitive"), &[]);
        driver.drive(&mut record, None).await;
        match &record.state {
            BranchState::DoneUnsatisfied { unsatisfied } => {
                assert!(unsatisfied.explanation.starts_with("Agent instructions"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_answer_without_suspension_is_ignored() {
        let model = asking_model();
        let catalog = catalog();
        let config = EngineConfig::default();
        let runner = StepRunner::new(&model, &catalog, &config);
        let sink = crate::events::NullSink;
        let driver = BranchDriver::new(&runner, &sink, "t1");

        let mut record = BranchRecord::new(Workflow::generic("x"), &[]);
        driver.drive(&mut record, Some("unused".to_string())).await;
        assert_eq!(record.state, BranchState::Start);
        assert_eq!(model.calls(), 0);
    }
}
