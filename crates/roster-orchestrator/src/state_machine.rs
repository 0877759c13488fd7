//! Pure state machine for one branch
//!
//! This module implements a pure functional state machine with NO I/O.
//! All state transitions are deterministic and testable.
//!
//! Key design principles:
//! - Pure function: transition(state, event) -> (state, actions)
//! - No async, no I/O
//! - Invalid transitions go to Failed state (never panic)
//! - States are serializable so a suspended branch can be checkpointed

use roster_core::{Agent, AgentDraft, BranchOutcome, UnsatisfiedWorkflow};
use serde::{Deserialize, Serialize};

/// Branch state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchState {
    /// Created, nothing run yet
    Start,
    /// Matcher step in progress
    Matching,
    /// Assembler step in progress for a matched draft
    Assembling { draft: AgentDraft },
    /// Waiting for a human answer; resumes into `resume_into`
    Suspended {
        resume_into: Box<BranchState>,
        tool_call_id: String,
        question: String,
    },
    /// Terminated with an agent
    DoneAgent { agent: Agent },
    /// Terminated without a match
    DoneUnsatisfied { unsatisfied: UnsatisfiedWorkflow },
    /// Terminated with an engine-local error
    Failed { error: String },
}

impl BranchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BranchState::DoneAgent { .. }
                | BranchState::DoneUnsatisfied { .. }
                | BranchState::Failed { .. }
        )
    }

    /// The branch outcome, for the two successful terminal states
    pub fn outcome(&self) -> Option<BranchOutcome> {
        match self {
            BranchState::DoneAgent { agent } => Some(BranchOutcome::Agent(agent.clone())),
            BranchState::DoneUnsatisfied { unsatisfied } => {
                Some(BranchOutcome::Unsatisfied(unsatisfied.clone()))
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BranchState::Start => "start",
            BranchState::Matching => "matching",
            BranchState::Assembling { .. } => "assembling",
            BranchState::Suspended { .. } => "suspended",
            BranchState::DoneAgent { .. } => "done_agent",
            BranchState::DoneUnsatisfied { .. } => "done_unsatisfied",
            BranchState::Failed { .. } => "failed",
        }
    }
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum BranchEvent {
    /// Start processing the workflow
    Begin,
    /// Matcher produced an agent draft
    Matched { draft: AgentDraft },
    /// Matcher found nothing suitable (or its answers were rejected)
    NoMatch { unsatisfied: UnsatisfiedWorkflow },
    /// Assembler produced the behavior prompt
    Assembled { prompt: String },
    /// The running step asked the human
    HumanInputRequested {
        tool_call_id: String,
        question: String,
    },
    /// The human answered the pending call
    HumanAnswered { tool_call_id: String },
    /// Error occurred
    Error { message: String },
}

/// Actions to execute as side effects of transitions
#[derive(Debug, Clone, PartialEq)]
pub enum BranchAction {
    /// Run the matcher step from scratch
    RunMatcher,
    /// Run the assembler step from scratch
    RunAssembler { draft: AgentDraft },
    /// Continue the suspended matcher step with the answer
    ResumeMatcher,
    /// Continue the suspended assembler step with the answer
    ResumeAssembler { draft: AgentDraft },
    /// Persist and hand control back to the caller
    AwaitHuman {
        tool_call_id: String,
        question: String,
    },
    /// Contribute the outcome to the join
    Emit(BranchOutcome),
    /// Report an engine-local failure
    ReportFailure { error: String },
    /// Log activity
    LogActivity { message: String },
}

/// Pure state transition function
///
/// Takes current state and event, returns new state and actions to execute.
/// This function is completely deterministic and has no side effects.
///
/// # Invalid Transitions
/// Any invalid transition results in a Failed state with descriptive error.
/// This function never panics.
pub fn transition(state: BranchState, event: BranchEvent) -> (BranchState, Vec<BranchAction>) {
    match (state, event) {
        // START -> MATCHING: always
        (BranchState::Start, BranchEvent::Begin) => (
            BranchState::Matching,
            vec![
                BranchAction::LogActivity {
                    message: "Matching workflow".to_string(),
                },
                BranchAction::RunMatcher,
            ],
        ),

        // From Matching state
        (BranchState::Matching, BranchEvent::Matched { draft }) => {
            let actions = vec![
                BranchAction::LogActivity {
                    message: format!(
                        "Matched '{}' with {} capabilities",
                        draft.name,
                        draft.capabilities.len()
                    ),
                },
                BranchAction::RunAssembler {
                    draft: draft.clone(),
                },
            ];
            (BranchState::Assembling { draft }, actions)
        }

        (BranchState::Matching, BranchEvent::NoMatch { unsatisfied })
        | (BranchState::Assembling { .. }, BranchEvent::NoMatch { unsatisfied }) => {
            let actions = vec![
                BranchAction::LogActivity {
                    message: format!("Unsatisfied: {}", unsatisfied.explanation),
                },
                BranchAction::Emit(BranchOutcome::Unsatisfied(unsatisfied.clone())),
            ];
            (BranchState::DoneUnsatisfied { unsatisfied }, actions)
        }

        // From Assembling state
        (BranchState::Assembling { draft }, BranchEvent::Assembled { prompt }) => {
            let agent = draft.with_prompt(prompt);
            let actions = vec![
                BranchAction::LogActivity {
                    message: format!("Assembled agent '{}'", agent.name),
                },
                BranchAction::Emit(BranchOutcome::Agent(agent.clone())),
            ];
            (BranchState::DoneAgent { agent }, actions)
        }

        // Any running state -> SUSPENDED
        (
            state @ (BranchState::Matching | BranchState::Assembling { .. }),
            BranchEvent::HumanInputRequested {
                tool_call_id,
                question,
            },
        ) => {
            let actions = vec![
                BranchAction::LogActivity {
                    message: format!("Suspended in {}: {}", state.name(), question),
                },
                BranchAction::AwaitHuman {
                    tool_call_id: tool_call_id.clone(),
                    question: question.clone(),
                },
            ];
            (
                BranchState::Suspended {
                    resume_into: Box::new(state),
                    tool_call_id,
                    question,
                },
                actions,
            )
        }

        // SUSPENDED -> the state it was suspended in
        (
            BranchState::Suspended {
                resume_into,
                tool_call_id,
                question,
            },
            BranchEvent::HumanAnswered {
                tool_call_id: answered,
            },
        ) => {
            if answered != tool_call_id {
                let error = format!(
                    "Answer for {} does not match pending call {}",
                    answered, tool_call_id
                );
                return (
                    BranchState::Failed {
                        error: error.clone(),
                    },
                    vec![BranchAction::ReportFailure { error }],
                );
            }

            let log = BranchAction::LogActivity {
                message: format!("Resumed with answer to: {}", question),
            };
            match *resume_into {
                BranchState::Matching => {
                    (BranchState::Matching, vec![log, BranchAction::ResumeMatcher])
                }
                BranchState::Assembling { draft } => (
                    BranchState::Assembling {
                        draft: draft.clone(),
                    },
                    vec![log, BranchAction::ResumeAssembler { draft }],
                ),
                other => {
                    let error = format!("Cannot resume into {} state", other.name());
                    (
                        BranchState::Failed {
                            error: error.clone(),
                        },
                        vec![BranchAction::ReportFailure { error }],
                    )
                }
            }
        }

        // Error events from any non-terminal state
        (BranchState::Start, BranchEvent::Error { message })
        | (BranchState::Matching, BranchEvent::Error { message })
        | (BranchState::Assembling { .. }, BranchEvent::Error { message })
        | (BranchState::Suspended { .. }, BranchEvent::Error { message }) => {
            let actions = vec![
                BranchAction::LogActivity {
                    message: format!("Error: {}", message),
                },
                BranchAction::ReportFailure {
                    error: message.clone(),
                },
            ];
            (BranchState::Failed { error: message }, actions)
        }

        // All other invalid transitions, terminal states included
        (state, event) => {
            let error = format!(
                "Invalid branch transition: {} cannot handle event {:?}",
                state.name(),
                event
            );
            (
                BranchState::Failed {
                    error: error.clone(),
                },
                vec![BranchAction::ReportFailure { error }],
            )
        }
    }
}
