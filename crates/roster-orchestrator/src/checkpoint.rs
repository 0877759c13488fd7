//! Execution state persisted per thread
//!
//! This is the checkpoint payload: everything needed to resume a thread after
//! a process restart, and nothing that can be recomputed.

use crate::state_machine::BranchState;
use crate::step::StepState;
use chrono::{DateTime, Utc};
use roster_core::{
    Agent, AiEmployee, BranchFailure, BranchOutcome, ConversationEntry, UnsatisfiedWorkflow,
    Workflow,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a thread currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Decomposing,
    Branching,
    Joined,
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Decomposing => write!(f, "decomposing"),
            Node::Branching => write!(f, "branching"),
            Node::Joined => write!(f, "joined"),
        }
    }
}

/// One branch: a workflow and its private execution state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRecord {
    pub branch_id: String,
    pub workflow: Workflow,
    pub state: BranchState,
    /// The running (or suspended) step; dropped once the branch terminates
    #[serde(default)]
    pub step: Option<StepState>,
    /// Seeded history followed by this branch's own entries
    pub conversation: Vec<ConversationEntry>,
    /// Number of seeded entries at the front of `conversation`
    pub seeded: usize,
    /// Turns charged across all steps of this branch
    #[serde(default)]
    pub turns: usize,
    /// Whether the outcome was already added to the thread accumulators
    #[serde(default)]
    pub merged: bool,
}

impl BranchRecord {
    pub fn new(workflow: Workflow, seed: &[ConversationEntry]) -> Self {
        Self {
            branch_id: Uuid::new_v4().to_string(),
            workflow,
            state: BranchState::Start,
            step: None,
            conversation: seed.to_vec(),
            seeded: seed.len(),
            turns: 0,
            merged: false,
        }
    }

    /// Entries appended by this branch
    pub fn own_entries(&self) -> &[ConversationEntry] {
        let start = self.seeded.min(self.conversation.len());
        &self.conversation[start..]
    }

    /// What this branch adds to the join once terminated
    pub fn contribution(&self) -> Option<BranchContribution> {
        let (outcome, failure) = match &self.state {
            BranchState::DoneAgent { .. } | BranchState::DoneUnsatisfied { .. } => {
                (self.state.outcome()?, None)
            }
            BranchState::Failed { error } => (
                // Listed explicitly so a failed workflow is never silently dropped
                BranchOutcome::Unsatisfied(UnsatisfiedWorkflow::new(
                    self.workflow.description.clone(),
                    format!("Branch failed: {}", error),
                )),
                Some(BranchFailure {
                    branch_id: self.branch_id.clone(),
                    workflow_description: self.workflow.description.clone(),
                    error: error.clone(),
                }),
            ),
            _ => return None,
        };

        Some(BranchContribution {
            outcome,
            entries: self.own_entries().to_vec(),
            failure,
        })
    }
}

/// A terminated branch's share of the join
#[derive(Debug, Clone, PartialEq)]
pub struct BranchContribution {
    pub outcome: BranchOutcome,
    pub entries: Vec<ConversationEntry>,
    pub failure: Option<BranchFailure>,
}

/// A tool call waiting for a human answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interrupt {
    /// The `ask_human` tool call id; pass it back to target this interrupt
    pub interrupt_id: String,
    /// `None` while the thread is still decomposing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    pub question: String,
}

/// Checkpoint payload of one thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub thread_id: String,
    pub job_description: String,
    pub node: Node,
    pub employee_name: String,
    pub employee_description: String,
    /// Decomposer step, kept only while it is suspended
    #[serde(default)]
    pub decomposition: Option<StepState>,
    pub decomposed_workflows: Vec<Workflow>,
    pub branches: Vec<BranchRecord>,
    pub accumulated_agents: Vec<Agent>,
    pub accumulated_unsatisfied: Vec<UnsatisfiedWorkflow>,
    pub conversation_history: Vec<ConversationEntry>,
    #[serde(default)]
    pub failures: Vec<BranchFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionState {
    pub fn new(
        thread_id: impl Into<String>,
        job_description: impl Into<String>,
        conversation: Vec<ConversationEntry>,
    ) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            job_description: job_description.into(),
            node: Node::Decomposing,
            employee_name: String::new(),
            employee_description: String::new(),
            decomposition: None,
            decomposed_workflows: Vec::new(),
            branches: Vec::new(),
            accumulated_agents: Vec::new(),
            accumulated_unsatisfied: Vec::new(),
            conversation_history: conversation,
            failures: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending interrupts in workflow-discovery order
    pub fn pending_interrupts(&self) -> Vec<Interrupt> {
        if self.node == Node::Decomposing {
            return self
                .decomposition
                .as_ref()
                .and_then(|step| step.pending.as_ref())
                .map(|pending| Interrupt {
                    interrupt_id: pending.tool_call_id.clone(),
                    branch_id: None,
                    workflow: None,
                    question: pending.question.clone(),
                })
                .into_iter()
                .collect();
        }

        self.branches
            .iter()
            .filter_map(|branch| match &branch.state {
                BranchState::Suspended {
                    tool_call_id,
                    question,
                    ..
                } => Some(Interrupt {
                    interrupt_id: tool_call_id.clone(),
                    branch_id: Some(branch.branch_id.clone()),
                    workflow: Some(branch.workflow.description.clone()),
                    question: question.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Add one branch contribution to the accumulators
    ///
    /// Every field is extended by list concatenation, so the resulting sets do
    /// not depend on the order contributions arrive in.
    pub fn absorb(&mut self, contribution: BranchContribution) {
        match contribution.outcome {
            BranchOutcome::Agent(agent) => self.accumulated_agents.push(agent),
            BranchOutcome::Unsatisfied(unsatisfied) => {
                self.accumulated_unsatisfied.push(unsatisfied)
            }
        }
        self.conversation_history.extend(contribution.entries);
        self.failures.extend(contribution.failure);
    }

    /// Merge every terminated branch that was not merged yet
    pub fn merge_terminated(&mut self) -> usize {
        let contributions: Vec<BranchContribution> = self
            .branches
            .iter_mut()
            .filter(|branch| !branch.merged)
            .filter_map(|branch| {
                let contribution = branch.contribution()?;
                branch.merged = true;
                Some(contribution)
            })
            .collect();

        let merged = contributions.len();
        for contribution in contributions {
            self.absorb(contribution);
        }
        merged
    }

    pub fn is_joined(&self) -> bool {
        self.node == Node::Joined
    }

    /// The joined result; complete only once the thread is joined
    pub fn employee(&self) -> AiEmployee {
        AiEmployee {
            name: self.employee_name.clone(),
            description: self.employee_description.clone(),
            unsatisfied_workflows: self.accumulated_unsatisfied.clone(),
            agents: self.accumulated_agents.clone(),
        }
    }
}
