//! Fan-out/join engine
//!
//! One call to [`Engine::start`] or [`Engine::resume`] advances a thread as far
//! as it can go without a human, then commits exactly one checkpoint:
//!
//! ```text
//! decompose ──► branch per workflow (matcher → assembler) ──► join
//!     │                         │
//!     └── ask_human ────────────┴──► suspended (checkpointed)
//! ```
//!
//! Branches run concurrently or sequentially; the join only concatenates
//! contributions, so both modes produce the same sets of agents and
//! unsatisfied workflows.

use crate::branch::BranchDriver;
use crate::checkpoint::{BranchRecord, ExecutionState, Interrupt, Node};
use crate::context::ExecutionContext;
use crate::events::{publish, ChannelSink, EventSink, FanoutSink, LifecycleEvent, TracingSink};
use crate::nodes::Decomposer;
use crate::step::{StepOutcome, StepRunner, StepState};
use chrono::Utc;
use futures::future::join_all;
use roster_core::{
    AiEmployee, BranchFailure, ConcurrencyMode, ConversationEntry, EngineConfig, Result,
    RosterError,
};
use roster_llm::LanguageModel;
use roster_planning::{fallback, prompts, Decomposition};
use roster_store::{CheckpointStore, ThreadSummary};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Result of one start or resume call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every branch terminated and the thread is joined
    Completed {
        thread_id: String,
        employee: AiEmployee,
        failures: Vec<BranchFailure>,
    },
    /// At least one step waits for a human answer
    Suspended {
        thread_id: String,
        interrupts: Vec<Interrupt>,
    },
}

impl RunOutcome {
    pub fn thread_id(&self) -> &str {
        match self {
            RunOutcome::Completed { thread_id, .. } | RunOutcome::Suspended { thread_id, .. } => {
                thread_id
            }
        }
    }

    pub fn employee(&self) -> Option<&AiEmployee> {
        match self {
            RunOutcome::Completed { employee, .. } => Some(employee),
            RunOutcome::Suspended { .. } => None,
        }
    }

    pub fn interrupts(&self) -> &[Interrupt] {
        match self {
            RunOutcome::Completed { .. } => &[],
            RunOutcome::Suspended { interrupts, .. } => interrupts,
        }
    }
}

/// A human answer for a suspended thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeRequest {
    pub thread_id: String,
    pub answer: String,
    /// Tool call to answer; may be omitted only while exactly one is pending
    pub interrupt_id: Option<String>,
}

impl ResumeRequest {
    pub fn new(thread_id: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            answer: answer.into(),
            interrupt_id: None,
        }
    }

    pub fn for_interrupt(mut self, interrupt_id: impl Into<String>) -> Self {
        self.interrupt_id = Some(interrupt_id.into());
        self
    }
}

pub type EventStream = UnboundedReceiverStream<LifecycleEvent>;

pub struct Engine {
    model: Arc<dyn LanguageModel>,
    store: Arc<dyn CheckpointStore>,
    config: EngineConfig,
    events: Arc<dyn EventSink>,
    thread_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Engine {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn CheckpointStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            model,
            store,
            config,
            events: Arc::new(TracingSink),
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a thread for `job_description`
    #[instrument(skip_all, fields(org = ?ctx.organization_id))]
    pub async fn start(&self, job_description: &str, ctx: &ExecutionContext) -> Result<RunOutcome> {
        self.start_with(job_description, ctx, self.events.as_ref()).await
    }

    /// Answer a pending interrupt and continue the thread
    #[instrument(skip_all, fields(thread = %request.thread_id))]
    pub async fn resume(&self, request: ResumeRequest, ctx: &ExecutionContext) -> Result<RunOutcome> {
        self.resume_with(request, ctx, self.events.as_ref()).await
    }

    /// Like [`Engine::start`], streaming lifecycle events while the thread runs
    pub fn start_streaming(
        self: &Arc<Self>,
        job_description: impl Into<String>,
        ctx: ExecutionContext,
    ) -> (EventStream, JoinHandle<Result<RunOutcome>>) {
        let (channel, stream) = ChannelSink::new();
        let engine = Arc::clone(self);
        let job_description = job_description.into();
        let handle = tokio::spawn(async move {
            let sink = FanoutSink::new(vec![engine.events.clone(), Arc::new(channel)]);
            engine.start_with(&job_description, &ctx, &sink).await
        });
        (stream, handle)
    }

    /// Like [`Engine::resume`], streaming lifecycle events while the thread runs
    pub fn resume_streaming(
        self: &Arc<Self>,
        request: ResumeRequest,
        ctx: ExecutionContext,
    ) -> (EventStream, JoinHandle<Result<RunOutcome>>) {
        let (channel, stream) = ChannelSink::new();
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let sink = FanoutSink::new(vec![engine.events.clone(), Arc::new(channel)]);
            engine.resume_with(request, &ctx, &sink).await
        });
        (stream, handle)
    }

    /// The committed state of a thread
    pub async fn snapshot(&self, thread_id: &str) -> Result<ExecutionState> {
        let record = self
            .store
            .load(thread_id)
            .await?
            .ok_or_else(|| RosterError::ThreadNotFound(thread_id.to_string()))?;
        Ok(serde_json::from_value(record.payload)?)
    }

    pub async fn threads(&self) -> Result<Vec<ThreadSummary>> {
        self.store.list_threads().await
    }

    async fn start_with(
        &self,
        job_description: &str,
        ctx: &ExecutionContext,
        sink: &dyn EventSink,
    ) -> Result<RunOutcome> {
        if job_description.trim().is_empty() {
            return Err(RosterError::Other("job description is empty".to_string()));
        }

        let thread_id = Uuid::new_v4().to_string();
        let mut state = ExecutionState::new(&thread_id, job_description, ctx.conversation.clone());
        info!("Starting thread {}", thread_id);
        publish(
            sink,
            LifecycleEvent::ThreadStarted {
                thread_id: thread_id.clone(),
            },
        )
        .await;

        let runner = StepRunner::new(self.model.as_ref(), ctx.catalog.as_ref(), &self.config);
        let decomposer = Decomposer { job_description };
        let mut step = StepState::new(
            prompts::decomposition_request(job_description, &state.conversation_history),
            0,
        );
        let outcome = runner
            .run(&decomposer, &mut step, &state.conversation_history)
            .await?;
        self.settle_decomposition(&mut state, step, outcome, &runner, sink)
            .await;

        self.commit_round(state, None, sink).await
    }

    async fn resume_with(
        &self,
        request: ResumeRequest,
        ctx: &ExecutionContext,
        sink: &dyn EventSink,
    ) -> Result<RunOutcome> {
        let thread_id = request.thread_id.clone();
        let lock = self.thread_lock(&thread_id);
        let result = {
            let _guard = lock.lock().await;
            self.resume_locked(request, ctx, sink).await
        };
        self.release_thread_lock(&thread_id, lock);
        result
    }

    async fn resume_locked(
        &self,
        request: ResumeRequest,
        ctx: &ExecutionContext,
        sink: &dyn EventSink,
    ) -> Result<RunOutcome> {
        let record = self
            .store
            .load(&request.thread_id)
            .await?
            .ok_or_else(|| RosterError::ThreadNotFound(request.thread_id.clone()))?;
        let version = record.version;
        let mut state: ExecutionState = serde_json::from_value(record.payload)?;

        let interrupts = state.pending_interrupts();
        let target = select_interrupt(&request, &interrupts)?;
        info!(
            "Resuming thread {} at {} (version {})",
            state.thread_id, target.interrupt_id, version
        );

        let runner = StepRunner::new(self.model.as_ref(), ctx.catalog.as_ref(), &self.config);
        match target.branch_id {
            None => {
                let mut step = state.decomposition.take().ok_or_else(|| {
                    RosterError::NoPendingInterrupt(request.thread_id.clone())
                })?;
                state.conversation_history.push(ConversationEntry::new(
                    target.question.clone(),
                    request.answer.clone(),
                    target.interrupt_id.clone(),
                ));
                let job_description = state.job_description.clone();
                let decomposer = Decomposer {
                    job_description: &job_description,
                };
                let outcome = runner
                    .resume(
                        &decomposer,
                        &mut step,
                        &request.answer,
                        &state.conversation_history,
                    )
                    .await?;
                self.settle_decomposition(&mut state, step, outcome, &runner, sink)
                    .await;
            }
            Some(branch_id) => {
                let index = state
                    .branches
                    .iter()
                    .position(|b| b.branch_id == branch_id)
                    .ok_or_else(|| RosterError::StaleInterrupt {
                        thread_id: request.thread_id.clone(),
                        interrupt_id: target.interrupt_id.clone(),
                    })?;
                let targets = HashMap::from([(index, Some(request.answer.clone()))]);
                self.run_branches(&mut state, targets, &runner, sink).await;
            }
        }

        self.commit_round(state, Some(version), sink).await
    }

    /// Apply the decomposer's result: fan out, or keep the suspended step
    async fn settle_decomposition(
        &self,
        state: &mut ExecutionState,
        step: StepState,
        outcome: StepOutcome<Decomposition>,
        runner: &StepRunner<'_>,
        sink: &dyn EventSink,
    ) {
        let (decomposition, used_fallback) = match outcome {
            StepOutcome::Finished(decomposition) => (decomposition, false),
            StepOutcome::Rejected(error) => {
                warn!("Decomposition rejected, using a generic workflow: {}", error);
                (fallback(&state.job_description), true)
            }
            StepOutcome::Suspended(pending) => {
                debug!("Decomposition waits on {}", pending.tool_call_id);
                state.decomposition = Some(step);
                return;
            }
        };

        state.node = Node::Branching;
        state.decomposition = None;
        state.employee_name = decomposition.name;
        state.employee_description = decomposition.description;
        state.branches = decomposition
            .workflows
            .iter()
            .map(|workflow| BranchRecord::new(workflow.clone(), &state.conversation_history))
            .collect();
        state.decomposed_workflows = decomposition.workflows;

        info!(
            "Decomposed into {} workflow(s){}",
            state.decomposed_workflows.len(),
            if used_fallback { " (fallback)" } else { "" }
        );
        publish(
            sink,
            LifecycleEvent::WorkflowsDecomposed {
                thread_id: state.thread_id.clone(),
                count: state.decomposed_workflows.len(),
                fallback: used_fallback,
            },
        )
        .await;

        let targets = (0..state.branches.len()).map(|index| (index, None)).collect();
        self.run_branches(state, targets, runner, sink).await;
    }

    /// Drive the targeted branches, each with its optional answer
    async fn run_branches(
        &self,
        state: &mut ExecutionState,
        targets: HashMap<usize, Option<String>>,
        runner: &StepRunner<'_>,
        sink: &dyn EventSink,
    ) {
        let thread_id = state.thread_id.clone();
        let driver = BranchDriver::new(runner, sink, &thread_id);
        let semaphore = Semaphore::new(self.config.max_parallel_branches.max(1));
        let driver = &driver;
        let semaphore = &semaphore;

        let runs = state
            .branches
            .iter_mut()
            .enumerate()
            .filter_map(|(index, record)| {
                let answer = targets.get(&index)?.clone();
                Some(async move {
                    let _permit = semaphore.acquire().await.ok();
                    driver.drive(record, answer).await;
                })
            });

        match self.config.concurrency {
            ConcurrencyMode::Concurrent => {
                join_all(runs).await;
            }
            ConcurrencyMode::Sequential => {
                for run in runs {
                    run.await;
                }
            }
        }
    }

    /// Join what terminated and commit the round's single checkpoint
    async fn commit_round(
        &self,
        mut state: ExecutionState,
        expected_version: Option<u64>,
        sink: &dyn EventSink,
    ) -> Result<RunOutcome> {
        let merged = state.merge_terminated();
        let interrupts = state.pending_interrupts();
        if interrupts.is_empty() && state.node == Node::Branching {
            state.node = Node::Joined;
        }
        state.updated_at = Utc::now();

        let payload = serde_json::to_value(&state)?;
        let record = self
            .store
            .commit(&state.thread_id, payload, expected_version)
            .await?;
        debug!(
            "Committed thread {} version {} ({} branch(es) merged)",
            state.thread_id, record.version, merged
        );

        let thread_id = state.thread_id.clone();
        if state.is_joined() {
            let employee = state.employee();
            info!(
                "Thread {} joined: {} agent(s), {} unsatisfied",
                thread_id,
                employee.agents.len(),
                employee.unsatisfied_workflows.len()
            );
            publish(
                sink,
                LifecycleEvent::ThreadCompleted {
                    thread_id: thread_id.clone(),
                    agents: employee.agents.len(),
                    unsatisfied: employee.unsatisfied_workflows.len(),
                    failures: state.failures.len(),
                },
            )
            .await;
            Ok(RunOutcome::Completed {
                thread_id,
                employee,
                failures: state.failures,
            })
        } else {
            info!(
                "Thread {} suspended with {} pending question(s)",
                thread_id,
                interrupts.len()
            );
            publish(
                sink,
                LifecycleEvent::ThreadSuspended {
                    thread_id: thread_id.clone(),
                    pending: interrupts.len(),
                },
            )
            .await;
            Ok(RunOutcome::Suspended {
                thread_id,
                interrupts,
            })
        }
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .thread_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the map's entry once no other caller holds it
    fn release_thread_lock(&self, thread_id: &str, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self
            .thread_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let idle = locks
            .get(thread_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(entry) == 2);
        if idle {
            locks.remove(thread_id);
        }
    }
}

/// Pick the interrupt a resume request answers
///
/// An untargeted request never guesses between several questions: a retry
/// would otherwise land on whichever question is pending next.
fn select_interrupt(request: &ResumeRequest, pending: &[Interrupt]) -> Result<Interrupt> {
    if pending.is_empty() {
        return Err(RosterError::NoPendingInterrupt(request.thread_id.clone()));
    }
    match &request.interrupt_id {
        None if pending.len() == 1 => Ok(pending[0].clone()),
        None => Err(RosterError::AmbiguousInterrupt {
            thread_id: request.thread_id.clone(),
            pending: pending.iter().map(|i| i.interrupt_id.clone()).collect(),
        }),
        Some(id) => pending
            .iter()
            .find(|i| &i.interrupt_id == id)
            .cloned()
            .ok_or_else(|| RosterError::StaleInterrupt {
                thread_id: request.thread_id.clone(),
                interrupt_id: id.clone(),
            }),
    }
}
