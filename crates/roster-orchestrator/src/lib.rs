//! # roster-orchestrator
//!
//! Checkpointed fan-out/join engine that staffs an AI employee from a job
//! description.
//!
//! This crate provides:
//! - Step runner: bounded model/tool loop with output gates and `ask_human` suspension
//! - Decomposer, matcher and assembler stages
//! - Pure branch state machine and its driver
//! - Engine: fan-out, order-independent join, one checkpoint per call, targeted resume
//! - Lifecycle events (tracing, channel stream, fan-out)
//! - Capability approval gate

mod approval;
mod branch;
mod checkpoint;
mod context;
mod engine;
mod events;
mod nodes;
mod state_machine;
mod step;
mod tools;

pub use approval::{
    ApprovalCheck, ApprovalDecision, ApprovalGate, ApprovalRequest, CapabilityInvoker,
    GatedInvoker, InvocationOutcome, MockInvoker,
};
pub use branch::BranchDriver;
pub use checkpoint::{BranchContribution, BranchRecord, ExecutionState, Interrupt, Node};
pub use context::ExecutionContext;
pub use engine::{Engine, EventStream, ResumeRequest, RunOutcome};
pub use events::{
    publish, ChannelSink, EventSink, FanoutSink, LifecycleEvent, NullSink, TracingSink,
};
pub use nodes::{Assembler, Decomposer, Matcher, ASSEMBLER_TAG, DECOMPOSER_TAG, MATCHER_TAG};
pub use state_machine::{transition, BranchAction, BranchEvent, BranchState};
pub use step::{PendingToolCall, StepConfig, StepOutcome, StepRunner, StepState, StepTask};
pub use tools::Tool;
