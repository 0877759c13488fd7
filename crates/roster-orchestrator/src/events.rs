//! Lifecycle notifications
//!
//! Publishing is fire-and-forget: sinks are called through
//! [`fail_open`](roster_core::fail_open::fail_open), so a broken sink only
//! produces a warning.

use async_trait::async_trait;
use roster_core::fail_open::fail_open;
use roster_core::{Result, RosterError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

/// State update emitted while a thread runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ThreadStarted {
        thread_id: String,
    },
    WorkflowsDecomposed {
        thread_id: String,
        count: usize,
        /// The generic fallback workflow was used
        fallback: bool,
    },
    BranchStarted {
        thread_id: String,
        branch_id: String,
        workflow: String,
    },
    BranchSuspended {
        thread_id: String,
        branch_id: String,
        interrupt_id: String,
        question: String,
    },
    BranchResumed {
        thread_id: String,
        branch_id: String,
        interrupt_id: String,
    },
    BranchCompleted {
        thread_id: String,
        branch_id: String,
        /// `agent` or `unsatisfied`
        outcome: String,
    },
    BranchFailed {
        thread_id: String,
        branch_id: String,
        error: String,
    },
    ThreadSuspended {
        thread_id: String,
        pending: usize,
    },
    ThreadCompleted {
        thread_id: String,
        agents: usize,
        unsatisfied: usize,
        failures: usize,
    },
}

impl LifecycleEvent {
    pub fn thread_id(&self) -> &str {
        match self {
            LifecycleEvent::ThreadStarted { thread_id }
            | LifecycleEvent::WorkflowsDecomposed { thread_id, .. }
            | LifecycleEvent::BranchStarted { thread_id, .. }
            | LifecycleEvent::BranchSuspended { thread_id, .. }
            | LifecycleEvent::BranchResumed { thread_id, .. }
            | LifecycleEvent::BranchCompleted { thread_id, .. }
            | LifecycleEvent::BranchFailed { thread_id, .. }
            | LifecycleEvent::ThreadSuspended { thread_id, .. }
            | LifecycleEvent::ThreadCompleted { thread_id, .. } => thread_id,
        }
    }
}

/// Destination for lifecycle events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &LifecycleEvent) -> Result<()>;
}

/// Publish without letting a sink failure reach the caller
pub async fn publish(sink: &dyn EventSink, event: LifecycleEvent) {
    fail_open("event_sink", || sink.publish(&event)).await;
}

/// Logs every event at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn publish(&self, event: &LifecycleEvent) -> Result<()> {
        info!(thread = event.thread_id(), "{}", serde_json::to_string(event)?);
        Ok(())
    }
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn publish(&self, _event: &LifecycleEvent) -> Result<()> {
        Ok(())
    }
}

/// Forwards events into a stream
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<LifecycleEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiverStream<LifecycleEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, UnboundedReceiverStream::new(rx))
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn publish(&self, event: &LifecycleEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| RosterError::Other("event stream receiver was dropped".to_string()))
    }
}

/// Publishes to several sinks; every sink is tried even if one fails
#[derive(Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    async fn publish(&self, event: &LifecycleEvent) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(event).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    struct BrokenSink;

    #[async_trait]
    impl EventSink for BrokenSink {
        async fn publish(&self, _event: &LifecycleEvent) -> Result<()> {
            Err(RosterError::Other("sink down".to_string()))
        }
    }

    fn started(id: &str) -> LifecycleEvent {
        LifecycleEvent::ThreadStarted {
            thread_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_channel_sink_streams_events() {
        let (sink, mut stream) = ChannelSink::new();
        publish(&sink, started("t1")).await;
        publish(&sink, started("t2")).await;
        drop(sink);

        let events: Vec<LifecycleEvent> = (&mut stream).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].thread_id(), "t2");
    }

    #[tokio::test]
    async fn test_broken_sink_fails_open() {
        // Must not panic or propagate
        publish(&BrokenSink, started("t1")).await;
        publish(&TracingSink, started("t1")).await;
        publish(&NullSink, started("t1")).await;
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_sink() {
        let (channel, stream) = ChannelSink::new();
        let fanout = FanoutSink::new(vec![Arc::new(BrokenSink), Arc::new(channel)]);

        assert!(fanout.publish(&started("t1")).await.is_err());
        drop(fanout);

        let events: Vec<LifecycleEvent> = stream.collect().await;
        assert_eq!(events, vec![started("t1")]);
    }

    #[test]
    fn test_event_wire_shape() {
        let event = LifecycleEvent::BranchCompleted {
            thread_id: "t".to_string(),
            branch_id: "b".to_string(),
            outcome: "agent".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "branch_completed");
        assert_eq!(value["outcome"], "agent");
    }
}
