//! Notifications emitted by the resolution workflow.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::conflict::ResolutionMethod;

/// Something observable happened in the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    ScanStarted,
    ScanCompleted { count: usize },
    NoConflictsToResolve,
    ResolutionStarted { path: String },
    ResolutionSucceeded { path: String, method: ResolutionMethod },
    ResolutionFailed { path: String, error: String },
    ResolutionUndone { path: String },
    /// Traversal restarted from the first record.
    WrappedAround { path: String },
    /// Every record matching the filter is resolved; others remain.
    FilterResolved { remaining_unfiltered: usize },
    AllResolved,
    Aborted,
}

pub type EventReceiver = mpsc::UnboundedReceiver<WorkflowEvent>;

/// Sending half of the event channel. Sending never blocks, and a dropped
/// receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: WorkflowEvent) {
        debug!(?event, "workflow event");
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_delivered_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(WorkflowEvent::ScanStarted);
        sink.emit(WorkflowEvent::ScanCompleted { count: 2 });
        assert_eq!(rx.try_recv().unwrap(), WorkflowEvent::ScanStarted);
        assert_eq!(rx.try_recv().unwrap(), WorkflowEvent::ScanCompleted { count: 2 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(WorkflowEvent::Aborted);
        EventSink::disconnected().emit(WorkflowEvent::Aborted);
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_string(&WorkflowEvent::FilterResolved {
            remaining_unfiltered: 2,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"filter_resolved","remaining_unfiltered":2}"#);
    }
}
