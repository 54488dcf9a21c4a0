//! Typed orchestration events
//!
//! Every event the orchestrator publishes is a variant of [`RunEvent`].
//! Consumers subscribe to a set of [`EventKind`]s and only receive matching
//! events.

use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::warn;

use suitewatch_common::{
    ComprehensiveTestResults, DetectedError, ProgressReport, TestExecutionResult,
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        run_id: String,
        total_suites: usize,
    },
    Progress(ProgressReport),
    SuiteStarted {
        suite: String,
        role: String,
    },
    SuiteCompleted(TestExecutionResult),
    TestStarted {
        suite: String,
        title: String,
    },
    TestPassed {
        suite: String,
        title: String,
    },
    TestFailed {
        suite: String,
        title: String,
    },
    RealTimeError(DetectedError),
    Completed(Box<ComprehensiveTestResults>),
    Error {
        message: String,
    },
    Cancelled,
}

/// Discriminant of [`RunEvent`], used for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Started,
    Progress,
    SuiteStarted,
    SuiteCompleted,
    TestStarted,
    TestPassed,
    TestFailed,
    RealTimeError,
    Completed,
    Error,
    Cancelled,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::Started,
        EventKind::Progress,
        EventKind::SuiteStarted,
        EventKind::SuiteCompleted,
        EventKind::TestStarted,
        EventKind::TestPassed,
        EventKind::TestFailed,
        EventKind::RealTimeError,
        EventKind::Completed,
        EventKind::Error,
        EventKind::Cancelled,
    ];
}

impl RunEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RunEvent::Started { .. } => EventKind::Started,
            RunEvent::Progress(_) => EventKind::Progress,
            RunEvent::SuiteStarted { .. } => EventKind::SuiteStarted,
            RunEvent::SuiteCompleted(_) => EventKind::SuiteCompleted,
            RunEvent::TestStarted { .. } => EventKind::TestStarted,
            RunEvent::TestPassed { .. } => EventKind::TestPassed,
            RunEvent::TestFailed { .. } => EventKind::TestFailed,
            RunEvent::RealTimeError(_) => EventKind::RealTimeError,
            RunEvent::Completed(_) => EventKind::Completed,
            RunEvent::Error { .. } => EventKind::Error,
            RunEvent::Cancelled => EventKind::Cancelled,
        }
    }
}

/// Broadcast bus for run events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to the given kinds
    pub fn subscribe(&self, kinds: &[EventKind]) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            kinds: kinds.iter().copied().collect(),
        }
    }

    /// Subscribe to every kind
    pub fn subscribe_all(&self) -> EventSubscription {
        self.subscribe(&EventKind::ALL)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Filtered receiver handed out by [`EventBus::subscribe`]
pub struct EventSubscription {
    receiver: broadcast::Receiver<RunEvent>,
    kinds: HashSet<EventKind>,
}

impl EventSubscription {
    /// Next matching event, or `None` once the bus is dropped
    pub async fn recv(&mut self) -> Option<RunEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.kinds.contains(&event.kind()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<RunEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.kinds.contains(&event.kind()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events dropped", skipped);
                }
                Err(_) => return None,
            }
        }
    }
}
