//! Studio event broadcaster for real-time notices and progress streaming.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::pipeline::PipelineProgress;
use crate::studio::ActiveView;

/// Default channel capacity. Progress snapshots are emitted per stream chunk,
/// so slow subscribers may lag and skip intermediate snapshots.
const DEFAULT_CAPACITY: usize = 256;

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

impl std::fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoticeLevel::Info => write!(f, "info"),
            NoticeLevel::Success => write!(f, "success"),
            NoticeLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioEvent {
    /// Transient notification.
    Notice { level: NoticeLevel, message: String },
    /// An operation needs an API key before it can run.
    CredentialRequired { message: String },
    /// Latest tracker snapshot; `None` once progress is discarded.
    Progress { progress: Option<PipelineProgress> },
    /// Active view or progress visibility changed.
    View {
        view: ActiveView,
        progress_visible: bool,
    },
}

#[derive(Clone)]
pub struct StudioEventBroadcaster {
    sender: Arc<broadcast::Sender<StudioEvent>>,
}

impl StudioEventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: StudioEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.send(StudioEvent::Notice {
            level,
            message: message.into(),
        });
    }

    /// Creates a new subscriber for studio events.
    pub fn subscribe(&self) -> broadcast::Receiver<StudioEvent> {
        self.sender.subscribe()
    }
}

impl Default for StudioEventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
