//! Push events published to the presentation layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::backend::WindowId;
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::lifecycle::SweepReport;
use crate::view::{ViewCategory, ViewId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMeta {
    pub subject_id: String,
    pub window_id: Option<WindowId>,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(subject: impl ToString, window_id: Option<WindowId>) -> Self {
        Self {
            subject_id: subject.to_string(),
            window_id,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The user or OS closed the detached window.
    WindowClosed,
    /// Dismiss gesture or control-bar close button.
    Dismissed,
    Reattached,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Created {
        #[serde(flatten)]
        meta: EventMeta,
        category: ViewCategory,
    },
    Removed {
        #[serde(flatten)]
        meta: EventMeta,
    },
    Switched {
        #[serde(flatten)]
        meta: EventMeta,
        previous: Option<ViewId>,
    },
    /// `meta.window_id` is the new detached window.
    Detached {
        #[serde(flatten)]
        meta: EventMeta,
        source_window: WindowId,
    },
    /// `meta.window_id` is the window the view went back to.
    Reattached {
        #[serde(flatten)]
        meta: EventMeta,
        detached_window: WindowId,
    },
    /// A detached window finished its close cascade. `meta.subject_id` is
    /// the view it hosted.
    Closed {
        #[serde(flatten)]
        meta: EventMeta,
        reason: CloseReason,
    },
    Focused {
        #[serde(flatten)]
        meta: EventMeta,
    },
    Blurred {
        #[serde(flatten)]
        meta: EventMeta,
    },
    Paused {
        #[serde(flatten)]
        meta: EventMeta,
    },
    Resumed {
        #[serde(flatten)]
        meta: EventMeta,
    },
    SweepCompleted {
        report: SweepReport,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Created { .. } => "created",
            EngineEvent::Removed { .. } => "removed",
            EngineEvent::Switched { .. } => "switched",
            EngineEvent::Detached { .. } => "detached",
            EngineEvent::Reattached { .. } => "reattached",
            EngineEvent::Closed { .. } => "closed",
            EngineEvent::Focused { .. } => "focused",
            EngineEvent::Blurred { .. } => "blurred",
            EngineEvent::Paused { .. } => "paused",
            EngineEvent::Resumed { .. } => "resumed",
            EngineEvent::SweepCompleted { .. } => "sweep_completed",
        }
    }

    pub fn meta(&self) -> Option<&EventMeta> {
        match self {
            EngineEvent::Created { meta, .. }
            | EngineEvent::Removed { meta }
            | EngineEvent::Switched { meta, .. }
            | EngineEvent::Detached { meta, .. }
            | EngineEvent::Reattached { meta, .. }
            | EngineEvent::Closed { meta, .. }
            | EngineEvent::Focused { meta }
            | EngineEvent::Blurred { meta }
            | EngineEvent::Paused { meta }
            | EngineEvent::Resumed { meta } => Some(meta),
            EngineEvent::SweepCompleted { .. } => None,
        }
    }
}

/// Fan-out channel shared by every manager. Emitting with no subscribers is
/// not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: EngineEvent) {
        tracing::trace!(event = event.name(), "emit");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

/// Drain everything currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => out.push(ev),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}
