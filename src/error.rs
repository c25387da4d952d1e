//! Error taxonomy shared by every manager.
//!
//! Operations return [`Result`]; only programmer errors panic, and those are
//! caught at [`crate::engine::Engine::execute`].

use std::fmt;

use thiserror::Error;

use crate::backend::{BackendError, SurfaceId, WindowId};
use crate::view::ViewId;

/// What an error is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Window(WindowId),
    View(ViewId),
    Surface(SurfaceId),
    ViewInWindow(ViewId, WindowId),
    Detachment(WindowId),
    Lifecycle(ViewId),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Window(id) => write!(f, "window {id}"),
            Subject::View(id) => write!(f, "view `{id}`"),
            Subject::Surface(id) => write!(f, "surface {id}"),
            Subject::ViewInWindow(view, window) => write!(f, "view `{view}` in window {window}"),
            Subject::Detachment(id) => write!(f, "detachment for window {id}"),
            Subject::Lifecycle(id) => write!(f, "lifecycle record for `{id}`"),
        }
    }
}

/// Step of a multi-step operation at which it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CreateWindow,
    CreateSurface,
    CreateControlBar,
    Revalidate,
    Reparent,
    Layout,
    InitControlBar,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::CreateWindow => "create-window",
            Stage::CreateSurface => "create-surface",
            Stage::CreateControlBar => "create-control-bar",
            Stage::Revalidate => "revalidate",
            Stage::Reparent => "reparent",
            Stage::Layout => "layout",
            Stage::InitControlBar => "init-control-bar",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum WmError {
    #[error("{0} not found")]
    NotFound(Subject),

    #[error("{0} already exists")]
    AlreadyExists(Subject),

    #[error("stale reference to {0}")]
    InvalidReference(Subject),

    #[error("{operation} timed out after {millis}ms")]
    OperationTimeout { operation: &'static str, millis: u64 },

    #[error("{operation} failed at {stage}: {reason} (rolled back: {rolled_back})")]
    PartialFailure {
        operation: &'static str,
        stage: Stage,
        reason: String,
        rolled_back: bool,
    },

    #[error("{operation} not permitted on {subject}: {reason}")]
    NotPermitted {
        operation: &'static str,
        subject: Subject,
        reason: &'static str,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl WmError {
    /// Short machine-readable name, used by the command boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            WmError::NotFound(_) => "not_found",
            WmError::AlreadyExists(_) => "already_exists",
            WmError::InvalidReference(_) => "invalid_reference",
            WmError::OperationTimeout { .. } => "operation_timeout",
            WmError::PartialFailure { .. } => "partial_failure",
            WmError::NotPermitted { .. } => "not_permitted",
            WmError::Backend(_) => "backend",
        }
    }

    pub(crate) fn partial(
        operation: &'static str,
        stage: Stage,
        reason: impl fmt::Display,
        rolled_back: bool,
    ) -> Self {
        WmError::PartialFailure {
            operation,
            stage,
            reason: reason.to_string(),
            rolled_back,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WmError::NotFound(_))
    }

    pub fn is_invalid_reference(&self) -> bool {
        matches!(self, WmError::InvalidReference(_))
    }
}

pub type Result<T, E = WmError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_subject() {
        let err = WmError::NotFound(Subject::View(ViewId::from("plugin:calc")));
        assert_eq!(err.to_string(), "view `plugin:calc` not found");
        assert_eq!(err.kind(), "not_found");

        let err = WmError::partial("detach", Stage::Reparent, "surface gone", true);
        assert_eq!(
            err.to_string(),
            "detach failed at reparent: surface gone (rolled back: true)"
        );
    }
}
