//! Window and view orchestration for a launcher that composites several
//! content surfaces per window and can tear views out into their own
//! windows.
//!
//! [`Engine`] is the entry point. It owns the [`WindowController`],
//! [`ViewRegistry`], [`LifecycleManager`] and [`DetachManager`] and talks to
//! the platform through a [`Backend`].

pub mod backend;
pub mod command;
pub mod config;
pub mod constants;
pub mod debounce;
pub mod detach;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod events;
pub mod geometry;
pub mod gestures;
pub mod inspector;
pub mod lifecycle;
pub mod liveness;
pub mod log_buffer;
pub mod tracing_sub;
pub mod view;
pub mod window;

pub use backend::{Backend, BackendSignal, ContentSource, HeadlessBackend, SurfaceId, WindowId};
pub use command::{Command, Response};
pub use config::EngineConfig;
pub use detach::{ControlBarAction, DetachManager, DetachOptions};
pub use engine::{Engine, ShowViewRequest};
pub use error::{Result, WmError};
pub use events::{CloseReason, EngineEvent};
pub use geometry::{Bounds, Size};
pub use lifecycle::{CloseOutcome, LifecycleManager, LifecycleStrategy};
pub use view::{ViewCategory, ViewConfig, ViewId, ViewInfo, ViewRegistry};
pub use window::WindowController;
