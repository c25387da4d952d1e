//! The seam between the engine and the platform's windowing system.
//!
//! Everything the engine knows about real windows and surfaces goes through
//! [`Backend`]. [`HeadlessBackend`] keeps the whole compositing tree in memory
//! and backs the tests and the terminal inspector.

mod headless;

pub use headless::{HeadlessBackend, HeadlessSurface, HeadlessWindow, SuspensionHook, SuspensionPoint};

use std::fmt;

use async_trait::async_trait;
use crossterm::event::KeyEvent;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::geometry::{Bounds, Display, Point};

/// Backend window id. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Backend surface id. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    #[default]
    Normal,
    Minimized,
    Maximized,
    Fullscreen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub title: String,
    pub bounds: Bounds,
    /// No OS title bar; the app draws its own controls.
    pub chromeless: bool,
    pub resizable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SurfaceSpec {
    /// Label for diagnostics only.
    pub label: String,
    pub transparent: bool,
}

/// What a surface renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum ContentSource {
    Url(String),
    File(String),
}

impl ContentSource {
    pub fn location(&self) -> &str {
        match self {
            ContentSource::Url(s) | ContentSource::File(s) => s,
        }
    }
}

impl fmt::Display for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::Url(url) => f.write_str(url),
            ContentSource::File(path) => write!(f, "file://{path}"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("window {0} is gone")]
    WindowGone(WindowId),

    #[error("surface {0} is gone")]
    SurfaceGone(SurfaceId),

    #[error("surface {surface} is not attached to window {window}")]
    NotAttached { window: WindowId, surface: SurfaceId },

    #[error("load of `{resource}` failed: {reason}")]
    LoadFailed { resource: String, reason: String },

    #[error("backend rejected request: {0}")]
    Rejected(String),
}

/// Things that happen to windows and surfaces outside the engine's control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSignal {
    /// The window was closed by the user or the OS (title bar, shortcut).
    WindowClosed(WindowId),
    WindowResized { window: WindowId, bounds: Bounds },
    WindowFocused(WindowId),
    WindowBlurred(WindowId),
    SurfaceCrashed { surface: SurfaceId, reason: String },
    SurfaceUnresponsive(SurfaceId),
    SurfaceResponsive(SurfaceId),
    /// The surface was destroyed by something other than the engine.
    SurfaceGone(SurfaceId),
    Input { surface: SurfaceId, key: KeyEvent },
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Window and surface primitives.
///
/// Async methods are suspension points: anything captured before awaiting
/// one of them must be revalidated afterwards.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    fn create_window(&self, spec: &WindowSpec) -> BackendResult<WindowId>;
    /// Idempotent.
    fn destroy_window(&self, window: WindowId);
    fn window_alive(&self, window: WindowId) -> bool;
    fn window_bounds(&self, window: WindowId) -> BackendResult<Bounds>;
    fn set_window_bounds(&self, window: WindowId, bounds: Bounds) -> BackendResult<()>;
    fn focus_window(&self, window: WindowId) -> BackendResult<()>;
    fn set_window_state(&self, window: WindowId, state: WindowState) -> BackendResult<()>;
    fn window_state(&self, window: WindowId) -> BackendResult<WindowState>;
    fn displays(&self) -> Vec<Display>;
    fn cursor_position(&self) -> Point;

    async fn create_surface(&self, spec: &SurfaceSpec) -> BackendResult<SurfaceId>;
    /// Idempotent.
    fn destroy_surface(&self, surface: SurfaceId);
    fn surface_alive(&self, surface: SurfaceId) -> bool;
    /// Add `surface` on top of `window`'s z-order, moving it there if it is
    /// already attached.
    async fn attach_surface(&self, window: WindowId, surface: SurfaceId) -> BackendResult<()>;
    fn detach_surface(&self, window: WindowId, surface: SurfaceId) -> BackendResult<()>;
    fn set_surface_bounds(&self, surface: SurfaceId, bounds: Bounds) -> BackendResult<()>;
    async fn load(&self, surface: SurfaceId, source: &ContentSource) -> BackendResult<()>;
    fn post_message(
        &self,
        surface: SurfaceId,
        channel: &str,
        payload: serde_json::Value,
    ) -> BackendResult<()>;

    /// Hands out the signal stream. Only the first caller gets it.
    fn take_signals(&self) -> Option<mpsc::UnboundedReceiver<BackendSignal>>;
}
