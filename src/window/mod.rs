//! Host windows.

mod controller;

pub use controller::WindowController;

use serde::Serialize;

use crate::backend::{WindowId, WindowState};
use crate::geometry::{Bounds, Point, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Main,
    Detached,
}

/// Where a window currently lives. Parked windows are still shown by the OS
/// but sit outside every display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Visible,
    Parked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOptions {
    pub kind: WindowKind,
    pub title: String,
    pub size: Size,
    /// Centered on the primary work area when `None`.
    pub position: Option<Point>,
    pub chromeless: bool,
    pub resizable: bool,
}

impl WindowOptions {
    pub fn main(title: impl Into<String>, size: Size) -> Self {
        Self {
            kind: WindowKind::Main,
            title: title.into(),
            size,
            position: None,
            chromeless: false,
            resizable: false,
        }
    }

    pub fn detached(title: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            kind: WindowKind::Detached,
            title: title.into(),
            size: bounds.size(),
            position: Some(bounds.origin()),
            chromeless: true,
            resizable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSummary {
    pub id: WindowId,
    pub kind: WindowKind,
    pub title: String,
    pub placement: Placement,
    pub state: Option<WindowState>,
    pub bounds: Option<Bounds>,
}
