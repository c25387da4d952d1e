//! Content views and the registry that composites them.

pub mod layout;
mod registry;

pub use registry::{DetachState, ViewRegistry, ViewTicket, WindowMetrics, load_with_timeout};

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{ContentSource, WindowId};
use crate::geometry::Bounds;

/// Stable view id, usually namespaced like `plugin:calculator`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(String);

impl ViewId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ViewId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ViewId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewCategory {
    Primary,
    Settings,
    Plugin,
    /// Control bar drawn at the top of a detached window.
    DetachedChrome,
}

impl ViewCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ViewCategory::Primary => "Launcher",
            ViewCategory::Settings => "Settings",
            ViewCategory::Plugin => "Plugin",
            ViewCategory::DetachedChrome => "Control Bar",
        }
    }
}

/// Plugin metadata passed through to the control bar. Never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub full_path: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub id: ViewId,
    pub category: ViewCategory,
    pub bounds: Bounds,
    #[serde(default)]
    pub source: Option<ContentSource>,
    #[serde(default)]
    pub transparent: bool,
    #[serde(default)]
    pub descriptor: Option<PluginDescriptor>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ViewConfig {
    pub fn new(id: impl Into<ViewId>, category: ViewCategory, bounds: Bounds) -> Self {
        Self {
            id: id.into(),
            category,
            bounds,
            source: None,
            transparent: false,
            descriptor: None,
            metadata: None,
        }
    }

    pub fn with_source(mut self, source: ContentSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_descriptor(mut self, descriptor: PluginDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceHealth {
    #[default]
    Healthy,
    Unresponsive,
    Crashed,
}

/// Snapshot of a registered view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewInfo {
    pub id: ViewId,
    pub category: ViewCategory,
    pub bounds: Bounds,
    pub owner_window_id: WindowId,
    pub visible: bool,
    pub active: bool,
    pub health: SurfaceHealth,
    pub source: Option<ContentSource>,
    pub descriptor: Option<PluginDescriptor>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

/// Per-window compositing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeState {
    #[default]
    PrimaryOnly,
    PrimaryWithOverlay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum LoadOutcome {
    Loaded,
    Failed(String),
    TimedOut,
}
