//! The synthetic control bar shown at the top of detached windows.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::{ContentSource, WindowId};
use crate::constants::FALLBACK_DETACHED_TITLE;
use crate::view::{LoadOutcome, ViewCategory, ViewInfo};

/// Buttons the control bar can send back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlBarAction {
    Minimize,
    /// Toggles between maximized and normal.
    Maximize,
    Close,
    Reattach,
}

/// Explicit title, then the plugin name, then a label for settings views.
pub fn detached_title(info: &ViewInfo, requested: Option<&str>) -> String {
    if let Some(t) = requested.filter(|t| !t.trim().is_empty()) {
        return t.to_string();
    }
    if let Some(d) = info.descriptor.as_ref().filter(|d| !d.name.is_empty()) {
        return d.name.clone();
    }
    match info.category {
        ViewCategory::Settings => ViewCategory::Settings.label().to_string(),
        _ => FALLBACK_DETACHED_TITLE.to_string(),
    }
}

pub fn init_payload(window: WindowId, info: &ViewInfo, title: &str) -> serde_json::Value {
    json!({
        "windowId": window.0,
        "viewId": info.id,
        "sourceUrl": info.source.as_ref().map(ContentSource::to_string),
        "title": title,
        "descriptor": info.descriptor,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    })
}

/// How control-bar initialization went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Ready,
    /// The bar could not be initialized; the original resource was loaded
    /// into it instead.
    FellBack { cause: InitFailure },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitFailure {
    LoadTimedOut,
    LoadFailed(String),
    MessageRejected(String),
}

impl InitFailure {
    pub fn from_load(outcome: LoadOutcome) -> Option<Self> {
        match outcome {
            LoadOutcome::Loaded => None,
            LoadOutcome::TimedOut => Some(InitFailure::LoadTimedOut),
            LoadOutcome::Failed(reason) => Some(InitFailure::LoadFailed(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Bounds;
    use crate::view::{PluginDescriptor, ViewId};
    use chrono::Utc;

    fn info(category: ViewCategory) -> ViewInfo {
        ViewInfo {
            id: ViewId::from("plugin:notes"),
            category,
            bounds: Bounds::new(0, 0, 10, 10),
            owner_window_id: WindowId(1),
            visible: true,
            active: true,
            health: Default::default(),
            source: Some(ContentSource::Url("https://notes.example".into())),
            descriptor: None,
            metadata: None,
            created_at: Utc::now(),
            last_access: Utc::now(),
        }
    }

    #[test]
    fn title_precedence() {
        let mut i = info(ViewCategory::Plugin);
        assert_eq!(detached_title(&i, None), FALLBACK_DETACHED_TITLE);
        assert_eq!(detached_title(&info(ViewCategory::Settings), None), "Settings");
        i.descriptor = Some(PluginDescriptor {
            full_path: "/plugins/notes".into(),
            name: "Notes".into(),
            version: "1.2.0".into(),
        });
        assert_eq!(detached_title(&i, None), "Notes");
        assert_eq!(detached_title(&i, Some("Pinned")), "Pinned");
        assert_eq!(detached_title(&i, Some("  ")), "Notes");
    }

    #[test]
    fn payload_carries_ids_and_source() {
        let p = init_payload(WindowId(9), &info(ViewCategory::Plugin), "Notes");
        assert_eq!(p["windowId"], 9);
        assert_eq!(p["viewId"], "plugin:notes");
        assert_eq!(p["sourceUrl"], "https://notes.example");
        assert_eq!(p["title"], "Notes");
        assert!(p["descriptor"].is_null());
    }
}
