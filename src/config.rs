//! Engine configuration, loaded from TOML.
//!
//! Every section and field has a default, so an empty file (or no file) is a
//! valid configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    APP_PADDING, CONTROL_BAR_HEIGHT, FILE_LOAD_TIMEOUT, HEADER_HEIGHT, OVERLAY_BACKGROUND_PADDING,
    URL_LOAD_TIMEOUT,
};
use crate::geometry::Size;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub layout: LayoutConfig,
    pub content: ContentConfig,
    pub lifecycle: LifecycleConfig,
    pub detach: DetachConfig,
    pub gestures: GestureConfig,
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Main launcher window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Upper bound for content-driven height changes.
    pub max_height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Launcher".to_string(),
            width: 800,
            height: 600,
            max_height: 800,
        }
    }
}

impl WindowConfig {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub header_height: u32,
    pub app_padding: u32,
    pub overlay_background_padding: u32,
    pub resize_debounce_ms: u64,
    /// Height changes at or below this many pixels are ignored.
    pub resize_tolerance: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            header_height: HEADER_HEIGHT,
            app_padding: APP_PADDING,
            overlay_background_padding: OVERLAY_BACKGROUND_PADDING,
            resize_debounce_ms: 50,
            resize_tolerance: 5,
        }
    }
}

impl LayoutConfig {
    pub fn overlay_padding(&self) -> u32 {
        self.app_padding + self.overlay_background_padding
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Resource loaded into the main window's primary view.
    pub primary_url: String,
    pub url_load_timeout_ms: u64,
    pub file_load_timeout_ms: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            primary_url: "app://launcher/index.html".to_string(),
            url_load_timeout_ms: URL_LOAD_TIMEOUT.as_millis() as u64,
            file_load_timeout_ms: FILE_LOAD_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ContentConfig {
    pub fn url_load_timeout(&self) -> Duration {
        Duration::from_millis(self.url_load_timeout_ms)
    }

    pub fn file_load_timeout(&self) -> Duration {
        Duration::from_millis(self.file_load_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub auto_sweep: bool,
    pub sweep_interval_secs: u64,
    /// Total memory weight of paused views above which a sweep evicts.
    pub memory_threshold_mb: f64,
    /// Idle limit for paused views without their own override.
    pub max_idle_secs: u64,
    /// Idle limit given to background views by strategy inference.
    pub background_max_idle_secs: u64,
    /// Weight assumed for a view until a real estimate is reported.
    pub default_memory_weight_mb: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            auto_sweep: true,
            sweep_interval_secs: 30,
            memory_threshold_mb: 500.0,
            max_idle_secs: 10 * 60,
            background_max_idle_secs: 5 * 60,
            default_memory_weight_mb: 50.0,
        }
    }
}

impl LifecycleConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    pub fn background_max_idle(&self) -> Duration {
        Duration::from_secs(self.background_max_idle_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetachConfig {
    pub default_width: u32,
    pub default_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub control_bar_height: u32,
    pub control_bar_url: String,
    pub init_timeout_ms: u64,
    pub show_control_bar: bool,
}

impl Default for DetachConfig {
    fn default() -> Self {
        Self {
            default_width: 800,
            default_height: 600,
            min_width: 400,
            min_height: 300,
            control_bar_height: CONTROL_BAR_HEIGHT,
            control_bar_url: "app://launcher/detached-window.html".to_string(),
            init_timeout_ms: 5_000,
            show_control_bar: true,
        }
    }
}

impl DetachConfig {
    pub fn default_size(&self) -> Size {
        Size::new(self.default_width, self.default_height)
    }

    pub fn min_size(&self) -> Size {
        Size::new(self.min_width, self.min_height)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

/// Key combos, written like `"alt+d"` or `"esc"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub detach: Vec<String>,
    pub reattach: Vec<String>,
    pub dismiss: Vec<String>,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            detach: vec!["alt+d".to_string()],
            reattach: vec!["alt+r".to_string()],
            dismiss: vec!["esc".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::io::Write;

    #[test]
    fn empty_document_is_all_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.layout.overlay_padding(), 16);
        assert_eq!(cfg.detach.control_bar_height, 32);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = EngineConfig::from_toml_str(indoc! {r#"
            [lifecycle]
            memory_threshold_mb = 120.5
            sweep_interval_secs = 5

            [gestures]
            detach = ["ctrl+shift+d"]
        "#})
        .unwrap();
        assert_eq!(cfg.lifecycle.memory_threshold_mb, 120.5);
        assert_eq!(cfg.lifecycle.sweep_interval(), Duration::from_secs(5));
        assert_eq!(cfg.lifecycle.max_idle_secs, 600);
        assert_eq!(cfg.gestures.detach, vec!["ctrl+shift+d"]);
        assert_eq!(cfg.gestures.dismiss, vec!["esc"]);
    }

    #[test]
    fn load_reads_file_and_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window]\nwidth = 1024").unwrap();
        let cfg = EngineConfig::load(file.path()).unwrap();
        assert_eq!(cfg.window.width, 1024);
        assert_eq!(cfg.window.height, 600);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[window]\nwidth = \"wide\"").unwrap();
        assert!(matches!(
            EngineConfig::load(bad.path()),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::load("/nonexistent/surface-wm.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
