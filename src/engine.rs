//! Application root. Builds every manager once, wires them together and
//! exposes the launcher-level operations the command boundary calls.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::backend::{Backend, BackendSignal, ContentSource, WindowId};
use crate::config::EngineConfig;
use crate::constants::{CONTROL_BAR_ID_PREFIX, PRIMARY_VIEW_ID};
use crate::debounce::Debouncer;
use crate::detach::{ControlBarAction, DetachManager, DetachOptions, DetachStats};
use crate::error::{Result, Subject, WmError};
use crate::events::{CloseReason, EngineEvent, EventBus};
use crate::geometry::BoundsPatch;
use crate::gestures::GestureBindings;
use crate::lifecycle::{CloseOutcome, LifecycleManager, LifecycleStats, LifecycleStrategy, SweepReport};
use crate::view::{
    DetachState, PluginDescriptor, SurfaceHealth, ViewCategory, ViewConfig, ViewId, ViewInfo,
    ViewRegistry, WindowMetrics, layout,
};
use crate::window::{WindowController, WindowKind, WindowOptions};

/// Request to bring a settings or plugin view to the front, creating it on
/// first use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowViewRequest {
    pub category: ViewCategory,
    /// Plugin path; becomes part of the view id.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub source: Option<ContentSource>,
    #[serde(default)]
    pub descriptor: Option<PluginDescriptor>,
    /// Keep the view alive (paused) when it is dismissed.
    #[serde(default)]
    pub persist_on_dismiss: bool,
    /// Create a fresh view even if one with the same id exists.
    #[serde(default)]
    pub force_new: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ShowViewRequest {
    pub fn plugin(path: impl Into<String>, source: ContentSource) -> Self {
        Self {
            category: ViewCategory::Plugin,
            path: Some(path.into()),
            source: Some(source),
            descriptor: None,
            persist_on_dismiss: false,
            force_new: false,
            metadata: None,
        }
    }

    pub fn settings(source: ContentSource) -> Self {
        Self {
            category: ViewCategory::Settings,
            path: None,
            ..Self::plugin(String::new(), source)
        }
    }

    pub fn persistent(mut self) -> Self {
        self.persist_on_dismiss = true;
        self
    }

    /// `plugin:{path}` for plugins, `settings` for settings. Plugins
    /// without a path get a timestamped id.
    pub fn view_id(&self) -> ViewId {
        let path = self
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| self.descriptor.as_ref().map(|d| d.full_path.as_str()));
        match (self.category, path) {
            (ViewCategory::Primary, _) => ViewId::from(PRIMARY_VIEW_ID),
            (ViewCategory::Settings, _) => ViewId::from("settings"),
            (ViewCategory::Plugin, Some(path)) => ViewId::new(format!("plugin:{path}")),
            (ViewCategory::Plugin, None) => {
                ViewId::new(format!("plugin:{}", Utc::now().timestamp_millis()))
            }
            (ViewCategory::DetachedChrome, _) => {
                ViewId::new(format!("{CONTROL_BAR_ID_PREFIX}:{}", Utc::now().timestamp_millis()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub main_windows: usize,
    pub detached_windows: usize,
    pub views: usize,
    pub lifecycle: LifecycleStats,
    pub detach: DetachStats,
    pub memory_threshold_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub switch_time: Option<Duration>,
    pub memory_usage_mb: f64,
    pub active_view_count: usize,
    pub windows: BTreeMap<WindowId, WindowMetrics>,
    pub last_updated: DateTime<Utc>,
}

pub struct Engine {
    backend: Arc<dyn Backend>,
    config: EngineConfig,
    events: EventBus,
    windows: Arc<WindowController>,
    views: Arc<ViewRegistry>,
    lifecycle: Arc<LifecycleManager>,
    detach: Arc<DetachManager>,
    main_window: Mutex<Option<WindowId>>,
    resize: Debouncer,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(backend: Arc<dyn Backend>, config: EngineConfig) -> Arc<Self> {
        let events = EventBus::new();
        let windows = Arc::new(WindowController::new(backend.clone()));
        let views = Arc::new(ViewRegistry::new(
            backend.clone(),
            windows.clone(),
            events.clone(),
            config.layout.clone(),
            config.content.clone(),
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            views.clone(),
            events.clone(),
            config.lifecycle.clone(),
        ));
        let detach = Arc::new(DetachManager::new(
            backend.clone(),
            windows.clone(),
            views.clone(),
            lifecycle.clone(),
            events.clone(),
            config.detach.clone(),
            GestureBindings::from_config(&config.gestures),
        ));
        let probe: Weak<dyn DetachState> = Arc::downgrade(&detach) as Weak<dyn DetachState>;
        views.set_detach_state(probe);

        Arc::new(Self {
            resize: Debouncer::new(config.layout.resize_debounce()),
            backend,
            config,
            events,
            windows,
            views,
            lifecycle,
            detach,
            main_window: Mutex::new(None),
            pump: Mutex::new(None),
        })
    }

    /// Start consuming backend signals and, if configured, the eviction
    /// sweeper. Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        if let Some(mut rx) = self.backend.take_signals() {
            let weak = Arc::downgrade(self);
            let task = tokio::spawn(async move {
                while let Some(signal) = rx.recv().await {
                    let Some(engine) = weak.upgrade() else {
                        break;
                    };
                    engine.handle_signal(signal).await;
                }
            });
            *self.pump.lock() = Some(task);
        } else {
            tracing::warn!("backend signals already taken; external events will be ignored");
        }
        if self.config.lifecycle.auto_sweep {
            self.lifecycle.start_auto_sweep();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn windows(&self) -> &Arc<WindowController> {
        &self.windows
    }

    pub fn views(&self) -> &Arc<ViewRegistry> {
        &self.views
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn detach(&self) -> &Arc<DetachManager> {
        &self.detach
    }

    pub fn main_window(&self) -> Option<WindowId> {
        *self.main_window.lock()
    }

    fn require_main(&self) -> Result<WindowId> {
        let id = self
            .main_window()
            .ok_or(WmError::NotFound(Subject::Window(WindowId(0))))?;
        self.windows.ensure_alive(id)?;
        Ok(id)
    }

    /// Create the main window with its primary view. Returns the existing
    /// window if it is still alive.
    pub async fn create_main_window(&self) -> Result<WindowId> {
        if let Some(existing) = self.main_window() {
            if self.windows.is_alive(existing) {
                return Ok(existing);
            }
            self.teardown_window(existing);
        }
        let wc = &self.config.window;
        let id = self
            .windows
            .create_window(WindowOptions::main(wc.title.clone(), wc.size()))?;
        *self.main_window.lock() = Some(id);

        let primary_id = ViewId::from(PRIMARY_VIEW_ID);
        let primary = ViewConfig::new(
            primary_id.clone(),
            ViewCategory::Primary,
            layout::primary_bounds(wc.size()),
        )
        .with_source(ContentSource::Url(self.config.content.primary_url.clone()));
        if let Err(err) = self.views.create_view(id, primary).await {
            self.windows.destroy_window(id);
            *self.main_window.lock() = None;
            return Err(err);
        }
        self.lifecycle
            .set_strategy(&primary_id, LifecycleStrategy::foreground());
        self.views.switch_to_view(id, &primary_id).await?;
        self.windows.show(id)?;
        tracing::info!(window_id = %id, "main window ready");
        Ok(id)
    }

    /// Create a view and give it a lifecycle strategy. Non-primary content
    /// views are watched for the detach gesture.
    pub async fn create_view(
        &self,
        window: WindowId,
        config: ViewConfig,
        strategy: Option<LifecycleStrategy>,
    ) -> Result<ViewId> {
        let category = config.category;
        let id = self.views.create_view(window, config).await?;
        self.lifecycle
            .set_strategy(&id, strategy.unwrap_or_default());
        if category != ViewCategory::DetachedChrome && !self.views.is_primary(&id) {
            self.detach.watch(&id);
        }
        Ok(id)
    }

    /// Switch the main window to the requested view, creating it first if
    /// needed. A detached view is focused in its own window instead.
    pub async fn show_view(&self, request: ShowViewRequest) -> Result<ViewId> {
        let main = self.require_main()?;
        if request.category == ViewCategory::DetachedChrome {
            return Err(WmError::NotPermitted {
                operation: "show_view",
                subject: Subject::View(request.view_id()),
                reason: "control bars are created by detach",
            });
        }
        if request.category == ViewCategory::Primary {
            let primary = self
                .views
                .primary_view(main)
                .ok_or_else(|| WmError::NotFound(Subject::View(ViewId::from(PRIMARY_VIEW_ID))))?;
            self.switch_to_view(&primary, None).await?;
            return Ok(primary);
        }

        let mut id = request.view_id();
        if request.force_new && self.views.contains(&id) {
            id = ViewId::new(format!("{id}:{}", Utc::now().timestamp_millis()));
        }
        if let Some(window) = self.detach.detached_window_for(&id) {
            self.windows.show(window)?;
            let _ = self.lifecycle.update_access(&id);
            return Ok(id);
        }
        if !self.views.contains(&id) {
            let size = self.windows.bounds(main)?.size();
            let config = ViewConfig {
                id: id.clone(),
                category: request.category,
                bounds: layout::overlay_bounds(&self.config.layout, size),
                source: request.source.clone(),
                transparent: false,
                descriptor: request.descriptor.clone(),
                metadata: request.metadata.clone(),
            };
            let strategy =
                LifecycleStrategy::infer(request.persist_on_dismiss, &self.config.lifecycle);
            self.create_view(main, config, Some(strategy)).await?;
        }
        self.switch_to_view(&id, Some(main)).await?;
        Ok(id)
    }

    /// Composite `id` in `window` (its owner when `None`) and mark it as
    /// accessed, resuming it if it was paused. A detached view is brought
    /// forward in its own window instead.
    pub async fn switch_to_view(&self, id: &ViewId, window: Option<WindowId>) -> Result<()> {
        let detached = self.detach.detached_window_for(id);
        match (detached, window) {
            (Some(d), None) => self.windows.show(d)?,
            (Some(d), Some(w)) if d == w => self.windows.show(d)?,
            (_, Some(w)) => self.views.switch_to_view(w, id).await?,
            (None, None) => {
                let owner = self
                    .views
                    .owner_of(id)
                    .ok_or_else(|| WmError::NotFound(Subject::View(id.clone())))?;
                self.views.switch_to_view(owner, id).await?;
            }
        }
        match self.lifecycle.update_access(id) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Dismiss a view. Its lifecycle strategy decides between hiding it
    /// (paused) and destroying it. The window falls back to its primary.
    pub async fn close_view(&self, id: &ViewId) -> Result<CloseOutcome> {
        let owner = self
            .views
            .owner_of(id)
            .ok_or_else(|| WmError::NotFound(Subject::View(id.clone())))?;
        if self.detach.is_detached(id) {
            self.detach
                .close_detached_window(owner, CloseReason::Dismissed)
                .await;
            return Ok(self.outcome_of(id));
        }
        let was_active = self.views.active_view_id(owner).as_ref() == Some(id);
        let outcome = match self.lifecycle.handle_close(id) {
            Ok(CloseOutcome::KeepAlive) => {
                if !self.views.is_primary(id) {
                    self.views.hide_view(id)?;
                }
                CloseOutcome::KeepAlive
            }
            Ok(CloseOutcome::Destroyed) => CloseOutcome::Destroyed,
            Err(err) if err.is_not_found() => {
                self.views.remove_view(id);
                CloseOutcome::Destroyed
            }
            Err(err) => return Err(err),
        };
        if outcome == CloseOutcome::Destroyed {
            self.detach.unwatch(id);
        }
        if was_active
            && let Some(primary) = self.views.primary_view(owner)
            && &primary != id
        {
            self.views.switch_to_view(owner, &primary).await?;
        }
        Ok(outcome)
    }

    fn outcome_of(&self, id: &ViewId) -> CloseOutcome {
        if self.views.contains(id) {
            CloseOutcome::KeepAlive
        } else {
            CloseOutcome::Destroyed
        }
    }

    /// Destroy a view regardless of its strategy. A detached view takes its
    /// window and control bar with it. Returns `false` when the view was
    /// already gone.
    pub async fn remove_view(&self, id: &ViewId) -> Result<bool> {
        let category = self.views.view_info(id).map(|info| info.category);
        if self.views.is_primary(id) || category == Some(ViewCategory::DetachedChrome) {
            return Err(WmError::NotPermitted {
                operation: "remove_view",
                subject: Subject::View(id.clone()),
                reason: "primary and control-bar views live as long as their window",
            });
        }
        Ok(self.drop_view(id).await)
    }

    async fn drop_view(&self, id: &ViewId) -> bool {
        self.detach.unwatch(id);
        let detached = self.detach.detached_window_for(id);
        let removed = self.lifecycle.destroy(id);
        if let Some(window) = detached {
            self.detach
                .close_detached_window(window, CloseReason::Dismissed)
                .await;
        }
        removed
    }

    pub async fn detach_view(&self, id: &ViewId, opts: DetachOptions) -> Result<WindowId> {
        let source = self
            .views
            .owner_of(id)
            .ok_or_else(|| WmError::NotFound(Subject::View(id.clone())))?;
        let window = self.detach.detach(id, source, opts).await?;
        let _ = self.lifecycle.update_access(id);
        Ok(window)
    }

    /// Reattach into the record's source window, or the main window when
    /// the source is gone.
    pub async fn reattach_view(&self, detached_window: WindowId) -> Result<()> {
        let record = self
            .detach
            .record(detached_window)
            .ok_or(WmError::NotFound(Subject::Detachment(detached_window)))?;
        let target = if self.windows.is_alive(record.source_window_id) {
            record.source_window_id
        } else {
            self.require_main()?
        };
        self.detach.reattach(detached_window, target).await?;
        let _ = self.lifecycle.update_access(&record.source_view_id);
        Ok(())
    }

    pub async fn control_bar_action(&self, window: WindowId, action: ControlBarAction) -> Result<()> {
        match action {
            ControlBarAction::Reattach => self.reattach_view(window).await,
            other => self.detach.control_bar_action(window, other).await,
        }
    }

    /// Coalesce height changes of the main window; only the last request in
    /// a burst is applied.
    pub fn request_resize(self: &Arc<Self>, height: u32) {
        let weak = Arc::downgrade(self);
        self.resize.schedule(async move {
            let Some(engine) = weak.upgrade() else {
                return;
            };
            if let Err(err) = engine.apply_resize(height) {
                tracing::warn!(height, error = %err, "resize dropped");
            }
        });
    }

    /// Returns whether the window actually changed.
    pub fn apply_resize(&self, height: u32) -> Result<bool> {
        let main = self.require_main()?;
        let layout_cfg = &self.config.layout;
        let height = height.clamp(layout_cfg.header_height, self.config.window.max_height);
        let current = self.windows.bounds(main)?;
        if current.height.abs_diff(height) <= layout_cfg.resize_tolerance {
            return Ok(false);
        }
        self.windows.set_bounds(main, BoundsPatch::height(height))?;
        self.views.relayout_window(main)?;
        tracing::debug!(window_id = %main, height, "main window resized");
        Ok(true)
    }

    pub fn show_main_window(&self) -> Result<()> {
        self.windows.show(self.require_main()?)
    }

    pub fn hide_main_window(&self) -> Result<()> {
        self.windows.hide(self.require_main()?)
    }

    /// Force an eviction sweep now.
    pub fn cleanup_background_views(&self) -> SweepReport {
        self.lifecycle.sweep()
    }

    /// React to something the platform did on its own.
    pub async fn handle_signal(&self, signal: BackendSignal) {
        match signal {
            BackendSignal::WindowClosed(window) => {
                if self.detach.record(window).is_some() {
                    self.detach
                        .close_detached_window(window, CloseReason::WindowClosed)
                        .await;
                } else {
                    self.teardown_window(window);
                }
            }
            BackendSignal::WindowResized { window, .. } => {
                let result = if self.detach.record(window).is_some() {
                    self.detach.relayout(window)
                } else {
                    self.views.relayout_window(window)
                };
                if let Err(err) = result {
                    tracing::debug!(window_id = %window, error = %err, "relayout skipped");
                }
            }
            BackendSignal::WindowFocused(window) => self.detach.handle_focus(window, true),
            BackendSignal::WindowBlurred(window) => self.detach.handle_focus(window, false),
            BackendSignal::SurfaceCrashed { surface, reason } => {
                if let Some(id) = self.views.set_health(surface, SurfaceHealth::Crashed) {
                    tracing::error!(view_id = %id, %reason, "view content crashed");
                }
            }
            BackendSignal::SurfaceUnresponsive(surface) => {
                if let Some(id) = self.views.set_health(surface, SurfaceHealth::Unresponsive) {
                    tracing::warn!(view_id = %id, "view unresponsive");
                }
            }
            BackendSignal::SurfaceResponsive(surface) => {
                if let Some(id) = self.views.set_health(surface, SurfaceHealth::Healthy) {
                    tracing::info!(view_id = %id, "view responsive again");
                }
            }
            BackendSignal::SurfaceGone(surface) => {
                let Some(id) = self.views.view_for_surface(surface) else {
                    return;
                };
                tracing::warn!(view_id = %id, "view surface destroyed externally");
                match self.detach.detached_window_for(&id) {
                    Some(window) => {
                        self.detach
                            .close_detached_window(window, CloseReason::WindowClosed)
                            .await;
                    }
                    None => {
                        self.drop_view(&id).await;
                    }
                }
            }
            BackendSignal::Input { surface, key } => {
                let Some(id) = self.views.view_for_surface(surface) else {
                    return;
                };
                match self.detach.handle_input(&id, &key).await {
                    Ok(Some(gesture)) => tracing::debug!(view_id = %id, ?gesture, "gesture handled"),
                    Ok(None) => {}
                    Err(err) => tracing::warn!(view_id = %id, error = %err, "gesture failed"),
                }
            }
        }
    }

    /// Drop every view of a window that is gone or going.
    fn teardown_window(&self, window: WindowId) {
        for id in self.views.cleanup_window_views(window) {
            self.lifecycle.forget(&id);
            self.detach.unwatch(&id);
        }
        self.windows.destroy_window(window);
        let mut main = self.main_window.lock();
        if *main == Some(window) {
            *main = None;
            tracing::info!(window_id = %window, "main window closed");
        }
    }

    // --- queries ---

    pub fn view_info(&self, id: &ViewId) -> Option<ViewInfo> {
        self.views.view_info(id)
    }

    pub fn all_views(&self) -> Vec<ViewInfo> {
        self.views.all_views()
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            main_windows: self.windows.count(WindowKind::Main),
            detached_windows: self.windows.count(WindowKind::Detached),
            views: self.views.all_views().len(),
            lifecycle: self.lifecycle.statistics(),
            detach: self.detach.statistics(),
            memory_threshold_mb: self.lifecycle.config().memory_threshold_mb,
        }
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let windows: BTreeMap<WindowId, WindowMetrics> = self
            .windows
            .windows()
            .into_iter()
            .filter_map(|w| self.views.window_metrics(w.id).map(|m| (w.id, m)))
            .collect();
        PerformanceMetrics {
            switch_time: self.views.last_switch(),
            memory_usage_mb: self.lifecycle.statistics().total_memory_mb,
            active_view_count: windows.values().map(|m| m.active_view_count).sum(),
            windows,
            last_updated: Utc::now(),
        }
    }

    /// Close detached windows, destroy the main window and stop background
    /// tasks.
    pub async fn shutdown(&self) {
        self.resize.cancel();
        self.lifecycle.stop_auto_sweep();
        for window in self.detach.detached_windows() {
            self.detach
                .close_detached_window(window, CloseReason::Shutdown)
                .await;
        }
        if let Some(main) = self.main_window() {
            self.teardown_window(main);
        }
        if let Some(task) = self.pump.lock().take() {
            task.abort();
        }
        tracing::info!("engine shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(task) = self.pump.get_mut().take() {
            task.abort();
        }
    }
}
