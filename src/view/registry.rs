use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use super::{
    CompositeState, LoadOutcome, SurfaceHealth, ViewCategory, ViewConfig, ViewId, ViewInfo, layout,
};
use crate::backend::{Backend, ContentSource, SurfaceId, SurfaceSpec, WindowId};
use crate::config::{ContentConfig, LayoutConfig};
use crate::error::{Result, Stage, Subject, WmError};
use crate::events::{EngineEvent, EventBus, EventMeta};
use crate::geometry::Bounds;
use crate::liveness::Checkpoint;
use crate::window::WindowController;

/// Answers whether a view currently lives in a detached window. Installed
/// once while wiring the engine so the registry does not own the detach
/// manager.
pub trait DetachState: Send + Sync {
    fn is_detached(&self, view: &ViewId) -> bool;
}

/// Proof of which surface a view had, and in which incarnation, when the
/// ticket was taken. Generations change on creation and on every re-homing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewTicket {
    pub surface: SurfaceId,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowMetrics {
    pub view_count: usize,
    pub active_view_count: usize,
    pub composite_state: CompositeState,
    /// Duration of the last `switch_to_view` in this window.
    pub last_switch: Option<Duration>,
}

struct ViewEntry {
    info: ViewInfo,
    surface: SurfaceId,
    generation: u64,
}

#[derive(Debug, Default)]
struct WindowSlot {
    views: BTreeSet<ViewId>,
    primary: Option<ViewId>,
    state: CompositeState,
    active: Option<ViewId>,
    overlay: Option<ViewId>,
    last_switch: Option<Duration>,
}

#[derive(Default)]
struct RegistryState {
    views: BTreeMap<ViewId, ViewEntry>,
    windows: BTreeMap<WindowId, WindowSlot>,
    by_surface: BTreeMap<SurfaceId, ViewId>,
    /// Ids whose creation is in flight.
    pending: BTreeSet<ViewId>,
    next_generation: u64,
}

impl RegistryState {
    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn set_flags(&mut self, id: &ViewId, bounds: Option<Bounds>, visible: bool, active: bool) {
        if let Some(e) = self.views.get_mut(id) {
            if let Some(b) = bounds {
                e.info.bounds = b;
            }
            e.info.visible = visible;
            e.info.active = active;
        }
    }

    fn surface_of(&self, id: &ViewId) -> Option<SurfaceId> {
        self.views.get(id).map(|e| e.surface)
    }
}

struct SwitchPlan {
    target: SurfaceId,
    ticket: ViewTicket,
    is_primary: bool,
    primary: Option<(ViewId, SurfaceId)>,
    previous_overlay: Option<(ViewId, SurfaceId)>,
    previous_active: Option<ViewId>,
}

/// Removes an id from the in-flight set however `create_view` exits.
struct PendingGuard<'a> {
    registry: &'a ViewRegistry,
    id: ViewId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.state.lock().pending.remove(&self.id);
    }
}

/// Owns every content view, tracks which window hosts it, and composites
/// the primary view with at most one overlay per window.
pub struct ViewRegistry {
    backend: Arc<dyn Backend>,
    windows: Arc<WindowController>,
    events: EventBus,
    layout: LayoutConfig,
    content: ContentConfig,
    state: Mutex<RegistryState>,
    detach_state: OnceLock<Weak<dyn DetachState>>,
}

impl ViewRegistry {
    pub fn new(
        backend: Arc<dyn Backend>,
        windows: Arc<WindowController>,
        events: EventBus,
        layout: LayoutConfig,
        content: ContentConfig,
    ) -> Self {
        Self {
            backend,
            windows,
            events,
            layout,
            content,
            state: Mutex::new(RegistryState::default()),
            detach_state: OnceLock::new(),
        }
    }

    /// Returns `false` if a probe was already installed.
    pub fn set_detach_state(&self, probe: Weak<dyn DetachState>) -> bool {
        self.detach_state.set(probe).is_ok()
    }

    fn is_detached(&self, id: &ViewId) -> bool {
        self.detach_state
            .get()
            .and_then(Weak::upgrade)
            .is_some_and(|probe| probe.is_detached(id))
    }

    /// Create a surface for `config`, attach it to `window` at the requested
    /// bounds and start loading its source in the background.
    ///
    /// The first non-chrome view of a window without a primary becomes that
    /// window's primary view, as does any view of category `Primary`.
    pub async fn create_view(&self, window: WindowId, config: ViewConfig) -> Result<ViewId> {
        let id = config.id.clone();
        {
            let mut st = self.state.lock();
            if st.views.contains_key(&id) || !st.pending.insert(id.clone()) {
                return Err(WmError::AlreadyExists(Subject::View(id)));
            }
        }
        let _pending = PendingGuard {
            registry: self,
            id: id.clone(),
        };

        self.windows.ensure_alive(window)?;
        let checkpoint = Checkpoint::new().window(window);

        let surface = self
            .backend
            .create_surface(&SurfaceSpec {
                label: id.to_string(),
                transparent: config.transparent,
            })
            .await
            .map_err(|e| WmError::partial("create_view", Stage::CreateSurface, e, false))?;

        if let Err(err) = checkpoint.revalidate(&self.windows, self) {
            tracing::debug!(view_id = %id, window_id = %window, "window vanished during surface creation");
            self.backend.destroy_surface(surface);
            return Err(err);
        }
        if let Err(err) = self.backend.attach_surface(window, surface).await {
            self.backend.destroy_surface(surface);
            return Err(WmError::partial("create_view", Stage::Reparent, err, true));
        }
        if let Err(err) = checkpoint.revalidate(&self.windows, self) {
            tracing::debug!(view_id = %id, window_id = %window, "window vanished during attach");
            self.backend.destroy_surface(surface);
            return Err(err);
        }
        if let Err(err) = self.backend.set_surface_bounds(surface, config.bounds) {
            tracing::warn!(view_id = %id, error = %err, "initial bounds rejected");
        }

        let now = Utc::now();
        let info = ViewInfo {
            id: id.clone(),
            category: config.category,
            bounds: config.bounds,
            owner_window_id: window,
            visible: !config.bounds.is_hidden(),
            active: false,
            health: SurfaceHealth::Healthy,
            source: config.source.clone(),
            descriptor: config.descriptor.clone(),
            metadata: config.metadata.clone(),
            created_at: now,
            last_access: now,
        };
        {
            let mut st = self.state.lock();
            let generation = st.bump();
            let slot = st.windows.entry(window).or_default();
            slot.views.insert(id.clone());
            let becomes_primary = config.category == ViewCategory::Primary
                || (slot.primary.is_none() && config.category != ViewCategory::DetachedChrome);
            if becomes_primary && slot.primary.is_none() {
                slot.primary = Some(id.clone());
            }
            st.by_surface.insert(surface, id.clone());
            st.views.insert(
                id.clone(),
                ViewEntry {
                    info,
                    surface,
                    generation,
                },
            );
        }
        tracing::debug!(view_id = %id, window_id = %window, category = ?config.category, "view created");
        self.events.emit(EngineEvent::Created {
            meta: EventMeta::new(&id, Some(window)),
            category: config.category,
        });

        if let Some(source) = config.source {
            let backend = self.backend.clone();
            let timeout = self.load_timeout(&source);
            let view_id = id.clone();
            tokio::spawn(async move {
                let outcome = load_with_timeout(backend.as_ref(), surface, &source, timeout).await;
                tracing::debug!(view_id = %view_id, ?outcome, "initial load settled");
            });
        }
        Ok(id)
    }

    /// Load `source` into the view's surface. Always settles within the
    /// timeout; only an unknown view is an error.
    pub async fn load_content(
        &self,
        id: &ViewId,
        source: ContentSource,
        timeout: Option<Duration>,
    ) -> Result<LoadOutcome> {
        let surface = {
            let mut st = self.state.lock();
            let entry = st
                .views
                .get_mut(id)
                .ok_or_else(|| WmError::NotFound(Subject::View(id.clone())))?;
            entry.info.source = Some(source.clone());
            entry.surface
        };
        let timeout = timeout.unwrap_or_else(|| self.load_timeout(&source));
        Ok(load_with_timeout(self.backend.as_ref(), surface, &source, timeout).await)
    }

    fn load_timeout(&self, source: &ContentSource) -> Duration {
        match source {
            ContentSource::Url(_) => self.content.url_load_timeout(),
            ContentSource::File(_) => self.content.file_load_timeout(),
        }
    }

    /// Composite `id` in `window`: the primary alone, or the primary as a
    /// backdrop with `id` on top as the overlay.
    pub async fn switch_to_view(&self, window: WindowId, id: &ViewId) -> Result<()> {
        let started = Instant::now();
        let plan = self.plan_switch(window, id)?;
        let size = self.windows.bounds(window)?.size();

        if plan.is_primary {
            if let Some((ov_id, ov_surface)) = &plan.previous_overlay {
                self.apply_bounds(ov_id, *ov_surface, Bounds::hidden());
            }
            let full = layout::primary_bounds(size);
            self.apply_bounds(id, plan.target, full);
            let mut st = self.state.lock();
            if let Some((ov_id, _)) = &plan.previous_overlay {
                st.set_flags(ov_id, Some(Bounds::hidden()), false, false);
            }
            st.set_flags(id, Some(full), true, true);
            if let Some(slot) = st.windows.get_mut(&window) {
                slot.state = CompositeState::PrimaryOnly;
                slot.overlay = None;
                slot.active = Some(id.clone());
            }
        } else {
            let backdrop = layout::primary_backdrop_bounds(size);
            if let Some((p_id, p_surface)) = &plan.primary {
                self.apply_bounds(p_id, *p_surface, backdrop);
            }
            if let Some((ov_id, ov_surface)) = &plan.previous_overlay
                && ov_id != id
            {
                self.apply_bounds(ov_id, *ov_surface, Bounds::hidden());
            }
            let overlay = layout::overlay_bounds(&self.layout, size);
            self.apply_bounds(id, plan.target, overlay);

            let checkpoint = Checkpoint::new()
                .window(window)
                .view(id.clone(), plan.ticket);
            self.backend
                .attach_surface(window, plan.target)
                .await
                .map_err(|e| WmError::partial("switch_to_view", Stage::Reparent, e, false))?;
            checkpoint.revalidate(&self.windows, self)?;

            let mut st = self.state.lock();
            if let Some((ov_id, _)) = &plan.previous_overlay
                && ov_id != id
            {
                st.set_flags(ov_id, Some(Bounds::hidden()), false, false);
            }
            if let Some((p_id, _)) = &plan.primary {
                st.set_flags(p_id, Some(backdrop), true, false);
            }
            st.set_flags(id, Some(overlay), true, true);
            if let Some(slot) = st.windows.get_mut(&window) {
                slot.state = CompositeState::PrimaryWithOverlay;
                slot.overlay = Some(id.clone());
                slot.active = Some(id.clone());
            }
        }

        let elapsed = started.elapsed();
        {
            let mut st = self.state.lock();
            if let Some(e) = st.views.get_mut(id) {
                e.info.last_access = Utc::now();
            }
            if let Some(slot) = st.windows.get_mut(&window) {
                slot.last_switch = Some(elapsed);
            }
        }
        tracing::debug!(view_id = %id, window_id = %window, primary = plan.is_primary, "switched view");
        if plan.previous_active.as_ref() != Some(id) {
            self.events.emit(EngineEvent::Switched {
                meta: EventMeta::new(id, Some(window)),
                previous: plan.previous_active,
            });
        }
        Ok(())
    }

    fn plan_switch(&self, window: WindowId, id: &ViewId) -> Result<SwitchPlan> {
        let st = self.state.lock();
        let entry = st
            .views
            .get(id)
            .ok_or_else(|| WmError::NotFound(Subject::View(id.clone())))?;
        if entry.info.owner_window_id != window {
            return Err(WmError::NotFound(Subject::ViewInWindow(id.clone(), window)));
        }
        let slot = st
            .windows
            .get(&window)
            .ok_or(WmError::NotFound(Subject::Window(window)))?;
        let with_surface =
            |v: &Option<ViewId>| v.clone().and_then(|v| st.surface_of(&v).map(|s| (v, s)));
        Ok(SwitchPlan {
            target: entry.surface,
            ticket: ViewTicket {
                surface: entry.surface,
                generation: entry.generation,
            },
            is_primary: slot.primary.as_ref() == Some(id),
            primary: with_surface(&slot.primary),
            previous_overlay: with_surface(&slot.overlay),
            previous_active: slot.active.clone(),
        })
    }

    fn apply_bounds(&self, id: &ViewId, surface: SurfaceId, bounds: Bounds) {
        if let Err(err) = self.backend.set_surface_bounds(surface, bounds) {
            tracing::warn!(view_id = %id, error = %err, "failed to set view bounds");
        }
    }

    /// Move a view off-canvas and drop it from its window's overlay slot.
    pub fn hide_view(&self, id: &ViewId) -> Result<()> {
        let surface = {
            let mut st = self.state.lock();
            let entry = st
                .views
                .get(id)
                .ok_or_else(|| WmError::NotFound(Subject::View(id.clone())))?;
            let (surface, owner) = (entry.surface, entry.info.owner_window_id);
            st.set_flags(id, Some(Bounds::hidden()), false, false);
            if let Some(slot) = st.windows.get_mut(&owner) {
                if slot.overlay.as_ref() == Some(id) {
                    slot.overlay = None;
                    slot.state = CompositeState::PrimaryOnly;
                }
                if slot.active.as_ref() == Some(id) {
                    slot.active = None;
                }
            }
            surface
        };
        self.apply_bounds(id, surface, Bounds::hidden());
        Ok(())
    }

    pub fn set_view_bounds(&self, id: &ViewId, bounds: Bounds) -> Result<()> {
        let surface = {
            let mut st = self.state.lock();
            let entry = st
                .views
                .get_mut(id)
                .ok_or_else(|| WmError::NotFound(Subject::View(id.clone())))?;
            entry.info.bounds = bounds;
            entry.info.visible = !bounds.is_hidden();
            entry.surface
        };
        Ok(self.backend.set_surface_bounds(surface, bounds)?)
    }

    /// Show `id` at `bounds` as the only active content of its window.
    pub fn present(&self, id: &ViewId, bounds: Bounds) -> Result<()> {
        self.set_view_bounds(id, bounds)?;
        let mut st = self.state.lock();
        let owner = st
            .views
            .get(id)
            .map(|e| e.info.owner_window_id)
            .ok_or_else(|| WmError::NotFound(Subject::View(id.clone())))?;
        let previous = st.windows.get(&owner).and_then(|s| s.active.clone());
        if let Some(prev) = previous.filter(|p| p != id) {
            if let Some(e) = st.views.get_mut(&prev) {
                e.info.active = false;
            }
        }
        st.set_flags(id, None, true, true);
        if let Some(slot) = st.windows.get_mut(&owner) {
            slot.active = Some(id.clone());
        }
        Ok(())
    }

    /// Detach the surface, destroy it and drop all bookkeeping. Returns
    /// `false` when the view was already gone.
    pub fn remove_view(&self, id: &ViewId) -> bool {
        let removed = {
            let mut st = self.state.lock();
            let Some(entry) = st.views.remove(id) else {
                return false;
            };
            st.by_surface.remove(&entry.surface);
            let owner = entry.info.owner_window_id;
            if let Some(slot) = st.windows.get_mut(&owner) {
                slot.views.remove(id);
                if slot.primary.as_ref() == Some(id) {
                    slot.primary = None;
                }
                if slot.overlay.as_ref() == Some(id) {
                    slot.overlay = None;
                    slot.state = CompositeState::PrimaryOnly;
                    slot.active = slot.primary.clone();
                }
                if slot.active.as_ref() == Some(id) {
                    slot.active = None;
                }
                let active = slot.active.clone();
                if let Some(a) = active
                    && let Some(e) = st.views.get_mut(&a)
                {
                    e.info.active = true;
                }
            }
            (entry.surface, owner)
        };
        let (surface, owner) = removed;
        if self.backend.window_alive(owner) {
            if let Err(err) = self.backend.detach_surface(owner, surface) {
                tracing::debug!(view_id = %id, window_id = %owner, error = %err, "surface was not attached");
            }
        }
        self.backend.destroy_surface(surface);
        tracing::debug!(view_id = %id, window_id = %owner, "view removed");
        self.events.emit(EngineEvent::Removed {
            meta: EventMeta::new(id, Some(owner)),
        });
        true
    }

    /// Record that `id` now lives in `new_window`. The caller has already
    /// moved the surface. Returns the previous owner.
    pub fn update_view_parent_window(&self, id: &ViewId, new_window: WindowId) -> Result<WindowId> {
        let mut st = self.state.lock();
        let old = st
            .views
            .get(id)
            .map(|e| e.info.owner_window_id)
            .ok_or_else(|| WmError::NotFound(Subject::View(id.clone())))?;
        if old == new_window {
            return Ok(old);
        }
        if let Some(slot) = st.windows.get_mut(&old) {
            slot.views.remove(id);
            if slot.overlay.as_ref() == Some(id) {
                slot.overlay = None;
                slot.state = CompositeState::PrimaryOnly;
            }
            if slot.active.as_ref() == Some(id) {
                slot.active = None;
            }
        }
        st.windows
            .entry(new_window)
            .or_default()
            .views
            .insert(id.clone());
        let generation = st.bump();
        if let Some(e) = st.views.get_mut(id) {
            e.info.owner_window_id = new_window;
            e.info.active = false;
            e.generation = generation;
        }
        tracing::debug!(view_id = %id, from = %old, to = %new_window, "view re-homed");
        Ok(old)
    }

    /// Recompute bounds after `window` changed size. Hidden views stay
    /// hidden and views in detached windows are left to the detach manager.
    pub fn relayout_window(&self, window: WindowId) -> Result<()> {
        let size = self.windows.bounds(window)?.size();
        let targets: Vec<(ViewId, SurfaceId, Bounds)> = {
            let st = self.state.lock();
            let Some(slot) = st.windows.get(&window) else {
                return Ok(());
            };
            let mut out = Vec::new();
            if let Some(p) = &slot.primary
                && let Some(s) = st.surface_of(p)
            {
                let b = match slot.state {
                    CompositeState::PrimaryOnly => layout::primary_bounds(size),
                    CompositeState::PrimaryWithOverlay => layout::primary_backdrop_bounds(size),
                };
                out.push((p.clone(), s, b));
            }
            if let Some(ov) = &slot.overlay
                && let Some(s) = st.surface_of(ov)
            {
                out.push((ov.clone(), s, layout::overlay_bounds(&self.layout, size)));
            }
            out
        };
        for (id, surface, bounds) in targets {
            if self.is_detached(&id) {
                continue;
            }
            self.apply_bounds(&id, surface, bounds);
            if let Some(e) = self.state.lock().views.get_mut(&id) {
                e.info.bounds = bounds;
            }
        }
        tracing::debug!(window_id = %window, ?size, "relayout");
        Ok(())
    }

    /// Remove every view hosted by `window` and forget the window.
    pub fn cleanup_window_views(&self, window: WindowId) -> Vec<ViewId> {
        let ids: Vec<ViewId> = self
            .state
            .lock()
            .windows
            .get(&window)
            .map(|s| s.views.iter().cloned().collect())
            .unwrap_or_default();
        let removed: Vec<ViewId> = ids.into_iter().filter(|id| self.remove_view(id)).collect();
        self.state.lock().windows.remove(&window);
        removed
    }

    pub fn set_health(&self, surface: SurfaceId, health: SurfaceHealth) -> Option<ViewId> {
        let mut st = self.state.lock();
        let id = st.by_surface.get(&surface).cloned()?;
        if let Some(e) = st.views.get_mut(&id) {
            e.info.health = health;
        }
        Some(id)
    }

    pub fn touch(&self, id: &ViewId) {
        if let Some(e) = self.state.lock().views.get_mut(id) {
            e.info.last_access = Utc::now();
        }
    }

    pub fn ticket(&self, id: &ViewId) -> Result<ViewTicket> {
        self.state
            .lock()
            .views
            .get(id)
            .map(|e| ViewTicket {
                surface: e.surface,
                generation: e.generation,
            })
            .ok_or_else(|| WmError::NotFound(Subject::View(id.clone())))
    }

    pub fn check_ticket(&self, id: &ViewId, ticket: ViewTicket) -> Result<()> {
        let current = self.ticket(id)?;
        if current != ticket || !self.backend.surface_alive(ticket.surface) {
            return Err(WmError::InvalidReference(Subject::View(id.clone())));
        }
        Ok(())
    }

    // --- queries ---

    pub fn view_info(&self, id: &ViewId) -> Option<ViewInfo> {
        self.state.lock().views.get(id).map(|e| e.info.clone())
    }

    pub fn all_views(&self) -> Vec<ViewInfo> {
        self.state
            .lock()
            .views
            .values()
            .map(|e| e.info.clone())
            .collect()
    }

    pub fn contains(&self, id: &ViewId) -> bool {
        self.state.lock().views.contains_key(id)
    }

    pub fn window_views(&self, window: WindowId) -> Vec<ViewId> {
        self.state
            .lock()
            .windows
            .get(&window)
            .map(|s| s.views.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn active_view_id(&self, window: WindowId) -> Option<ViewId> {
        self.state
            .lock()
            .windows
            .get(&window)
            .and_then(|s| s.active.clone())
    }

    pub fn composite_state(&self, window: WindowId) -> Option<CompositeState> {
        self.state.lock().windows.get(&window).map(|s| s.state)
    }

    pub fn primary_view(&self, window: WindowId) -> Option<ViewId> {
        self.state
            .lock()
            .windows
            .get(&window)
            .and_then(|s| s.primary.clone())
    }

    pub fn is_primary(&self, id: &ViewId) -> bool {
        let st = self.state.lock();
        st.views.get(id).is_some_and(|e| {
            st.windows
                .get(&e.info.owner_window_id)
                .is_some_and(|s| s.primary.as_ref() == Some(id))
        })
    }

    pub fn owner_of(&self, id: &ViewId) -> Option<WindowId> {
        self.state
            .lock()
            .views
            .get(id)
            .map(|e| e.info.owner_window_id)
    }

    pub fn surface_of(&self, id: &ViewId) -> Option<SurfaceId> {
        self.state.lock().surface_of(id)
    }

    pub fn view_for_surface(&self, surface: SurfaceId) -> Option<ViewId> {
        self.state.lock().by_surface.get(&surface).cloned()
    }

    pub fn window_metrics(&self, window: WindowId) -> Option<WindowMetrics> {
        let st = self.state.lock();
        let slot = st.windows.get(&window)?;
        let active_view_count = slot
            .views
            .iter()
            .filter(|v| st.views.get(*v).is_some_and(|e| e.info.visible))
            .count();
        Some(WindowMetrics {
            view_count: slot.views.len(),
            active_view_count,
            composite_state: slot.state,
            last_switch: slot.last_switch,
        })
    }

    /// Slowest of the per-window last switch durations.
    pub fn last_switch(&self) -> Option<Duration> {
        self.state
            .lock()
            .windows
            .values()
            .filter_map(|s| s.last_switch)
            .max()
    }
}

/// Load with a hard deadline. Failures and timeouts are logged and reported
/// in the outcome, never returned as errors.
pub async fn load_with_timeout(
    backend: &dyn Backend,
    surface: SurfaceId,
    source: &ContentSource,
    timeout: Duration,
) -> LoadOutcome {
    match tokio::time::timeout(timeout, backend.load(surface, source)).await {
        Ok(Ok(())) => LoadOutcome::Loaded,
        Ok(Err(err)) => {
            tracing::warn!(%surface, %source, error = %err, "load failed");
            LoadOutcome::Failed(err.to_string())
        }
        Err(_) => {
            tracing::warn!(%surface, %source, timeout_ms = timeout.as_millis() as u64, "load timed out");
            LoadOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, SuspensionPoint};
    use crate::events::drain;
    use crate::geometry::{Point, Size};
    use crate::window::WindowOptions;

    struct Fixture {
        backend: Arc<HeadlessBackend>,
        windows: Arc<WindowController>,
        registry: ViewRegistry,
        events: EventBus,
        main: WindowId,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(HeadlessBackend::new());
        let windows = Arc::new(WindowController::new(backend.clone()));
        let events = EventBus::new();
        let registry = ViewRegistry::new(
            backend.clone(),
            windows.clone(),
            events.clone(),
            LayoutConfig::default(),
            ContentConfig::default(),
        );
        let main = windows
            .create_window(WindowOptions {
                position: Some(Point::new(0, 0)),
                ..WindowOptions::main("main", Size::new(800, 600))
            })
            .unwrap();
        Fixture {
            backend,
            windows,
            registry,
            events,
            main,
        }
    }

    fn cfg(id: &str, category: ViewCategory) -> ViewConfig {
        ViewConfig::new(id, category, Bounds::new(0, 0, 800, 600))
    }

    #[tokio::test]
    async fn first_view_becomes_primary_and_fills_window() {
        let f = fixture();
        let mut rx = f.events.subscribe();
        f.registry
            .create_view(f.main, cfg("A", ViewCategory::Plugin))
            .await
            .unwrap();
        f.registry
            .switch_to_view(f.main, &ViewId::from("A"))
            .await
            .unwrap();

        assert_eq!(f.registry.active_view_id(f.main), Some(ViewId::from("A")));
        let info = f.registry.view_info(&ViewId::from("A")).unwrap();
        assert_eq!(info.bounds, Bounds::new(0, 0, 800, 600));
        assert_eq!(
            f.registry.composite_state(f.main),
            Some(CompositeState::PrimaryOnly)
        );
        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["created", "switched"]);
    }

    #[tokio::test]
    async fn duplicate_create_is_already_exists() {
        let f = fixture();
        f.registry
            .create_view(f.main, cfg("A", ViewCategory::Plugin))
            .await
            .unwrap();
        let err = f
            .registry
            .create_view(f.main, cfg("A", ViewCategory::Plugin))
            .await
            .unwrap_err();
        assert!(matches!(err, WmError::AlreadyExists(_)));
        assert_eq!(f.registry.all_views().len(), 1);
    }

    #[tokio::test]
    async fn overlay_switching_keeps_one_active_overlay() {
        let f = fixture();
        let primary = ViewId::from("main-view");
        f.registry
            .create_view(f.main, cfg("main-view", ViewCategory::Primary))
            .await
            .unwrap();
        for id in ["plugin:a", "plugin:b"] {
            f.registry
                .create_view(f.main, cfg(id, ViewCategory::Plugin))
                .await
                .unwrap();
        }
        let a = ViewId::from("plugin:a");
        let b = ViewId::from("plugin:b");

        f.registry.switch_to_view(f.main, &a).await.unwrap();
        f.registry.switch_to_view(f.main, &b).await.unwrap();

        let info_a = f.registry.view_info(&a).unwrap();
        let info_b = f.registry.view_info(&b).unwrap();
        assert!(!info_a.active && !info_a.visible);
        assert!(info_a.bounds.is_hidden());
        assert!(info_b.active);
        assert_eq!(info_b.bounds, Bounds::new(16, 66, 768, 518));
        assert_eq!(
            f.registry.composite_state(f.main),
            Some(CompositeState::PrimaryWithOverlay)
        );
        // overlay re-added above the primary
        let b_surface = f.registry.surface_of(&b).unwrap();
        assert_eq!(f.backend.children(f.main).last(), Some(&b_surface));

        let active_overlays = f
            .registry
            .all_views()
            .into_iter()
            .filter(|v| v.active && v.id != primary)
            .count();
        assert_eq!(active_overlays, 1);

        f.registry.switch_to_view(f.main, &primary).await.unwrap();
        assert!(f.registry.view_info(&b).unwrap().bounds.is_hidden());
        assert_eq!(f.registry.active_view_id(f.main), Some(primary));
    }

    #[tokio::test]
    async fn switch_rejects_unknown_and_foreign_views() {
        let f = fixture();
        let other = f
            .windows
            .create_window(WindowOptions::main("other", Size::new(400, 300)))
            .unwrap();
        f.registry
            .create_view(other, cfg("B", ViewCategory::Plugin))
            .await
            .unwrap();

        let err = f
            .registry
            .switch_to_view(f.main, &ViewId::from("nope"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let err = f
            .registry
            .switch_to_view(f.main, &ViewId::from("B"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WmError::NotFound(Subject::ViewInWindow(_, w)) if w == f.main
        ));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let f = fixture();
        let id = f
            .registry
            .create_view(f.main, cfg("A", ViewCategory::Plugin))
            .await
            .unwrap();
        let surface = f.registry.surface_of(&id).unwrap();
        assert!(f.registry.remove_view(&id));
        assert!(!f.registry.remove_view(&id));
        assert!(!f.backend.surface_alive(surface));
        assert!(f.registry.window_views(f.main).is_empty());
    }

    #[tokio::test]
    async fn window_closed_during_surface_creation_rolls_back() {
        let f = fixture();
        let main = f.main;
        f.backend.on_next(
            SuspensionPoint::CreateSurface,
            Box::new(move |b| b.close_window(main)),
        );
        let err = f
            .registry
            .create_view(f.main, cfg("A", ViewCategory::Plugin))
            .await
            .unwrap_err();
        assert!(err.is_invalid_reference());
        assert!(f.registry.view_info(&ViewId::from("A")).is_none());
        assert_eq!(f.backend.surface_count(), 0);

        // the id is free again
        let other = f
            .windows
            .create_window(WindowOptions::main("other", Size::new(400, 300)))
            .unwrap();
        assert!(
            f.registry
                .create_view(other, cfg("A", ViewCategory::Plugin))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn rehoming_keeps_a_single_owner_and_invalidates_tickets() {
        let f = fixture();
        let other = f
            .windows
            .create_window(WindowOptions::main("other", Size::new(400, 300)))
            .unwrap();
        let id = f
            .registry
            .create_view(f.main, cfg("A", ViewCategory::Plugin))
            .await
            .unwrap();
        let ticket = f.registry.ticket(&id).unwrap();

        assert_eq!(
            f.registry.update_view_parent_window(&id, other).unwrap(),
            f.main
        );
        assert!(!f.registry.window_views(f.main).contains(&id));
        assert!(f.registry.window_views(other).contains(&id));
        assert_eq!(f.registry.owner_of(&id), Some(other));
        assert!(
            f.registry
                .check_ticket(&id, ticket)
                .unwrap_err()
                .is_invalid_reference()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_load_resolves_at_timeout() {
        let f = fixture();
        f.backend.hang_loads("https://slow.example");
        let id = f
            .registry
            .create_view(f.main, cfg("A", ViewCategory::Plugin))
            .await
            .unwrap();

        let started = Instant::now();
        let outcome = f
            .registry
            .load_content(
                &id,
                ContentSource::Url("https://slow.example/app".into()),
                Some(Duration::from_secs(2)),
            )
            .await
            .unwrap();
        assert_eq!(outcome, LoadOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_millis(2_100));
    }

    #[tokio::test]
    async fn failed_load_is_reported_not_raised() {
        let f = fixture();
        f.backend.fail_loads("file:");
        let id = f
            .registry
            .create_view(f.main, cfg("A", ViewCategory::Plugin))
            .await
            .unwrap();
        let outcome = f
            .registry
            .load_content(&id, ContentSource::Url("file:/missing".into()), None)
            .await
            .unwrap();
        assert!(matches!(outcome, LoadOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn relayout_follows_window_size() {
        let f = fixture();
        f.registry
            .create_view(f.main, cfg("main-view", ViewCategory::Primary))
            .await
            .unwrap();
        let a = f
            .registry
            .create_view(f.main, cfg("plugin:a", ViewCategory::Plugin))
            .await
            .unwrap();
        f.registry.switch_to_view(f.main, &a).await.unwrap();

        f.windows
            .set_bounds(f.main, crate::geometry::BoundsPatch::height(400))
            .unwrap();
        f.registry.relayout_window(f.main).unwrap();
        assert_eq!(
            f.registry.view_info(&a).unwrap().bounds,
            Bounds::new(16, 66, 768, 318)
        );
        assert_eq!(
            f.registry
                .view_info(&ViewId::from("main-view"))
                .unwrap()
                .bounds,
            Bounds::new(0, 0, 800, 400)
        );
    }

    #[tokio::test]
    async fn cleanup_removes_everything_in_window() {
        let f = fixture();
        for id in ["main-view", "plugin:a", "plugin:b"] {
            let category = if id == "main-view" {
                ViewCategory::Primary
            } else {
                ViewCategory::Plugin
            };
            f.registry.create_view(f.main, cfg(id, category)).await.unwrap();
        }
        let removed = f.registry.cleanup_window_views(f.main);
        assert_eq!(removed.len(), 3);
        assert!(f.registry.all_views().is_empty());
        assert!(f.registry.window_metrics(f.main).is_none());
    }
}
