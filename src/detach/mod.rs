//! Moving views into standalone windows and back.
//!
//! A detach is a sequence of steps, each of which may suspend. Every step
//! after a suspension revalidates the handles it uses; a failed step rolls
//! back what earlier steps built and no later step runs.

mod control_bar;

pub use control_bar::{ControlBarAction, InitFailure, InitOutcome, detached_title, init_payload};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossterm::event::KeyEvent;
use parking_lot::Mutex;
use serde::Serialize;

use crate::backend::{Backend, ContentSource, SurfaceId, WindowId, WindowState};
use crate::config::DetachConfig;
use crate::constants::{CONTROL_BAR_ID_PREFIX, CONTROL_BAR_INIT_CHANNEL};
use crate::error::{Result, Stage, Subject, WmError};
use crate::events::{CloseReason, EngineEvent, EventBus, EventMeta};
use crate::geometry::{Bounds, Display, Size};
use crate::gestures::{Gesture, GestureBindings};
use crate::lifecycle::{CloseOutcome, LifecycleManager};
use crate::liveness::Checkpoint;
use crate::view::{
    DetachState, LoadOutcome, ViewCategory, ViewConfig, ViewId, ViewInfo, ViewRegistry,
    ViewTicket, layout, load_with_timeout,
};
use crate::window::{WindowController, WindowOptions};

/// Caller overrides for a detach.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct DetachOptions {
    pub title: Option<String>,
    /// Lower bound on the window size, in place of the configured default.
    pub size: Option<Size>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetachmentRecord {
    pub detached_window_id: WindowId,
    pub source_view_id: ViewId,
    pub source_window_id: WindowId,
    pub control_bar_view_id: Option<ViewId>,
    /// The view as it was before leaving its source window.
    pub original: ViewInfo,
    pub title: String,
    pub detached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetachStats {
    pub detached_windows: usize,
    pub detached_views: Vec<ViewId>,
}

/// Which gestures a view's input stream is watched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureScope {
    Detachable,
    Detached(WindowId),
}

#[derive(Debug, Default)]
struct Ledger {
    records: BTreeMap<WindowId, DetachmentRecord>,
    by_view: BTreeMap<ViewId, WindowId>,
    in_flight: BTreeSet<ViewId>,
    closing: BTreeSet<WindowId>,
    watched: BTreeMap<ViewId, GestureScope>,
}

struct FlightGuard<'a> {
    ledger: &'a Mutex<Ledger>,
    view: ViewId,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.ledger.lock().in_flight.remove(&self.view);
    }
}

struct ClosingGuard<'a> {
    ledger: &'a Mutex<Ledger>,
    window: WindowId,
}

impl Drop for ClosingGuard<'_> {
    fn drop(&mut self) {
        self.ledger.lock().closing.remove(&self.window);
    }
}

pub struct DetachManager {
    backend: Arc<dyn Backend>,
    windows: Arc<WindowController>,
    views: Arc<ViewRegistry>,
    lifecycle: Arc<LifecycleManager>,
    events: EventBus,
    config: DetachConfig,
    gestures: GestureBindings,
    ledger: Mutex<Ledger>,
}

impl DetachState for DetachManager {
    fn is_detached(&self, view: &ViewId) -> bool {
        self.ledger.lock().by_view.contains_key(view)
    }
}

impl DetachManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        windows: Arc<WindowController>,
        views: Arc<ViewRegistry>,
        lifecycle: Arc<LifecycleManager>,
        events: EventBus,
        config: DetachConfig,
        gestures: GestureBindings,
    ) -> Self {
        Self {
            backend,
            windows,
            views,
            lifecycle,
            events,
            config,
            gestures,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Move `id` out of `source` into a new chromeless window with a
    /// control bar. Detaching an already detached view refocuses its window.
    pub async fn detach(
        &self,
        id: &ViewId,
        source: WindowId,
        opts: DetachOptions,
    ) -> Result<WindowId> {
        if let Some(existing) = self.detached_window_for(id) {
            if self.windows.is_alive(existing) {
                self.windows.focus(existing)?;
                tracing::debug!(view_id = %id, window_id = %existing, "already detached, refocused");
                return Ok(existing);
            }
            self.close_detached_window(existing, CloseReason::WindowClosed)
                .await;
        }

        let _flight = self.begin_flight(id)?;
        let info = self
            .views
            .view_info(id)
            .ok_or_else(|| WmError::NotFound(Subject::View(id.clone())))?;
        if info.owner_window_id != source {
            return Err(WmError::NotFound(Subject::ViewInWindow(id.clone(), source)));
        }
        if self.views.is_primary(id) || info.category == ViewCategory::DetachedChrome {
            return Err(WmError::NotPermitted {
                operation: "detach",
                subject: Subject::View(id.clone()),
                reason: "primary and control-bar views stay in their window",
            });
        }
        self.windows.ensure_alive(source)?;
        let ticket = self.views.ticket(id)?;

        let bounds = self.target_bounds(&info, opts.size);
        let title = detached_title(&info, opts.title.as_deref());
        let window = self
            .windows
            .create_window(WindowOptions::detached(title.clone(), bounds))
            .map_err(|e| WmError::partial("detach", Stage::CreateWindow, e, false))?;

        let bar_id = ViewId::new(format!("{CONTROL_BAR_ID_PREFIX}:{}", window.0));
        let bar_config = ViewConfig {
            transparent: true,
            ..ViewConfig::new(
                bar_id.clone(),
                ViewCategory::DetachedChrome,
                Bounds::new(0, 0, bounds.width, self.config.control_bar_height),
            )
        };
        if let Err(err) = self.views.create_view(window, bar_config).await {
            self.windows.destroy_window(window);
            return Err(WmError::partial("detach", Stage::CreateControlBar, err, true));
        }

        let checkpoint = Checkpoint::new()
            .window(source)
            .window(window)
            .view(id.clone(), ticket);
        if let Err(err) = checkpoint.revalidate(&self.windows, &self.views) {
            tracing::debug!(view_id = %id, error = %err, "detach target went stale before reparent");
            self.discard_window(window, &bar_id);
            return Err(err);
        }

        if let Err(err) = self.reparent(id, ticket, source, window).await {
            self.discard_window(window, &bar_id);
            return Err(err);
        }

        // The surface has moved; ownership and the record follow before the
        // next suspension so no one composites the view in `source` again.
        let was_active = self.views.active_view_id(source).as_ref() == Some(id);
        let ticket = match self
            .views
            .update_view_parent_window(id, window)
            .and_then(|_| self.views.ticket(id))
        {
            Ok(t) => t,
            Err(err) => {
                self.restore_after_failure(id, ticket, window, source).await;
                self.discard_window(window, &bar_id);
                return Err(err);
            }
        };
        {
            let mut ledger = self.ledger.lock();
            ledger.records.insert(
                window,
                DetachmentRecord {
                    detached_window_id: window,
                    source_view_id: id.clone(),
                    source_window_id: source,
                    control_bar_view_id: Some(bar_id.clone()),
                    original: info.clone(),
                    title: title.clone(),
                    detached_at: Utc::now(),
                },
            );
            ledger.by_view.insert(id.clone(), window);
            ledger
                .watched
                .insert(id.clone(), GestureScope::Detached(window));
            ledger
                .watched
                .insert(bar_id.clone(), GestureScope::Detached(window));
        }

        if was_active && let Some(primary) = self.views.primary_view(source) {
            if let Err(err) = self.views.switch_to_view(source, &primary).await {
                tracing::warn!(window_id = %source, error = %err, "could not revert source window to its primary view");
            }
        }
        let detached_layout = self.layout_window(window, &bar_id, ticket.surface);
        let init = self.init_control_bar(window, &bar_id, &info, &title).await;
        tracing::debug!(view_id = %id, window_id = %window, ?init, "control bar initialized");

        let after_init = Checkpoint::new().window(window).view(id.clone(), ticket);
        if let Err(err) = after_init.revalidate(&self.windows, &self.views) {
            tracing::warn!(view_id = %id, window_id = %window, error = %err, "detached window lost during init");
            if self.take_record(window, id) {
                self.restore_after_failure(id, ticket, window, source).await;
            }
            self.discard_window(window, &bar_id);
            return Err(err);
        }

        if let Err(err) = self.views.present(id, detached_layout.content) {
            tracing::warn!(view_id = %id, error = %err, "failed to present detached view");
        }
        if let Err(err) = self.windows.show(window) {
            tracing::warn!(window_id = %window, error = %err, "could not focus detached window");
        }

        tracing::info!(view_id = %id, from = %source, window_id = %window, "view detached");
        self.events.emit(EngineEvent::Detached {
            meta: EventMeta::new(id, Some(window)),
            source_window: source,
        });
        Ok(window)
    }

    fn begin_flight(&self, id: &ViewId) -> Result<FlightGuard<'_>> {
        if !self.ledger.lock().in_flight.insert(id.clone()) {
            return Err(WmError::AlreadyExists(Subject::View(id.clone())));
        }
        Ok(FlightGuard {
            ledger: &self.ledger,
            view: id.clone(),
        })
    }

    /// Centered on the display under the pointer, at least the default and
    /// minimum sizes, clamped to that display's work area.
    fn target_bounds(&self, info: &ViewInfo, requested: Option<Size>) -> Bounds {
        let natural = if info.bounds.is_hidden() {
            Size::default()
        } else {
            info.bounds.size()
        };
        let size = natural
            .max(requested.unwrap_or_else(|| self.config.default_size()))
            .max(self.config.min_size());
        let displays = self.backend.displays();
        let cursor = self.backend.cursor_position();
        match Display::nearest(&displays, cursor) {
            Some(d) => d.work_area.clamp_rect(d.work_area.center_rect(size)),
            None => Bounds::new(0, 0, size.width, size.height),
        }
    }

    /// Move the surface from `from` to the top of `to`. On failure the
    /// surface is put back where it was when possible.
    async fn reparent(
        &self,
        id: &ViewId,
        ticket: ViewTicket,
        from: WindowId,
        to: WindowId,
    ) -> Result<()> {
        let surface = ticket.surface;
        if let Err(err) = self.backend.detach_surface(from, surface) {
            return Err(WmError::partial("detach", Stage::Reparent, err, true));
        }
        if let Err(err) = self.backend.attach_surface(to, surface).await {
            let restored = self.put_back(surface, from).await;
            tracing::error!(view_id = %id, error = %err, restored, "reparent failed");
            return Err(WmError::partial("detach", Stage::Reparent, err, restored));
        }
        let checkpoint = Checkpoint::new().window(to).view(id.clone(), ticket);
        if let Err(err) = checkpoint.revalidate(&self.windows, &self.views) {
            self.restore_after_failure(id, ticket, to, from).await;
            return Err(err);
        }
        Ok(())
    }

    async fn put_back(&self, surface: SurfaceId, window: WindowId) -> bool {
        self.backend.window_alive(window)
            && self.backend.surface_alive(surface)
            && self.backend.attach_surface(window, surface).await.is_ok()
    }

    /// Best effort after a failure past the reparent step: return the view
    /// to `source`, or drop it if it has nowhere to go.
    async fn restore_after_failure(
        &self,
        id: &ViewId,
        ticket: ViewTicket,
        detached: WindowId,
        source: WindowId,
    ) {
        if !self.backend.surface_alive(ticket.surface) {
            return;
        }
        if self.backend.window_alive(detached) {
            self.release(detached, ticket.surface);
        }
        if !self.put_back(ticket.surface, source).await {
            tracing::warn!(view_id = %id, "source window gone, dropping view");
            self.lifecycle.forget(id);
            self.views.remove_view(id);
            return;
        }
        if self.views.owner_of(id) == Some(detached)
            && let Err(err) = self
                .views
                .update_view_parent_window(id, source)
                .and_then(|_| self.views.hide_view(id))
        {
            tracing::warn!(view_id = %id, error = %err, "could not re-home view after failed detach");
        }
    }

    /// Drop the record of an unfinished detach. `false` when a close already
    /// claimed the window and owns the view's fate.
    fn take_record(&self, window: WindowId, id: &ViewId) -> bool {
        let mut ledger = self.ledger.lock();
        if ledger.closing.contains(&window) || ledger.records.remove(&window).is_none() {
            return false;
        }
        if ledger.by_view.get(id) == Some(&window) {
            ledger.by_view.remove(id);
        }
        ledger.watched.retain(|_, scope| *scope != GestureScope::Detached(window));
        ledger.watched.insert(id.clone(), GestureScope::Detachable);
        true
    }

    fn release(&self, window: WindowId, surface: SurfaceId) {
        if let Err(err) = self.backend.detach_surface(window, surface) {
            tracing::debug!(window_id = %window, ?surface, error = %err, "surface was not attached");
        }
    }

    fn discard_window(&self, window: WindowId, bar: &ViewId) {
        self.views.remove_view(bar);
        self.views.cleanup_window_views(window);
        self.windows.destroy_window(window);
    }

    /// Lay out the control bar and content for the window's current size
    /// and state.
    fn layout_window(
        &self,
        window: WindowId,
        bar: &ViewId,
        content: SurfaceId,
    ) -> layout::DetachedLayout {
        let bounds = self
            .backend
            .window_bounds(window)
            .unwrap_or_default();
        let state = self.backend.window_state(window).unwrap_or_default();
        let l = layout::detached_layout(
            bounds.size(),
            state,
            self.config.control_bar_height,
            self.config.show_control_bar,
        );
        let bar_bounds = l.control_bar.unwrap_or_else(Bounds::hidden);
        if let Err(err) = self.views.set_view_bounds(bar, bar_bounds) {
            tracing::warn!(window_id = %window, error = %err, "control bar layout failed");
        }
        if let Err(err) = self.backend.set_surface_bounds(content, l.content) {
            tracing::warn!(window_id = %window, error = %err, "detached content layout failed");
        }
        l
    }

    async fn init_control_bar(
        &self,
        window: WindowId,
        bar: &ViewId,
        info: &ViewInfo,
        title: &str,
    ) -> InitOutcome {
        let Some(bar_surface) = self.views.surface_of(bar) else {
            return InitOutcome::FellBack {
                cause: InitFailure::LoadFailed("control bar vanished".into()),
            };
        };
        let source = ContentSource::Url(self.config.control_bar_url.clone());
        let loaded = load_with_timeout(
            self.backend.as_ref(),
            bar_surface,
            &source,
            self.config.init_timeout(),
        )
        .await;
        let failure = match InitFailure::from_load(loaded) {
            Some(f) => Some(f),
            None => self
                .backend
                .post_message(
                    bar_surface,
                    CONTROL_BAR_INIT_CHANNEL,
                    init_payload(window, info, title),
                )
                .err()
                .map(|e| InitFailure::MessageRejected(e.to_string())),
        };
        let Some(cause) = failure else {
            return InitOutcome::Ready;
        };
        tracing::warn!(window_id = %window, ?cause, "control bar init failed, loading original content");
        if let Some(original) = info.source.clone() {
            match self.views.load_content(bar, original, None).await {
                Ok(LoadOutcome::Loaded) => {}
                Ok(outcome) => tracing::warn!(window_id = %window, ?outcome, "fallback load did not complete"),
                Err(err) => tracing::warn!(window_id = %window, error = %err, "fallback load skipped"),
            }
        }
        InitOutcome::FellBack { cause }
    }

    /// Put the view back into `target` and close its detached window.
    pub async fn reattach(&self, window: WindowId, target: WindowId) -> Result<()> {
        let record = self
            .record(window)
            .ok_or(WmError::NotFound(Subject::Detachment(window)))?;
        self.windows.ensure_alive(target)?;
        let id = record.source_view_id.clone();
        let ticket = self.views.ticket(&id).map_err(|_| {
            WmError::InvalidReference(Subject::View(id.clone()))
        })?;
        self.views.check_ticket(&id, ticket)?;
        if self.ledger.lock().in_flight.contains(&id) {
            return Err(WmError::NotPermitted {
                operation: "reattach",
                subject: Subject::Detachment(window),
                reason: "detach still in progress",
            });
        }

        {
            if !self.ledger.lock().closing.insert(window) {
                return Err(WmError::InvalidReference(Subject::Detachment(window)));
            }
            let closing = ClosingGuard {
                ledger: &self.ledger,
                window,
            };

            if self.backend.window_alive(window) {
                self.release(window, ticket.surface);
            }
            if let Err(err) = self.backend.attach_surface(target, ticket.surface).await {
                let restored = self.put_back(ticket.surface, window).await;
                return Err(WmError::partial("reattach", Stage::Reparent, err, restored));
            }
            let checkpoint = Checkpoint::new().window(target).view(id.clone(), ticket);
            if let Err(err) = checkpoint.revalidate(&self.windows, &self.views) {
                if self.backend.surface_alive(ticket.surface) {
                    self.release(target, ticket.surface);
                    self.put_back(ticket.surface, window).await;
                }
                return Err(err);
            }

            self.views.update_view_parent_window(&id, target)?;
            {
                let mut ledger = self.ledger.lock();
                ledger.by_view.remove(&id);
                ledger.watched.insert(id.clone(), GestureScope::Detachable);
            }
            drop(closing);
        }

        if let Err(err) = self.views.switch_to_view(target, &id).await {
            tracing::warn!(view_id = %id, error = %err, "reattached view could not be shown");
        }
        self.close_detached_window(window, CloseReason::Reattached)
            .await;

        tracing::info!(view_id = %id, window_id = %target, from = %window, "view reattached");
        self.events.emit(EngineEvent::Reattached {
            meta: EventMeta::new(&id, Some(target)),
            detached_window: window,
        });
        Ok(())
    }

    /// Tear down a detached window. Safe to call repeatedly and after parts
    /// of the window are already gone; the `closed` event fires once.
    pub async fn close_detached_window(&self, window: WindowId, reason: CloseReason) -> bool {
        let record = {
            let mut ledger = self.ledger.lock();
            if !ledger.closing.insert(window) {
                return false;
            }
            ledger.records.get(&window).cloned()
        };
        let _closing = ClosingGuard {
            ledger: &self.ledger,
            window,
        };
        let Some(record) = record else {
            self.windows.destroy_window(window);
            return false;
        };
        let view = &record.source_view_id;
        let view_here = self.views.owner_of(view) == Some(window);

        // (a) out of the compositing tree
        let bar_surface = record
            .control_bar_view_id
            .as_ref()
            .and_then(|b| self.views.surface_of(b));
        if self.backend.window_alive(window) {
            if let Some(s) = bar_surface {
                self.release(window, s);
            }
            if view_here && let Some(s) = self.views.surface_of(view) {
                self.release(window, s);
            }
        }

        // (b) stop watching input
        {
            let mut ledger = self.ledger.lock();
            if let Some(bar) = &record.control_bar_view_id {
                ledger.watched.remove(bar);
            }
            if view_here {
                ledger.watched.remove(view);
            }
        }

        // (c) control bar
        if let Some(bar) = &record.control_bar_view_id {
            self.views.remove_view(bar);
        }

        // (d) the view itself
        if view_here {
            match self.lifecycle.handle_close(view) {
                Ok(CloseOutcome::KeepAlive) => {
                    self.rehome_hidden(view, record.source_window_id).await;
                }
                Ok(CloseOutcome::Destroyed) => {}
                Err(_) => {
                    self.views.remove_view(view);
                }
            }
        }

        // (e) record
        let removed = {
            let mut ledger = self.ledger.lock();
            let removed = ledger.records.remove(&window).is_some();
            if ledger.by_view.get(view) == Some(&window) {
                ledger.by_view.remove(view);
            }
            removed
        };

        // (f) window and event
        self.views.cleanup_window_views(window);
        self.windows.destroy_window(window);
        if removed {
            tracing::info!(view_id = %view, window_id = %window, ?reason, "detached window closed");
            self.events.emit(EngineEvent::Closed {
                meta: EventMeta::new(view, Some(window)),
                reason,
            });
        }
        removed
    }

    /// Keep a paused view alive by parking it, hidden, in its source window.
    async fn rehome_hidden(&self, view: &ViewId, source: WindowId) {
        let Some(surface) = self.views.surface_of(view) else {
            return;
        };
        if self.windows.is_alive(source)
            && self.backend.attach_surface(source, surface).await.is_ok()
            && self.views.contains(view)
            && self.views.update_view_parent_window(view, source).is_ok()
        {
            if let Err(err) = self.views.hide_view(view) {
                tracing::warn!(view_id = %view, error = %err, "could not hide parked view");
            }
            self.ledger
                .lock()
                .watched
                .insert(view.clone(), GestureScope::Detachable);
            tracing::debug!(view_id = %view, window_id = %source, "paused view parked in source window");
        } else {
            tracing::debug!(view_id = %view, "source window gone, destroying paused view");
            self.lifecycle.destroy(view);
        }
    }

    pub async fn control_bar_action(&self, window: WindowId, action: ControlBarAction) -> Result<()> {
        let record = self
            .record(window)
            .ok_or(WmError::NotFound(Subject::Detachment(window)))?;
        tracing::debug!(window_id = %window, ?action, "control bar action");
        match action {
            ControlBarAction::Minimize => {
                self.windows
                    .set_state(window, WindowState::Minimized)
            }
            ControlBarAction::Maximize => {
                self.windows.toggle_maximize(window)?;
                self.relayout(window)
            }
            ControlBarAction::Close => {
                self.close_detached_window(window, CloseReason::Dismissed)
                    .await;
                Ok(())
            }
            ControlBarAction::Reattach => self.reattach(window, record.source_window_id).await,
        }
    }

    /// Re-run the detached layout after the window changed size or state.
    pub fn relayout(&self, window: WindowId) -> Result<()> {
        let record = self
            .record(window)
            .ok_or(WmError::NotFound(Subject::Detachment(window)))?;
        let (Some(bar), Some(content)) = (
            record.control_bar_view_id.as_ref(),
            self.views.surface_of(&record.source_view_id),
        ) else {
            return Ok(());
        };
        let l = self.layout_window(window, bar, content);
        self.views.present(&record.source_view_id, l.content)
    }

    /// Watch a view's input for the detach gesture.
    pub fn watch(&self, view: &ViewId) {
        self.ledger
            .lock()
            .watched
            .entry(view.clone())
            .or_insert(GestureScope::Detachable);
    }

    pub fn unwatch(&self, view: &ViewId) {
        self.ledger.lock().watched.remove(view);
    }

    pub fn gesture_scope(&self, view: &ViewId) -> Option<GestureScope> {
        self.ledger.lock().watched.get(view).copied()
    }

    /// Route a key event from `view`. Returns the gesture that was acted on.
    pub async fn handle_input(&self, view: &ViewId, key: &KeyEvent) -> Result<Option<Gesture>> {
        match self.gesture_scope(view) {
            Some(GestureScope::Detachable) => {
                if !self.gestures.matches(Gesture::Detach, key) {
                    return Ok(None);
                }
                let owner = self
                    .views
                    .owner_of(view)
                    .ok_or_else(|| WmError::NotFound(Subject::View(view.clone())))?;
                self.detach(view, owner, DetachOptions::default()).await?;
                Ok(Some(Gesture::Detach))
            }
            Some(GestureScope::Detached(window)) => {
                match self
                    .gestures
                    .gesture_for(key, &[Gesture::Reattach, Gesture::Dismiss])
                {
                    Some(Gesture::Reattach) => {
                        self.control_bar_action(window, ControlBarAction::Reattach)
                            .await?;
                        Ok(Some(Gesture::Reattach))
                    }
                    Some(Gesture::Dismiss) => {
                        self.close_detached_window(window, CloseReason::Dismissed)
                            .await;
                        Ok(Some(Gesture::Dismiss))
                    }
                    _ => Ok(None),
                }
            }
            None => Ok(None),
        }
    }

    /// Emit focus changes of detached windows.
    pub fn handle_focus(&self, window: WindowId, focused: bool) {
        let Some(view) = self.record(window).map(|r| r.source_view_id) else {
            return;
        };
        let meta = EventMeta::new(&view, Some(window));
        self.events.emit(if focused {
            EngineEvent::Focused { meta }
        } else {
            EngineEvent::Blurred { meta }
        });
    }

    // --- queries ---

    pub fn is_detached(&self, view: &ViewId) -> bool {
        DetachState::is_detached(self, view)
    }

    pub fn detached_window_for(&self, view: &ViewId) -> Option<WindowId> {
        self.ledger.lock().by_view.get(view).copied()
    }

    pub fn record(&self, window: WindowId) -> Option<DetachmentRecord> {
        self.ledger.lock().records.get(&window).cloned()
    }

    pub fn detached_windows(&self) -> Vec<WindowId> {
        self.ledger.lock().records.keys().copied().collect()
    }

    pub fn statistics(&self) -> DetachStats {
        let ledger = self.ledger.lock();
        DetachStats {
            detached_windows: ledger.records.len(),
            detached_views: ledger.by_view.keys().cloned().collect(),
        }
    }
}
