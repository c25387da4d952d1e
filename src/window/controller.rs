use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Placement, WindowKind, WindowOptions, WindowSummary};
use crate::backend::{Backend, WindowId, WindowSpec, WindowState};
use crate::constants::PARK_OFFSET;
use crate::error::{Result, Subject, WmError};
use crate::geometry::{Bounds, BoundsPatch, Display, Point, Size};

#[derive(Debug, Clone)]
struct ManagedWindow {
    kind: WindowKind,
    title: String,
    placement: Placement,
}

#[derive(Debug, Default)]
struct ControllerState {
    windows: BTreeMap<WindowId, ManagedWindow>,
    /// Visible position to restore on the next `show`, keyed by window.
    parked: BTreeMap<WindowId, Point>,
}

/// Creates, parks and destroys host windows.
pub struct WindowController {
    backend: Arc<dyn Backend>,
    state: Mutex<ControllerState>,
}

impl WindowController {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn create_window(&self, opts: WindowOptions) -> Result<WindowId> {
        let position = match opts.position {
            Some(p) => p,
            None => self.centered(opts.size).origin(),
        };
        let bounds = Bounds::new(position.x, position.y, opts.size.width, opts.size.height);
        let id = self.backend.create_window(&WindowSpec {
            title: opts.title.clone(),
            bounds,
            chromeless: opts.chromeless,
            resizable: opts.resizable,
        })?;
        self.state.lock().windows.insert(
            id,
            ManagedWindow {
                kind: opts.kind,
                title: opts.title,
                placement: Placement::Visible,
            },
        );
        tracing::debug!(window_id = %id, kind = ?opts.kind, ?bounds, "window created");
        Ok(id)
    }

    /// Returns `false` when the window was not known. Never fails.
    pub fn destroy_window(&self, id: WindowId) -> bool {
        let known = self.forget(id);
        self.backend.destroy_window(id);
        if known {
            tracing::debug!(window_id = %id, "window destroyed");
        }
        known
    }

    /// Drop bookkeeping for a window the OS already closed.
    pub fn forget(&self, id: WindowId) -> bool {
        let mut st = self.state.lock();
        st.parked.remove(&id);
        st.windows.remove(&id).is_some()
    }

    /// `NotFound` for windows never created here, `InvalidReference` for
    /// windows that are tracked but no longer exist in the backend.
    pub fn ensure_alive(&self, id: WindowId) -> Result<()> {
        if !self.state.lock().windows.contains_key(&id) {
            return Err(WmError::NotFound(Subject::Window(id)));
        }
        if !self.backend.window_alive(id) {
            return Err(WmError::InvalidReference(Subject::Window(id)));
        }
        Ok(())
    }

    pub fn is_alive(&self, id: WindowId) -> bool {
        self.ensure_alive(id).is_ok()
    }

    /// Restore the position cached by `hide`, or center the window when
    /// nothing is cached. Also focuses it.
    pub fn show(&self, id: WindowId) -> Result<()> {
        self.ensure_alive(id)?;
        let cached = {
            let mut st = self.state.lock();
            let placement = st.windows.get(&id).map(|w| w.placement);
            if placement == Some(Placement::Parked) {
                Some(st.parked.remove(&id))
            } else {
                None
            }
        };
        if let Some(cached) = cached {
            let current = self.backend.window_bounds(id)?;
            let target = match cached {
                Some(p) => current.with_position(p),
                None => self.centered(current.size()),
            };
            self.backend.set_window_bounds(id, target)?;
            self.set_placement(id, Placement::Visible);
            tracing::debug!(window_id = %id, ?target, "window shown");
        }
        self.backend.focus_window(id)?;
        Ok(())
    }

    /// Park the window outside every display. Hiding a parked window keeps
    /// the first cached position.
    pub fn hide(&self, id: WindowId) -> Result<()> {
        self.ensure_alive(id)?;
        if self.placement(id) == Some(Placement::Parked) {
            return Ok(());
        }
        let current = self.backend.window_bounds(id)?;
        let parked_x = Display::leftmost_edge(&self.backend.displays())
            - current.width as i32
            - PARK_OFFSET;
        self.backend
            .set_window_bounds(id, current.with_position(Point::new(parked_x, current.y)))?;
        {
            let mut st = self.state.lock();
            st.parked.insert(id, current.origin());
            if let Some(w) = st.windows.get_mut(&id) {
                w.placement = Placement::Parked;
            }
        }
        tracing::debug!(window_id = %id, cached = ?current.origin(), "window parked");
        Ok(())
    }

    /// While parked, position changes go to the cache and only the size is
    /// applied.
    pub fn set_bounds(&self, id: WindowId, patch: BoundsPatch) -> Result<Bounds> {
        self.ensure_alive(id)?;
        let current = self.backend.window_bounds(id)?;
        let requested = current.apply(&patch);
        let applied = {
            let mut st = self.state.lock();
            match st.parked.get_mut(&id) {
                Some(cached) => {
                    *cached = requested.origin();
                    Bounds::new(current.x, current.y, requested.width, requested.height)
                }
                None => requested,
            }
        };
        self.backend.set_window_bounds(id, applied)?;
        Ok(applied)
    }

    pub fn bounds(&self, id: WindowId) -> Result<Bounds> {
        self.ensure_alive(id)?;
        Ok(self.backend.window_bounds(id)?)
    }

    pub fn is_visible(&self, id: WindowId) -> bool {
        self.is_alive(id) && self.placement(id) == Some(Placement::Visible)
    }

    pub fn placement(&self, id: WindowId) -> Option<Placement> {
        self.state.lock().windows.get(&id).map(|w| w.placement)
    }

    pub fn kind(&self, id: WindowId) -> Option<WindowKind> {
        self.state.lock().windows.get(&id).map(|w| w.kind)
    }

    pub fn focus(&self, id: WindowId) -> Result<()> {
        self.ensure_alive(id)?;
        Ok(self.backend.focus_window(id)?)
    }

    pub fn set_state(&self, id: WindowId, state: WindowState) -> Result<()> {
        self.ensure_alive(id)?;
        self.backend.set_window_state(id, state)?;
        tracing::debug!(window_id = %id, ?state, "window state changed");
        Ok(())
    }

    pub fn window_state(&self, id: WindowId) -> Result<WindowState> {
        self.ensure_alive(id)?;
        Ok(self.backend.window_state(id)?)
    }

    pub fn toggle_maximize(&self, id: WindowId) -> Result<WindowState> {
        let next = match self.window_state(id)? {
            WindowState::Maximized => WindowState::Normal,
            _ => WindowState::Maximized,
        };
        self.set_state(id, next)?;
        Ok(next)
    }

    pub fn center(&self, id: WindowId) -> Result<()> {
        let current = self.bounds(id)?;
        self.backend
            .set_window_bounds(id, self.centered(current.size()))?;
        Ok(())
    }

    pub fn windows(&self) -> Vec<WindowSummary> {
        let snapshot: Vec<_> = self
            .state
            .lock()
            .windows
            .iter()
            .map(|(id, w)| (*id, w.clone()))
            .collect();
        snapshot
            .into_iter()
            .map(|(id, w)| WindowSummary {
                id,
                kind: w.kind,
                title: w.title,
                placement: w.placement,
                state: self.backend.window_state(id).ok(),
                bounds: self.backend.window_bounds(id).ok(),
            })
            .collect()
    }

    pub fn count(&self, kind: WindowKind) -> usize {
        self.state
            .lock()
            .windows
            .values()
            .filter(|w| w.kind == kind)
            .count()
    }

    fn set_placement(&self, id: WindowId, placement: Placement) {
        if let Some(w) = self.state.lock().windows.get_mut(&id) {
            w.placement = placement;
        }
    }

    fn centered(&self, size: Size) -> Bounds {
        let displays = self.backend.displays();
        match Display::primary(&displays) {
            Some(d) => d.work_area.center_rect(size),
            None => Bounds::new(0, 0, size.width, size.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    fn controller() -> (Arc<HeadlessBackend>, WindowController) {
        let backend = Arc::new(HeadlessBackend::new());
        let wc = WindowController::new(backend.clone());
        (backend, wc)
    }

    fn opts_at(x: i32, y: i32) -> WindowOptions {
        WindowOptions {
            position: Some(Point::new(x, y)),
            ..WindowOptions::main("main", Size::new(800, 600))
        }
    }

    #[test]
    fn create_centers_on_primary_work_area() {
        let (backend, wc) = controller();
        let id = wc
            .create_window(WindowOptions::main("main", Size::new(800, 600)))
            .unwrap();
        assert_eq!(
            backend.window(id).unwrap().bounds,
            Bounds::new(560, 220, 800, 600)
        );
        assert!(wc.is_visible(id));
    }

    #[test]
    fn hide_then_show_restores_position() {
        let (backend, wc) = controller();
        let id = wc.create_window(opts_at(100, 50)).unwrap();

        wc.hide(id).unwrap();
        assert_eq!(wc.placement(id), Some(Placement::Parked));
        assert!(!wc.is_visible(id));
        let parked = backend.window(id).unwrap().bounds;
        assert_eq!(parked.x, -800 - PARK_OFFSET);
        assert!(parked.right() < 0);

        // a second hide must not overwrite the cached visible position
        wc.hide(id).unwrap();
        wc.show(id).unwrap();
        assert_eq!(backend.window(id).unwrap().bounds, Bounds::new(100, 50, 800, 600));
        assert!(wc.is_visible(id));
        assert!(backend.window(id).unwrap().focused);
    }

    #[test]
    fn show_of_visible_window_keeps_position() {
        let (backend, wc) = controller();
        let id = wc.create_window(opts_at(7, 9)).unwrap();
        wc.show(id).unwrap();
        assert_eq!(backend.window(id).unwrap().bounds.origin(), Point::new(7, 9));
    }

    #[test]
    fn moving_a_parked_window_updates_the_cache() {
        let (backend, wc) = controller();
        let id = wc.create_window(opts_at(100, 100)).unwrap();
        wc.hide(id).unwrap();
        wc.set_bounds(
            id,
            BoundsPatch {
                x: Some(300),
                height: Some(400),
                ..BoundsPatch::default()
            },
        )
        .unwrap();
        assert!(backend.window(id).unwrap().bounds.x < 0);
        wc.show(id).unwrap();
        assert_eq!(backend.window(id).unwrap().bounds, Bounds::new(300, 100, 800, 400));
    }

    #[test]
    fn destroy_is_idempotent() {
        let (backend, wc) = controller();
        let id = wc.create_window(opts_at(0, 0)).unwrap();
        assert!(wc.destroy_window(id));
        assert!(!wc.destroy_window(id));
        assert!(!wc.destroy_window(WindowId(999)));
        assert!(!backend.window_alive(id));
        assert!(wc.ensure_alive(id).unwrap_err().is_not_found());
    }

    #[test]
    fn externally_closed_window_is_a_stale_reference() {
        let (backend, wc) = controller();
        let id = wc.create_window(opts_at(0, 0)).unwrap();
        backend.close_window(id);
        assert!(wc.ensure_alive(id).unwrap_err().is_invalid_reference());
        assert!(wc.hide(id).is_err());
    }

    #[test]
    fn toggle_maximize_round_trips() {
        let (_backend, wc) = controller();
        let id = wc.create_window(opts_at(0, 0)).unwrap();
        assert_eq!(wc.toggle_maximize(id).unwrap(), WindowState::Maximized);
        assert_eq!(wc.toggle_maximize(id).unwrap(), WindowState::Normal);
    }
}
