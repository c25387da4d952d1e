use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use crossterm::event::KeyEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    Backend, BackendError, BackendResult, BackendSignal, ContentSource, SurfaceId, SurfaceSpec,
    WindowId, WindowSpec, WindowState,
};
use crate::geometry::{Bounds, Display, Point};

/// Callback run while an async backend call is suspended, standing in for
/// whatever else the event loop gets to run in the meantime.
pub type SuspensionHook = Box<dyn FnOnce(&HeadlessBackend) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionPoint {
    CreateSurface,
    Attach,
    Load,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessWindow {
    pub title: String,
    pub bounds: Bounds,
    pub chromeless: bool,
    pub state: WindowState,
    /// Attached surfaces, bottom first.
    pub children: Vec<SurfaceId>,
    pub focused: bool,
    restore_bounds: Option<Bounds>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessSurface {
    pub label: String,
    pub parent: Option<WindowId>,
    pub bounds: Bounds,
    pub loaded: Option<ContentSource>,
    pub messages: Vec<(String, serde_json::Value)>,
    pub crashed: bool,
}

#[derive(Default)]
struct Faults {
    hanging: BTreeSet<String>,
    failing: BTreeSet<String>,
    failing_attaches: usize,
    reject_messages: bool,
    load_delay: Duration,
    hooks: Vec<(SuspensionPoint, SuspensionHook)>,
}

struct HeadlessState {
    next_id: u64,
    windows: BTreeMap<WindowId, HeadlessWindow>,
    surfaces: BTreeMap<SurfaceId, HeadlessSurface>,
    displays: Vec<Display>,
    cursor: Point,
}

impl HeadlessState {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn window_mut(&mut self, id: WindowId) -> BackendResult<&mut HeadlessWindow> {
        self.windows
            .get_mut(&id)
            .ok_or(BackendError::WindowGone(id))
    }

    fn surface_mut(&mut self, id: SurfaceId) -> BackendResult<&mut HeadlessSurface> {
        self.surfaces
            .get_mut(&id)
            .ok_or(BackendError::SurfaceGone(id))
    }

    fn unparent(&mut self, surface: SurfaceId) {
        let parent = self.surfaces.get_mut(&surface).and_then(|s| s.parent.take());
        if let Some(w) = parent.and_then(|p| self.windows.get_mut(&p)) {
            w.children.retain(|c| *c != surface);
        }
    }

    fn display_for(&self, bounds: Bounds) -> Option<Display> {
        Display::nearest(&self.displays, bounds.center()).copied()
    }
}

/// In-memory window system.
///
/// Async calls yield to the runtime before completing so they behave as real
/// suspension points. Faults and hooks let tests interfere at those points.
pub struct HeadlessBackend {
    state: Mutex<HeadlessState>,
    faults: Mutex<Faults>,
    signals_tx: mpsc::UnboundedSender<BackendSignal>,
    signals_rx: Mutex<Option<mpsc::UnboundedReceiver<BackendSignal>>>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// One 1920x1080 primary display with a 40px taskbar.
    pub fn new() -> Self {
        Self::with_displays(vec![Display {
            id: 1,
            bounds: Bounds::new(0, 0, 1920, 1080),
            work_area: Bounds::new(0, 0, 1920, 1040),
            primary: true,
        }])
    }

    pub fn with_displays(displays: Vec<Display>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cursor = Display::primary(&displays)
            .map(|d| d.bounds.center())
            .unwrap_or_default();
        Self {
            state: Mutex::new(HeadlessState {
                next_id: 0,
                windows: BTreeMap::new(),
                surfaces: BTreeMap::new(),
                displays,
                cursor,
            }),
            faults: Mutex::new(Faults::default()),
            signals_tx: tx,
            signals_rx: Mutex::new(Some(rx)),
        }
    }

    // --- inspection ---

    pub fn window(&self, id: WindowId) -> Option<HeadlessWindow> {
        self.state.lock().windows.get(&id).cloned()
    }

    pub fn surface(&self, id: SurfaceId) -> Option<HeadlessSurface> {
        self.state.lock().surfaces.get(&id).cloned()
    }

    pub fn windows(&self) -> Vec<(WindowId, HeadlessWindow)> {
        self.state
            .lock()
            .windows
            .iter()
            .map(|(id, w)| (*id, w.clone()))
            .collect()
    }

    pub fn children(&self, window: WindowId) -> Vec<SurfaceId> {
        self.window(window).map(|w| w.children).unwrap_or_default()
    }

    pub fn surface_count(&self) -> usize {
        self.state.lock().surfaces.len()
    }

    // --- simulated user and OS actions ---

    pub fn set_cursor(&self, p: Point) {
        self.state.lock().cursor = p;
    }

    /// Close a window as if the user clicked its close button.
    pub fn close_window(&self, id: WindowId) {
        self.destroy_window(id);
        self.emit(BackendSignal::WindowClosed(id));
    }

    pub fn resize_window(&self, id: WindowId, bounds: Bounds) {
        if self.set_window_bounds(id, bounds).is_ok() {
            self.emit(BackendSignal::WindowResized { window: id, bounds });
        }
    }

    pub fn crash_surface(&self, id: SurfaceId, reason: &str) {
        if let Some(s) = self.state.lock().surfaces.get_mut(&id) {
            s.crashed = true;
            s.loaded = None;
        }
        self.emit(BackendSignal::SurfaceCrashed {
            surface: id,
            reason: reason.to_string(),
        });
    }

    /// Destroy a surface behind the engine's back.
    pub fn kill_surface(&self, id: SurfaceId) {
        self.destroy_surface(id);
        self.emit(BackendSignal::SurfaceGone(id));
    }

    pub fn press_key(&self, surface: SurfaceId, key: KeyEvent) {
        self.emit(BackendSignal::Input { surface, key });
    }

    pub fn emit(&self, signal: BackendSignal) {
        // The receiver may not be taken yet, or may be gone after shutdown.
        let _ = self.signals_tx.send(signal);
    }

    // --- fault injection ---

    /// Loads whose location starts with `prefix` never complete.
    pub fn hang_loads(&self, prefix: &str) {
        self.faults.lock().hanging.insert(prefix.to_string());
    }

    /// Loads whose location starts with `prefix` fail.
    pub fn fail_loads(&self, prefix: &str) {
        self.faults.lock().failing.insert(prefix.to_string());
    }

    pub fn fail_next_attaches(&self, count: usize) {
        self.faults.lock().failing_attaches = count;
    }

    pub fn reject_messages(&self, reject: bool) {
        self.faults.lock().reject_messages = reject;
    }

    pub fn set_load_delay(&self, delay: Duration) {
        self.faults.lock().load_delay = delay;
    }

    /// Run `hook` the next time an async call reaches `point`.
    pub fn on_next(&self, point: SuspensionPoint, hook: SuspensionHook) {
        self.faults.lock().hooks.push((point, hook));
    }

    async fn suspend(&self, point: SuspensionPoint) {
        tokio::task::yield_now().await;
        let hook = {
            let mut faults = self.faults.lock();
            faults
                .hooks
                .iter()
                .position(|(p, _)| *p == point)
                .map(|idx| faults.hooks.remove(idx).1)
        };
        if let Some(hook) = hook {
            hook(self);
        }
    }
}

fn matches_prefix(set: &BTreeSet<String>, location: &str) -> bool {
    set.iter().any(|p| location.starts_with(p.as_str()))
}

#[async_trait]
impl Backend for HeadlessBackend {
    fn create_window(&self, spec: &WindowSpec) -> BackendResult<WindowId> {
        let mut st = self.state.lock();
        let id = WindowId(st.alloc());
        st.windows.insert(
            id,
            HeadlessWindow {
                title: spec.title.clone(),
                bounds: spec.bounds,
                chromeless: spec.chromeless,
                state: WindowState::Normal,
                children: Vec::new(),
                focused: false,
                restore_bounds: None,
            },
        );
        Ok(id)
    }

    fn destroy_window(&self, window: WindowId) {
        let mut st = self.state.lock();
        if let Some(w) = st.windows.remove(&window) {
            for child in w.children {
                if let Some(s) = st.surfaces.get_mut(&child) {
                    s.parent = None;
                }
            }
        }
    }

    fn window_alive(&self, window: WindowId) -> bool {
        self.state.lock().windows.contains_key(&window)
    }

    fn window_bounds(&self, window: WindowId) -> BackendResult<Bounds> {
        Ok(self.state.lock().window_mut(window)?.bounds)
    }

    fn set_window_bounds(&self, window: WindowId, bounds: Bounds) -> BackendResult<()> {
        self.state.lock().window_mut(window)?.bounds = bounds;
        Ok(())
    }

    fn focus_window(&self, window: WindowId) -> BackendResult<()> {
        let mut st = self.state.lock();
        st.window_mut(window)?;
        for (id, w) in st.windows.iter_mut() {
            w.focused = *id == window;
        }
        Ok(())
    }

    fn set_window_state(&self, window: WindowId, state: WindowState) -> BackendResult<()> {
        let mut st = self.state.lock();
        let current = st.window_mut(window)?.bounds;
        let display = st.display_for(current);
        let w = st.window_mut(window)?;
        if w.state == state {
            return Ok(());
        }
        match state {
            WindowState::Maximized | WindowState::Fullscreen => {
                if w.restore_bounds.is_none() {
                    w.restore_bounds = Some(w.bounds);
                }
                if let Some(d) = display {
                    w.bounds = if state == WindowState::Maximized {
                        d.work_area
                    } else {
                        d.bounds
                    };
                }
            }
            WindowState::Normal => {
                if let Some(b) = w.restore_bounds.take() {
                    w.bounds = b;
                }
            }
            WindowState::Minimized => {}
        }
        w.state = state;
        Ok(())
    }

    fn window_state(&self, window: WindowId) -> BackendResult<WindowState> {
        Ok(self.state.lock().window_mut(window)?.state)
    }

    fn displays(&self) -> Vec<Display> {
        self.state.lock().displays.clone()
    }

    fn cursor_position(&self) -> Point {
        self.state.lock().cursor
    }

    async fn create_surface(&self, spec: &SurfaceSpec) -> BackendResult<SurfaceId> {
        self.suspend(SuspensionPoint::CreateSurface).await;
        let mut st = self.state.lock();
        let id = SurfaceId(st.alloc());
        st.surfaces.insert(
            id,
            HeadlessSurface {
                label: spec.label.clone(),
                parent: None,
                bounds: Bounds::default(),
                loaded: None,
                messages: Vec::new(),
                crashed: false,
            },
        );
        Ok(id)
    }

    fn destroy_surface(&self, surface: SurfaceId) {
        let mut st = self.state.lock();
        st.unparent(surface);
        st.surfaces.remove(&surface);
    }

    fn surface_alive(&self, surface: SurfaceId) -> bool {
        self.state.lock().surfaces.contains_key(&surface)
    }

    async fn attach_surface(&self, window: WindowId, surface: SurfaceId) -> BackendResult<()> {
        self.suspend(SuspensionPoint::Attach).await;
        {
            let mut faults = self.faults.lock();
            if faults.failing_attaches > 0 {
                faults.failing_attaches -= 1;
                return Err(BackendError::Rejected("attach refused".into()));
            }
        }
        let mut st = self.state.lock();
        st.window_mut(window)?;
        st.surface_mut(surface)?;
        st.unparent(surface);
        st.window_mut(window)?.children.push(surface);
        st.surface_mut(surface)?.parent = Some(window);
        Ok(())
    }

    fn detach_surface(&self, window: WindowId, surface: SurfaceId) -> BackendResult<()> {
        let mut st = self.state.lock();
        let s = st.surface_mut(surface)?;
        if s.parent != Some(window) {
            return Err(BackendError::NotAttached { window, surface });
        }
        st.unparent(surface);
        Ok(())
    }

    fn set_surface_bounds(&self, surface: SurfaceId, bounds: Bounds) -> BackendResult<()> {
        self.state.lock().surface_mut(surface)?.bounds = bounds;
        Ok(())
    }

    async fn load(&self, surface: SurfaceId, source: &ContentSource) -> BackendResult<()> {
        let (hang, fail, delay) = {
            let faults = self.faults.lock();
            (
                matches_prefix(&faults.hanging, source.location()),
                matches_prefix(&faults.failing, source.location()),
                faults.load_delay,
            )
        };
        self.suspend(SuspensionPoint::Load).await;
        if hang {
            std::future::pending::<()>().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(BackendError::LoadFailed {
                resource: source.to_string(),
                reason: "connection refused".into(),
            });
        }
        let mut st = self.state.lock();
        let s = st.surface_mut(surface)?;
        s.loaded = Some(source.clone());
        s.crashed = false;
        Ok(())
    }

    fn post_message(
        &self,
        surface: SurfaceId,
        channel: &str,
        payload: serde_json::Value,
    ) -> BackendResult<()> {
        if self.faults.lock().reject_messages {
            return Err(BackendError::Rejected(format!("message on `{channel}`")));
        }
        self.state
            .lock()
            .surface_mut(surface)?
            .messages
            .push((channel.to_string(), payload));
        Ok(())
    }

    fn take_signals(&self) -> Option<mpsc::UnboundedReceiver<BackendSignal>> {
        self.signals_rx.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> WindowSpec {
        WindowSpec {
            title: "t".into(),
            bounds: Bounds::new(10, 10, 800, 600),
            chromeless: false,
            resizable: true,
        }
    }

    #[tokio::test]
    async fn attach_moves_surface_to_top_of_new_parent() {
        let b = HeadlessBackend::new();
        let w1 = b.create_window(&spec()).unwrap();
        let w2 = b.create_window(&spec()).unwrap();
        let s1 = b.create_surface(&SurfaceSpec::default()).await.unwrap();
        let s2 = b.create_surface(&SurfaceSpec::default()).await.unwrap();

        b.attach_surface(w1, s1).await.unwrap();
        b.attach_surface(w1, s2).await.unwrap();
        b.attach_surface(w1, s1).await.unwrap();
        assert_eq!(b.children(w1), vec![s2, s1]);

        b.attach_surface(w2, s1).await.unwrap();
        assert_eq!(b.children(w1), vec![s2]);
        assert_eq!(b.children(w2), vec![s1]);
        assert_eq!(b.surface(s1).unwrap().parent, Some(w2));
    }

    #[tokio::test]
    async fn destroying_window_orphans_children() {
        let b = HeadlessBackend::new();
        let w = b.create_window(&spec()).unwrap();
        let s = b.create_surface(&SurfaceSpec::default()).await.unwrap();
        b.attach_surface(w, s).await.unwrap();

        b.destroy_window(w);
        b.destroy_window(w);
        assert!(!b.window_alive(w));
        assert!(b.surface_alive(s));
        assert_eq!(b.surface(s).unwrap().parent, None);
    }

    #[tokio::test]
    async fn hooks_run_once_at_their_point() {
        let b = HeadlessBackend::new();
        let w = b.create_window(&spec()).unwrap();
        b.on_next(
            SuspensionPoint::CreateSurface,
            Box::new(move |b| b.close_window(w)),
        );
        b.create_surface(&SurfaceSpec::default()).await.unwrap();
        assert!(!b.window_alive(w));

        let mut rx = b.take_signals().unwrap();
        assert_eq!(rx.try_recv().unwrap(), BackendSignal::WindowClosed(w));
        assert!(b.take_signals().is_none());
    }

    #[tokio::test]
    async fn maximize_and_restore() {
        let b = HeadlessBackend::new();
        let w = b.create_window(&spec()).unwrap();
        b.set_window_state(w, WindowState::Maximized).unwrap();
        assert_eq!(b.window_bounds(w).unwrap(), Bounds::new(0, 0, 1920, 1040));
        b.set_window_state(w, WindowState::Normal).unwrap();
        assert_eq!(b.window_bounds(w).unwrap(), Bounds::new(10, 10, 800, 600));
    }
}
