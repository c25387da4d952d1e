//! Keep-alive versus destroy decisions, and the eviction sweep that bounds
//! how much paused content stays resident.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::LifecycleConfig;
use crate::error::{Result, Subject, WmError};
use crate::events::{EngineEvent, EventBus, EventMeta};
use crate::view::{ViewId, ViewRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Foreground,
    Background,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleStrategy {
    pub kind: LifecycleKind,
    pub persist_on_close: bool,
    /// Overrides the configured idle limit for this view.
    pub max_idle: Option<Duration>,
    /// Initial memory estimate in MB.
    pub memory_weight_mb: Option<f64>,
}

impl Default for LifecycleStrategy {
    fn default() -> Self {
        Self::foreground()
    }
}

impl LifecycleStrategy {
    pub fn foreground() -> Self {
        Self {
            kind: LifecycleKind::Foreground,
            persist_on_close: false,
            max_idle: None,
            memory_weight_mb: None,
        }
    }

    pub fn background(max_idle: Option<Duration>) -> Self {
        Self {
            kind: LifecycleKind::Background,
            persist_on_close: true,
            max_idle,
            memory_weight_mb: None,
        }
    }

    /// Strategy for a caller that only said whether the view should survive
    /// being dismissed.
    pub fn infer(persist_when_dismissed: bool, cfg: &LifecycleConfig) -> Self {
        if persist_when_dismissed {
            Self::background(Some(cfg.background_max_idle()))
        } else {
            Self::foreground()
        }
    }

    pub fn keeps_alive(&self) -> bool {
        self.kind == LifecycleKind::Background && self.persist_on_close
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Active,
    Paused,
    /// No record: never registered, or destroyed.
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    /// Paused; the surface must be kept.
    KeepAlive,
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub before_mb: f64,
    pub after_mb: f64,
    pub freed_mb: f64,
    pub destroyed: Vec<ViewId>,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleStats {
    pub total: usize,
    pub active: usize,
    pub paused: usize,
    pub total_memory_mb: f64,
    pub average_memory_mb: f64,
}

#[derive(Debug, Clone)]
struct LifecycleRecord {
    strategy: LifecycleStrategy,
    paused_at: Option<Instant>,
    last_access: Instant,
    memory_weight_mb: f64,
}

struct Candidate {
    id: ViewId,
    weight: f64,
    idle: Duration,
    max_idle: Duration,
}

impl Candidate {
    fn score(&self) -> f64 {
        self.weight + self.idle.as_secs_f64()
    }
}

pub struct LifecycleManager {
    registry: Arc<ViewRegistry>,
    events: EventBus,
    config: Mutex<LifecycleConfig>,
    records: Mutex<BTreeMap<ViewId, LifecycleRecord>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<ViewRegistry>, events: EventBus, config: LifecycleConfig) -> Self {
        Self {
            registry,
            events,
            config: Mutex::new(config),
            records: Mutex::new(BTreeMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Assign or replace the strategy of `id`. Replacing keeps the paused
    /// state and access time.
    pub fn set_strategy(&self, id: &ViewId, strategy: LifecycleStrategy) {
        let default_weight = self.config.lock().default_memory_weight_mb;
        let mut records = self.records.lock();
        match records.get_mut(id) {
            Some(r) => {
                if let Some(w) = strategy.memory_weight_mb {
                    r.memory_weight_mb = w;
                }
                r.strategy = strategy;
            }
            None => {
                records.insert(
                    id.clone(),
                    LifecycleRecord {
                        memory_weight_mb: strategy.memory_weight_mb.unwrap_or(default_weight),
                        strategy,
                        paused_at: None,
                        last_access: Instant::now(),
                    },
                );
            }
        }
        tracing::debug!(view_id = %id, "lifecycle strategy set");
    }

    pub fn strategy(&self, id: &ViewId) -> Option<LifecycleStrategy> {
        self.records.lock().get(id).map(|r| r.strategy.clone())
    }

    pub fn phase(&self, id: &ViewId) -> LifecyclePhase {
        match self.records.lock().get(id) {
            Some(r) if r.paused_at.is_some() => LifecyclePhase::Paused,
            Some(_) => LifecyclePhase::Active,
            None => LifecyclePhase::Destroyed,
        }
    }

    /// Decide what dismissing `id` means. Background views that persist are
    /// paused and must stay alive; everything else is destroyed here.
    pub fn handle_close(&self, id: &ViewId) -> Result<CloseOutcome> {
        let keeps_alive = self
            .records
            .lock()
            .get(id)
            .map(|r| r.strategy.keeps_alive())
            .ok_or_else(|| WmError::NotFound(Subject::Lifecycle(id.clone())))?;
        if self.registry.is_primary(id) {
            tracing::debug!(view_id = %id, "primary view is never closed by lifecycle");
            return Ok(CloseOutcome::KeepAlive);
        }
        if keeps_alive {
            self.pause(id)?;
            Ok(CloseOutcome::KeepAlive)
        } else {
            self.destroy(id);
            Ok(CloseOutcome::Destroyed)
        }
    }

    pub fn pause(&self, id: &ViewId) -> Result<()> {
        let newly = {
            let mut records = self.records.lock();
            let r = records
                .get_mut(id)
                .ok_or_else(|| WmError::NotFound(Subject::Lifecycle(id.clone())))?;
            let newly = r.paused_at.is_none();
            if newly {
                r.paused_at = Some(Instant::now());
            }
            newly
        };
        if newly {
            tracing::debug!(view_id = %id, "view paused");
            self.events.emit(EngineEvent::Paused {
                meta: EventMeta::new(id, self.registry.owner_of(id)),
            });
        }
        Ok(())
    }

    /// Returns whether the view was paused.
    pub fn resume(&self, id: &ViewId) -> Result<bool> {
        let was_paused = {
            let mut records = self.records.lock();
            let r = records
                .get_mut(id)
                .ok_or_else(|| WmError::NotFound(Subject::Lifecycle(id.clone())))?;
            r.paused_at.take().is_some()
        };
        if was_paused {
            tracing::debug!(view_id = %id, "view resumed");
            self.events.emit(EngineEvent::Resumed {
                meta: EventMeta::new(id, self.registry.owner_of(id)),
            });
        }
        Ok(was_paused)
    }

    /// Refresh the access time, resuming the view if it was paused.
    pub fn update_access(&self, id: &ViewId) -> Result<()> {
        {
            let mut records = self.records.lock();
            let r = records
                .get_mut(id)
                .ok_or_else(|| WmError::NotFound(Subject::Lifecycle(id.clone())))?;
            r.last_access = Instant::now();
        }
        self.resume(id)?;
        self.registry.touch(id);
        Ok(())
    }

    /// Drop the record and the surface. Succeeds when either is already
    /// gone; returns whether anything was left to destroy.
    pub fn destroy(&self, id: &ViewId) -> bool {
        let had_record = self.records.lock().remove(id).is_some();
        let had_view = self.registry.remove_view(id);
        if had_record || had_view {
            tracing::debug!(view_id = %id, "view destroyed by lifecycle");
        }
        had_record || had_view
    }

    /// Drop the record only; the view was torn down elsewhere.
    pub fn forget(&self, id: &ViewId) {
        self.records.lock().remove(id);
    }

    pub fn set_memory_weight(&self, id: &ViewId, mb: f64) -> Result<()> {
        let mut records = self.records.lock();
        let r = records
            .get_mut(id)
            .ok_or_else(|| WmError::NotFound(Subject::Lifecycle(id.clone())))?;
        r.memory_weight_mb = mb.max(0.0);
        Ok(())
    }

    /// Evict paused views. Over the memory threshold the top half by
    /// `weight + idle seconds` goes; views past their idle limit always go.
    pub fn sweep(&self) -> SweepReport {
        let started = Instant::now();
        let cfg = self.config.lock().clone();
        let (before_mb, candidates) = {
            let records = self.records.lock();
            let before: f64 = records.values().map(|r| r.memory_weight_mb).sum();
            let candidates: Vec<Candidate> = records
                .iter()
                .filter_map(|(id, r)| {
                    r.paused_at.map(|_| Candidate {
                        id: id.clone(),
                        weight: r.memory_weight_mb,
                        idle: started.saturating_duration_since(r.last_access),
                        max_idle: r.strategy.max_idle.unwrap_or_else(|| cfg.max_idle()),
                    })
                })
                .collect();
            (before, candidates)
        };
        let mut candidates: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| !self.registry.is_primary(&c.id))
            .collect();

        let mut victims: Vec<ViewId> = Vec::new();
        let paused_mb: f64 = candidates.iter().map(|c| c.weight).sum();
        if paused_mb > cfg.memory_threshold_mb {
            candidates.sort_by(|a, b| b.score().total_cmp(&a.score()));
            let evict = candidates.len().div_ceil(2);
            victims.extend(candidates.iter().take(evict).map(|c| c.id.clone()));
        }
        for c in &candidates {
            if c.idle > c.max_idle && !victims.contains(&c.id) {
                victims.push(c.id.clone());
            }
        }

        let freed_mb: f64 = candidates
            .iter()
            .filter(|c| victims.contains(&c.id))
            .map(|c| c.weight)
            .sum();
        for id in &victims {
            self.destroy(id);
        }

        let report = SweepReport {
            before_mb,
            after_mb: before_mb - freed_mb,
            freed_mb,
            destroyed: victims,
            duration: started.elapsed(),
        };
        if !report.destroyed.is_empty() {
            tracing::info!(
                destroyed = report.destroyed.len(),
                freed_mb = report.freed_mb,
                "eviction sweep"
            );
        }
        self.events.emit(EngineEvent::SweepCompleted {
            report: report.clone(),
        });
        report
    }

    pub fn statistics(&self) -> LifecycleStats {
        let records = self.records.lock();
        let total = records.len();
        let paused = records.values().filter(|r| r.paused_at.is_some()).count();
        let total_memory_mb: f64 = records.values().map(|r| r.memory_weight_mb).sum();
        LifecycleStats {
            total,
            active: total - paused,
            paused,
            total_memory_mb,
            average_memory_mb: if total == 0 {
                0.0
            } else {
                total_memory_mb / total as f64
            },
        }
    }

    pub fn config(&self) -> LifecycleConfig {
        self.config.lock().clone()
    }

    /// Apply a new config, restarting the sweeper so a new interval takes
    /// effect.
    pub fn update_config(self: &Arc<Self>, config: LifecycleConfig) {
        let auto = config.auto_sweep;
        *self.config.lock() = config;
        if auto {
            self.start_auto_sweep();
        } else {
            self.stop_auto_sweep();
        }
    }

    pub fn start_auto_sweep(self: &Arc<Self>) {
        let period = self.config.lock().sweep_interval();
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.sweep();
            }
        });
        if let Some(previous) = self.sweeper.lock().replace(task) {
            previous.abort();
        }
        tracing::debug!(interval_secs = period.as_secs(), "auto sweep started");
    }

    pub fn stop_auto_sweep(&self) {
        if let Some(task) = self.sweeper.lock().take() {
            task.abort();
            tracing::debug!("auto sweep stopped");
        }
    }

    pub fn is_auto_sweeping(&self) -> bool {
        self.sweeper.lock().is_some()
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        if let Some(task) = self.sweeper.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::config::{ContentConfig, LayoutConfig};
    use crate::geometry::{Bounds, Size};
    use crate::view::{ViewCategory, ViewConfig};
    use crate::window::{WindowController, WindowOptions};

    struct Fixture {
        registry: Arc<ViewRegistry>,
        lifecycle: Arc<LifecycleManager>,
        main: crate::backend::WindowId,
    }

    async fn fixture(config: LifecycleConfig) -> Fixture {
        let backend = Arc::new(HeadlessBackend::new());
        let windows = Arc::new(WindowController::new(backend.clone()));
        let events = EventBus::new();
        let registry = Arc::new(ViewRegistry::new(
            backend,
            windows.clone(),
            events.clone(),
            LayoutConfig::default(),
            ContentConfig::default(),
        ));
        let main = windows
            .create_window(WindowOptions::main("main", Size::new(800, 600)))
            .unwrap();
        registry
            .create_view(
                main,
                ViewConfig::new("main-view", ViewCategory::Primary, Bounds::new(0, 0, 800, 600)),
            )
            .await
            .unwrap();
        let lifecycle = Arc::new(LifecycleManager::new(registry.clone(), events, config));
        Fixture {
            registry,
            lifecycle,
            main,
        }
    }

    async fn add(f: &Fixture, id: &str, strategy: LifecycleStrategy) -> ViewId {
        let id = f
            .registry
            .create_view(
                f.main,
                ViewConfig::new(id, ViewCategory::Plugin, Bounds::new(0, 0, 10, 10)),
            )
            .await
            .unwrap();
        f.lifecycle.set_strategy(&id, strategy);
        id
    }

    #[test]
    fn inference_follows_persist_intent() {
        let cfg = LifecycleConfig::default();
        let bg = LifecycleStrategy::infer(true, &cfg);
        assert!(bg.keeps_alive());
        assert_eq!(bg.max_idle, Some(Duration::from_secs(300)));
        assert!(!LifecycleStrategy::infer(false, &cfg).keeps_alive());
    }

    #[tokio::test]
    async fn close_pauses_background_and_destroys_foreground() {
        let f = fixture(LifecycleConfig::default()).await;
        let bg = add(&f, "plugin:bg", LifecycleStrategy::background(None)).await;
        let fg = add(&f, "plugin:fg", LifecycleStrategy::foreground()).await;

        assert_eq!(f.lifecycle.handle_close(&bg).unwrap(), CloseOutcome::KeepAlive);
        assert_eq!(f.lifecycle.phase(&bg), LifecyclePhase::Paused);
        assert!(f.registry.contains(&bg));

        assert_eq!(f.lifecycle.handle_close(&fg).unwrap(), CloseOutcome::Destroyed);
        assert_eq!(f.lifecycle.phase(&fg), LifecyclePhase::Destroyed);
        assert!(!f.registry.contains(&fg));

        f.lifecycle.update_access(&bg).unwrap();
        assert_eq!(f.lifecycle.phase(&bg), LifecyclePhase::Active);
    }

    #[tokio::test]
    async fn destroying_twice_is_fine() {
        let f = fixture(LifecycleConfig::default()).await;
        let id = add(&f, "plugin:x", LifecycleStrategy::foreground()).await;
        assert!(f.lifecycle.destroy(&id));
        assert!(!f.lifecycle.destroy(&id));
        assert!(
            f.lifecycle
                .handle_close(&id)
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn memory_pressure_evicts_top_half_by_score() {
        let f = fixture(LifecycleConfig {
            memory_threshold_mb: 100.0,
            ..LifecycleConfig::default()
        })
        .await;
        let weights = [("plugin:a", 10.0), ("plugin:b", 90.0), ("plugin:c", 40.0), ("plugin:d", 70.0), ("plugin:e", 20.0)];
        for (id, w) in weights {
            let id = add(&f, id, LifecycleStrategy::background(None)).await;
            f.lifecycle.set_memory_weight(&id, w).unwrap();
            f.lifecycle.pause(&id).unwrap();
        }
        tokio::time::advance(Duration::from_secs(5)).await;

        let report = f.lifecycle.sweep();
        let destroyed: Vec<&str> = report.destroyed.iter().map(|v| v.as_str()).collect();
        assert_eq!(destroyed, vec!["plugin:b", "plugin:d", "plugin:c"]);
        assert_eq!(report.freed_mb, 200.0);
        assert_eq!(f.lifecycle.statistics().paused, 2);
        assert!(f.registry.contains(&ViewId::from("main-view")));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_views_go_without_memory_pressure() {
        let f = fixture(LifecycleConfig::default()).await;
        let stale = add(
            &f,
            "plugin:stale",
            LifecycleStrategy::background(Some(Duration::from_secs(60))),
        )
        .await;
        let fresh = add(&f, "plugin:fresh", LifecycleStrategy::background(None)).await;
        f.lifecycle.pause(&stale).unwrap();
        f.lifecycle.pause(&fresh).unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let report = f.lifecycle.sweep();
        assert_eq!(report.destroyed, vec![stale.clone()]);
        assert_eq!(f.lifecycle.phase(&fresh), LifecyclePhase::Paused);
        assert!(!f.registry.contains(&stale));
    }

    #[tokio::test(start_paused = true)]
    async fn active_and_primary_views_survive_sweeps() {
        let f = fixture(LifecycleConfig {
            memory_threshold_mb: 0.0,
            max_idle_secs: 1,
            ..LifecycleConfig::default()
        })
        .await;
        let primary = ViewId::from("main-view");
        f.lifecycle
            .set_strategy(&primary, LifecycleStrategy::background(None));
        assert_eq!(f.lifecycle.handle_close(&primary).unwrap(), CloseOutcome::KeepAlive);
        let active = add(&f, "plugin:active", LifecycleStrategy::foreground()).await;

        tokio::time::advance(Duration::from_secs(10)).await;
        let report = f.lifecycle.sweep();
        assert!(report.destroyed.is_empty());
        assert!(f.registry.contains(&primary));
        assert!(f.registry.contains(&active));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_sweep_runs_on_interval() {
        let f = fixture(LifecycleConfig {
            sweep_interval_secs: 30,
            ..LifecycleConfig::default()
        })
        .await;
        let id = add(
            &f,
            "plugin:old",
            LifecycleStrategy::background(Some(Duration::from_secs(10))),
        )
        .await;
        f.lifecycle.pause(&id).unwrap();
        f.lifecycle.start_auto_sweep();
        assert!(f.lifecycle.is_auto_sweeping());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(f.lifecycle.phase(&id), LifecyclePhase::Destroyed);

        f.lifecycle.stop_auto_sweep();
        assert!(!f.lifecycle.is_auto_sweeping());
    }
}
