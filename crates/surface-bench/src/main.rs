use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use indoc::formatdoc;

use surface_wm::backend::{ContentSource, HeadlessBackend};
use surface_wm::config::EngineConfig;
use surface_wm::detach::DetachOptions;
use surface_wm::engine::{Engine, ShowViewRequest};

#[derive(Parser, Debug)]
#[command(
    name = "surface-bench",
    version = env!("CARGO_PKG_VERSION"),
    about = "Time create/switch/detach/reattach/close cycles on the in-memory backend"
)]
struct BenchCli {
    /// Number of full cycles to run.
    #[arg(short = 'n', long = "cycles", value_name = "N", default_value_t = 500)]
    cycles: u32,

    /// Distinct plugin views to rotate through.
    #[arg(short = 'p', long = "plugins", value_name = "N", default_value_t = 8)]
    plugins: u32,

    /// Simulated content load latency in milliseconds.
    #[arg(long = "load-delay", value_name = "MS", default_value_t = 0)]
    load_delay_ms: u64,
}

impl BenchCli {
    fn validate(&self) -> Result<(), String> {
        if !(1..=100_000).contains(&self.cycles) {
            return Err("cycles must be between 1 and 100000".to_string());
        }
        if !(1..=1_000).contains(&self.plugins) {
            return Err("plugins must be between 1 and 1000".to_string());
        }
        Ok(())
    }
}

#[derive(Debug)]
struct OpStats {
    count: u64,
    total: Duration,
    fastest: Duration,
    slowest: Duration,
}

impl Default for OpStats {
    fn default() -> Self {
        Self {
            count: 0,
            total: Duration::ZERO,
            fastest: Duration::MAX,
            slowest: Duration::ZERO,
        }
    }
}

impl OpStats {
    fn record(&mut self, took: Duration) {
        self.count = self.count.saturating_add(1);
        self.total += took;
        self.fastest = self.fastest.min(took);
        self.slowest = self.slowest.max(took);
    }

    fn average_us(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() * 1e6 / self.count as f64
    }
}

#[derive(Debug, Default)]
struct BenchStats {
    ops: BTreeMap<&'static str, OpStats>,
    failures: u64,
}

impl BenchStats {
    async fn time<T, E, F>(&mut self, op: &'static str, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start = Instant::now();
        let result = fut.await;
        let took = start.elapsed();
        match result {
            Ok(v) => {
                self.ops.entry(op).or_default().record(took);
                Some(v)
            }
            Err(err) => {
                eprintln!("{op} failed: {err}");
                self.failures += 1;
                None
            }
        }
    }

    fn report(&self, cli: &BenchCli, wall: Duration, engine: &Engine) -> String {
        let mut rows = String::new();
        for (op, s) in &self.ops {
            rows.push_str(&format!(
                "  {op:<10} {:>8} ops  avg {:>9.1}us  best {:>9.1}us  worst {:>9.1}us\n",
                s.count,
                s.average_us(),
                s.fastest.as_secs_f64() * 1e6,
                s.slowest.as_secs_f64() * 1e6,
            ));
        }
        let stats = engine.statistics();
        formatdoc! {"
            == Surface Bench ==
            cycles {cycles} | plugins {plugins} | wall {wall:.2}s | failures {failures}
            {rows}
            left over: {views} views, {detached} detached windows, {mem:.0} MB tracked
            ",
            cycles = cli.cycles,
            plugins = cli.plugins,
            wall = wall.as_secs_f64(),
            failures = self.failures,
            views = stats.views,
            detached = stats.detached_windows,
            mem = stats.lifecycle.total_memory_mb,
        }
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = BenchCli::parse();
    cli.validate()
        .map_err(|msg| io::Error::new(io::ErrorKind::InvalidInput, msg))?;

    let backend = Arc::new(HeadlessBackend::new());
    backend.set_load_delay(Duration::from_millis(cli.load_delay_ms));
    let mut config = EngineConfig::default();
    config.lifecycle.auto_sweep = false;
    let engine = Engine::new(backend, config);
    engine.start();
    engine.create_main_window().await.map_err(io::Error::other)?;

    let mut stats = BenchStats::default();
    let wall = Instant::now();
    for cycle in 0..cli.cycles {
        let name = format!("bench-{}", cycle % cli.plugins);
        let request = ShowViewRequest::plugin(
            format!("/plugins/{name}"),
            ContentSource::Url(format!("app://plugins/{name}")),
        )
        .persistent();
        let Some(id) = stats.time("show", engine.show_view(request)).await else {
            continue;
        };
        let Some(window) = stats
            .time("detach", engine.detach_view(&id, DetachOptions::default()))
            .await
        else {
            continue;
        };
        stats.time("reattach", engine.reattach_view(window)).await;
        stats.time("close", engine.close_view(&id)).await;
    }
    let wall = wall.elapsed();
    stats.time("sweep", async { Ok::<_, String>(engine.cleanup_background_views()) }).await;

    println!("{}", stats.report(&cli, wall, &engine));
    engine.shutdown().await;
    Ok(())
}
