use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::runtime::Runtime;

use surface_wm::backend::{ContentSource, HeadlessBackend, SurfaceId};
use surface_wm::command::Command;
use surface_wm::config::EngineConfig;
use surface_wm::engine::{Engine, ShowViewRequest};
use surface_wm::event_loop::{ControlFlow, CrosstermInput, EventLoop};
use surface_wm::events::drain;
use surface_wm::inspector::{self, EventFeed, Snapshot};
use surface_wm::log_buffer::{self, LogHandle};
use surface_wm::tracing_sub;
use surface_wm::view::ViewId;

const RESIZE_STEP: u32 = 40;

#[derive(Parser, Debug)]
#[command(
    name = "surface-wm",
    version = env!("CARGO_PKG_VERSION"),
    about = "Drive the window/view engine on an in-memory backend and inspect its state"
)]
struct Cli {
    /// TOML configuration file. Missing keys take their defaults.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, value_name = "FILTER", default_value = "debug")]
    log_level: String,

    /// Print the effective configuration and exit.
    #[arg(long)]
    dump_config: bool,
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).map_err(io::Error::other)?,
        None => EngineConfig::default(),
    };
    if cli.dump_config {
        let text = toml::to_string_pretty(&config).map_err(io::Error::other)?;
        println!("{text}");
        return Ok(());
    }

    let log = LogHandle::default();
    log_buffer::set_global_log(log.clone());
    log_buffer::install_panic_hook();
    tracing_sub::init(&cli.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let backend = Arc::new(HeadlessBackend::new());
    let engine = {
        let _guard = runtime.enter();
        let engine = Engine::new(backend.clone(), config);
        engine.start();
        engine
    };
    let mut events = engine.subscribe();
    let mut demo = Demo {
        engine,
        backend,
        runtime: &runtime,
        launched: 0,
    };
    demo.run(Command::CreateMainWindow);

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    terminal::enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    let mut feed = EventFeed::default();

    let result = EventLoop::new(CrosstermInput, Duration::from_millis(50)).run(|event| {
        match event {
            None => {
                for e in drain(&mut events) {
                    feed.push(&e);
                }
                let snapshot = Snapshot::capture(&demo.engine, &feed, Some(&log));
                terminal.draw(|frame| inspector::render(frame, &snapshot))?;
                Ok(ControlFlow::Continue)
            }
            Some(Event::Key(key)) if key.kind == KeyEventKind::Press => Ok(demo.handle_key(key)),
            Some(_) => Ok(ControlFlow::Continue),
        }
    });

    runtime.block_on(demo.engine.shutdown());

    terminal::disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        event::DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

struct Demo<'rt> {
    engine: Arc<Engine>,
    backend: Arc<HeadlessBackend>,
    runtime: &'rt Runtime,
    launched: usize,
}

impl Demo<'_> {
    fn run(&self, command: Command) {
        let name = command.name();
        let response = self.runtime.block_on(self.engine.execute(command));
        if !response.success {
            tracing::warn!(command = name, error = ?response.error, "demo command failed");
        }
    }

    fn active_overlay(&self) -> Option<ViewId> {
        let views = self.engine.views();
        let main = self.engine.main_window()?;
        views
            .active_view_id(main)
            .filter(|id| !views.is_primary(id))
    }

    /// Surface that simulated gesture keys are delivered to: the newest
    /// detached view, else the main window's overlay.
    fn gesture_target(&self) -> Option<SurfaceId> {
        let views = self.engine.views();
        let view = self
            .engine
            .detach()
            .detached_windows()
            .last()
            .and_then(|w| self.engine.detach().record(*w))
            .map(|r| r.source_view_id)
            .or_else(|| self.active_overlay())?;
        views.surface_of(&view)
    }

    fn handle_key(&mut self, key: KeyEvent) -> ControlFlow {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return ControlFlow::Quit;
        }
        if key.modifiers.contains(KeyModifiers::ALT) || key.code == KeyCode::Esc {
            if let Some(surface) = self.gesture_target() {
                self.backend.press_key(surface, key);
            }
            return ControlFlow::Continue;
        }
        let command = match key.code {
            KeyCode::Char('q') => return ControlFlow::Quit,
            KeyCode::Char('p') => {
                self.launched += 1;
                let name = format!("demo-{}", self.launched % 3);
                let request = ShowViewRequest::plugin(
                    format!("/plugins/{name}"),
                    ContentSource::Url(format!("app://plugins/{name}/index.html")),
                );
                // Every other plugin survives dismissal.
                let request = if self.launched % 2 == 0 {
                    request.persistent()
                } else {
                    request
                };
                Command::ShowView(request)
            }
            KeyCode::Char('s') => Command::ShowView(
                ShowViewRequest::settings(ContentSource::Url(
                    "app://launcher/settings.html".into(),
                ))
                .persistent(),
            ),
            KeyCode::Char('c') => match self.active_overlay() {
                Some(view_id) => Command::CloseView { view_id },
                None => return ControlFlow::Continue,
            },
            KeyCode::Char('d') => match self.active_overlay() {
                Some(view_id) => Command::DetachView {
                    view_id,
                    options: Default::default(),
                },
                None => return ControlFlow::Continue,
            },
            KeyCode::Char('r') => match self.engine.detach().detached_windows().last() {
                Some(w) => Command::ReattachView {
                    detached_window_id: *w,
                },
                None => return ControlFlow::Continue,
            },
            KeyCode::Char('x') => {
                // What the OS would do when the user clicks the close button.
                if let Some(w) = self.engine.detach().detached_windows().last() {
                    self.backend.close_window(*w);
                }
                return ControlFlow::Continue;
            }
            KeyCode::Char('+') | KeyCode::Char('-') => {
                let Some(bounds) = self
                    .engine
                    .main_window()
                    .and_then(|w| self.engine.windows().bounds(w).ok())
                else {
                    return ControlFlow::Continue;
                };
                let height = if key.code == KeyCode::Char('+') {
                    bounds.height + RESIZE_STEP
                } else {
                    bounds.height.saturating_sub(RESIZE_STEP)
                };
                Command::ResizeWindow { height }
            }
            KeyCode::Char('g') => Command::CleanupBackgroundViews,
            _ => return ControlFlow::Continue,
        };
        self.run(command);
        ControlFlow::Continue
    }
}
