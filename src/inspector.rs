//! Terminal view of the engine: windows with their views, statistics,
//! recent events and the log tail.

use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph, Wrap};

use crate::engine::{Engine, Statistics};
use crate::events::EngineEvent;
use crate::log_buffer::LogHandle;
use crate::view::{CompositeState, ViewInfo};
use crate::window::{Placement, WindowKind, WindowSummary};

pub const HELP: &str =
    "p plugin  s settings  c close  d detach  r reattach  x close detached  +/- resize  g sweep  q quit";

const MAX_EVENTS: usize = 50;

/// Rolling list of formatted engine events.
#[derive(Debug, Default)]
pub struct EventFeed {
    lines: VecDeque<String>,
}

impl EventFeed {
    pub fn push(&mut self, event: &EngineEvent) {
        let subject = event
            .meta()
            .map(|m| m.subject_id.clone())
            .unwrap_or_default();
        self.lines
            .push_back(format!("{:<10} {subject}", event.name()));
        while self.lines.len() > MAX_EVENTS {
            self.lines.pop_front();
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }
}

#[derive(Debug, Clone)]
pub struct WindowRow {
    pub summary: WindowSummary,
    pub composite: Option<CompositeState>,
    pub views: Vec<ViewInfo>,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub windows: Vec<WindowRow>,
    pub stats: Statistics,
    pub events: Vec<String>,
    pub log: Vec<String>,
}

impl Snapshot {
    pub fn capture(engine: &Engine, feed: &EventFeed, log: Option<&LogHandle>) -> Self {
        let views = engine.views();
        let windows = engine
            .windows()
            .windows()
            .into_iter()
            .map(|summary| WindowRow {
                composite: views.composite_state(summary.id),
                views: views
                    .window_views(summary.id)
                    .iter()
                    .filter_map(|id| views.view_info(id))
                    .collect(),
                summary,
            })
            .collect();
        Self {
            windows,
            stats: engine.statistics(),
            events: feed.lines().cloned().collect(),
            log: log.map(|h| h.tail(200)).unwrap_or_default(),
        }
    }
}

pub fn render(frame: &mut Frame, snapshot: &Snapshot) {
    let [body, footer] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());
    let [left, right] =
        Layout::horizontal([Constraint::Percentage(55), Constraint::Percentage(45)]).areas(body);
    let [stats_area, events_area, log_area] = Layout::vertical([
        Constraint::Length(8),
        Constraint::Percentage(40),
        Constraint::Fill(1),
    ])
    .areas(right);

    render_windows(frame, left, snapshot);
    render_stats(frame, stats_area, &snapshot.stats);
    render_tail(frame, events_area, " Events ", &snapshot.events);
    render_tail(frame, log_area, " Log ", &snapshot.log);
    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        footer,
    );
}

fn render_windows(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let mut lines = Vec::new();
    for row in &snapshot.windows {
        let w = &row.summary;
        let kind = match w.kind {
            WindowKind::Main => "main",
            WindowKind::Detached => "detached",
        };
        let placement = match w.placement {
            Placement::Visible => "",
            Placement::Parked => " (parked)",
        };
        let mut header = vec![
            Span::styled(
                format!("{} {kind} ", w.id),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("\"{}\"{placement}", w.title)),
        ];
        if let Some(b) = w.bounds {
            header.push(Span::styled(
                format!("  {}x{}", b.width, b.height),
                Style::default().fg(Color::DarkGray),
            ));
        }
        if let Some(CompositeState::PrimaryWithOverlay) = row.composite {
            header.push(Span::styled(" +overlay", Style::default().fg(Color::Yellow)));
        }
        lines.push(Line::from(header));
        for v in &row.views {
            let marker = if v.active { "*" } else if v.visible { "+" } else { " " };
            let style = if v.active {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            lines.push(Line::styled(
                format!(
                    "  {marker} {:<28} {:<12} {},{} {}x{}",
                    v.id.as_str(),
                    v.category.label(),
                    v.bounds.x,
                    v.bounds.y,
                    v.bounds.width,
                    v.bounds.height
                ),
                style,
            ));
        }
    }
    if lines.is_empty() {
        lines.push(Line::styled("no windows", Style::default().fg(Color::DarkGray)));
    }
    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().title(" Windows ")),
        area,
    );
}

fn render_stats(frame: &mut Frame, area: Rect, stats: &Statistics) {
    let lines = vec![
        Line::from(format!(
            "windows  main {}  detached {}",
            stats.main_windows, stats.detached_windows
        )),
        Line::from(format!(
            "views    {} ({} active, {} paused)",
            stats.views, stats.lifecycle.active, stats.lifecycle.paused
        )),
        Line::from(format!(
            "memory   {:.0} / {:.0} MB",
            stats.lifecycle.total_memory_mb, stats.memory_threshold_mb
        )),
        Line::from(format!(
            "detached {}",
            stats
                .detach
                .detached_views
                .iter()
                .map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )),
    ];
    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().title(" Stats ")),
        area,
    );
}

fn render_tail(frame: &mut Frame, area: Rect, title: &str, lines: &[String]) {
    let visible = area.height.saturating_sub(2) as usize;
    let skip = lines.len().saturating_sub(visible);
    let text: Vec<Line> = lines.iter().skip(skip).map(|l| Line::raw(l.as_str())).collect();
    frame.render_widget(
        Paragraph::new(text)
            .wrap(Wrap { trim: false })
            .block(Block::bordered().title(title)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContentSource, HeadlessBackend};
    use crate::config::EngineConfig;
    use crate::engine::ShowViewRequest;
    use crate::events::drain;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use std::sync::Arc;

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        buffer
            .content
            .chunks(width)
            .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn renders_windows_views_and_events() {
        let backend = Arc::new(HeadlessBackend::new());
        let engine = Engine::new(backend, EngineConfig::default());
        let mut rx = engine.subscribe();
        engine.create_main_window().await.unwrap();
        engine
            .show_view(ShowViewRequest::plugin(
                "calc",
                ContentSource::Url("app://calc".into()),
            ))
            .await
            .unwrap();

        let mut feed = EventFeed::default();
        for event in drain(&mut rx) {
            feed.push(&event);
        }
        let log = LogHandle::new(10);
        log.push("hello from the log");
        let snapshot = Snapshot::capture(&engine, &feed, Some(&log));
        assert_eq!(snapshot.windows.len(), 1);
        assert_eq!(snapshot.windows[0].views.len(), 2);

        let mut terminal = Terminal::new(TestBackend::new(140, 30)).unwrap();
        terminal.draw(|f| render(f, &snapshot)).unwrap();
        let text = screen_text(&terminal);
        assert!(text.contains("main-view"));
        assert!(text.contains("plugin:calc"));
        assert!(text.contains("+overlay"));
        assert!(text.contains("switched"));
        assert!(text.contains("hello from the log"));
    }

    #[test]
    fn event_feed_is_bounded() {
        let mut feed = EventFeed::default();
        let event = EngineEvent::Focused {
            meta: crate::events::EventMeta::new("v", None),
        };
        for _ in 0..(MAX_EVENTS + 5) {
            feed.push(&event);
        }
        assert_eq!(feed.lines().count(), MAX_EVENTS);
    }
}
