//! Time-series chart drawing for live sessions and recorded logs.

use anyhow::{bail, Context, Result};
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};
use ratatui::{
    backend::{Backend, CrosstermBackend, TestBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame, Terminal,
};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::config::BUILD_NAME;
use crate::recorder::read_log;
use crate::sampler::timestamp_to_datetime;
use crate::window::Window;

pub const CHART_TITLE: &str = "Ping Over Time";
pub const X_AXIS_TITLE: &str = "Timestamps";
pub const Y_AXIS_TITLE: &str = "Return Time (in milliseconds)";

/// Size of the text image written by file mode.
pub const IMAGE_WIDTH: u16 = 120;
pub const IMAGE_HEIGHT: u16 = 40;

/// How a session presents its chart. Picked once at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderMode {
    /// Redraw the sliding window every `refresh` while probing.
    Live { refresh: Duration },
    /// Draw a recorded log once, to the terminal or to `image_path`.
    File {
        csv_path: PathBuf,
        image_path: Option<PathBuf>,
    },
}

/// `"PingStats | <args>"`, used as the terminal window title.
pub fn window_title<S: AsRef<str>>(args: &[S]) -> Result<String> {
    let joined = args.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ");
    if joined.contains('\0') {
        bail!("window title must not contain null bytes");
    }
    Ok(format!("{BUILD_NAME} | {joined}"))
}

fn bounds(values: impl Iterator<Item = f64>) -> Option<[f64; 2]> {
    values.fold(None, |acc, v| match acc {
        None => Some([v, v]),
        Some([lo, hi]) => Some([lo.min(v), hi.max(v)]),
    })
}

fn time_label(timestamp: f64) -> String {
    timestamp_to_datetime(timestamp)
        .map(|dt| dt.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Draws the latency series into `area`, with an optional status line under it.
pub fn draw_chart(frame: &mut Frame, area: Rect, points: &[(f64, f64)], footer: Option<&str>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);

    let [x_min, x_max] = match bounds(points.iter().map(|(x, _)| *x)) {
        Some([lo, hi]) if hi > lo => [lo, hi],
        Some([lo, _]) => [lo - 1.0, lo + 1.0],
        None => [0.0, 1.0],
    };
    let [y_min, y_max] = match bounds(points.iter().map(|(_, y)| *y)) {
        Some([lo, hi]) => [lo.min(0.0), (hi * 1.1).max(1.0)],
        None => [0.0, 1.0],
    };

    let x_labels = vec![
        Span::raw(time_label(x_min)),
        Span::raw(time_label((x_min + x_max) / 2.0)),
        Span::raw(time_label(x_max)),
    ];
    let y_labels = vec![
        Span::raw(format!("{y_min:.0}")),
        Span::raw(format!("{:.0}", (y_min + y_max) / 2.0)),
        Span::raw(format!("{y_max:.0}")),
    ];

    let datasets = vec![Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Red))
        .data(points)];

    let chart = Chart::new(datasets)
        .block(Block::default().title(CHART_TITLE).borders(Borders::ALL))
        .x_axis(
            Axis::default()
                .title(X_AXIS_TITLE)
                .bounds([x_min, x_max])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .title(Y_AXIS_TITLE)
                .bounds([y_min, y_max])
                .labels(y_labels),
        );
    frame.render_widget(chart, chunks[0]);

    if let Some(footer) = footer {
        frame.render_widget(Paragraph::new(footer.to_string()), chunks[1]);
    }
}

/// Renders the series off-screen and returns the buffer as plain text lines.
pub fn render_to_text(points: &[(f64, f64)], width: u16, height: u16) -> Result<String> {
    let mut terminal = Terminal::new(TestBackend::new(width, height))?;
    terminal.draw(|frame| {
        let area = frame.size();
        draw_chart(frame, area, points, None)
    })?;
    Ok(buffer_text(terminal.backend()))
}

pub fn buffer_text(backend: &TestBackend) -> String {
    let buffer = backend.buffer();
    let mut out = String::new();
    for y in 0..buffer.area.height {
        let mut line = String::new();
        for x in 0..buffer.area.width {
            line.push_str(buffer.get(x, y).symbol());
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Switches the terminal into raw alternate-screen mode and restores it on drop.
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter(title: &str) -> Result<Self> {
        enable_raw_mode().context("failed to enable raw terminal mode")?;
        let guard = Self;
        execute!(io::stdout(), EnterAlternateScreen, SetTitle(title))
            .context("failed to enter alternate screen")?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

fn is_close_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Drains pending terminal input without blocking; true once the operator asked to close.
pub fn close_requested() -> Result<bool> {
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()? {
            if is_close_key(&key) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Draws the live sliding window on each refresh.
pub struct LiveRenderer<B: Backend> {
    terminal: Terminal<B>,
    refresh: Duration,
}

impl<B: Backend> LiveRenderer<B> {
    pub fn new(backend: B, refresh: Duration) -> Result<Self> {
        if refresh.is_zero() {
            bail!("refresh interval must be greater than zero");
        }
        let terminal = Terminal::new(backend).context("failed to set up terminal")?;
        Ok(Self { terminal, refresh })
    }

    pub fn refresh(&self) -> Duration {
        self.refresh
    }

    pub fn draw(&mut self, window: &Window, footer: &str) -> Result<()> {
        let points = window.points();
        self.terminal
            .draw(|frame| {
                let area = frame.size();
                draw_chart(frame, area, &points, Some(footer))
            })
            .context("failed to draw chart")?;
        Ok(())
    }

    pub fn backend(&self) -> &B {
        self.terminal.backend()
    }
}

/// A recorded log loaded in full, ready to draw once.
#[derive(Debug, Clone)]
pub struct FilePlot {
    source: PathBuf,
    points: Vec<(f64, f64)>,
    image_path: Option<PathBuf>,
}

impl FilePlot {
    pub async fn load(csv_path: impl AsRef<Path>, image_path: Option<PathBuf>) -> Result<Self> {
        let source = csv_path.as_ref().to_path_buf();
        let points = read_log(&source).await?;
        tracing::info!(source = %source.display(), rows = points.len(), "log loaded");
        Ok(Self {
            source,
            points,
            image_path,
        })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Saves to the image path when one was given, otherwise shows the chart until a key
    /// closes it.
    pub async fn present(&self, title: &str) -> Result<()> {
        match &self.image_path {
            Some(path) => self.save(path).await,
            None => self.show(title),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let text = render_to_text(&self.points, IMAGE_WIDTH, IMAGE_HEIGHT)?;
        tokio::fs::write(path, text)
            .await
            .with_context(|| format!("failed to write chart to {}", path.display()))?;
        tracing::info!(source = %self.source.display(), image = %path.display(), "chart saved");
        Ok(())
    }

    fn show(&self, title: &str) -> Result<()> {
        let _guard = TerminalGuard::enter(title)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        loop {
            terminal.draw(|frame| {
                let area = frame.size();
                draw_chart(frame, area, &self.points, None)
            })?;
            match event::read()? {
                Event::Key(key) if is_close_key(&key) => break,
                _ => {}
            }
        }
        Ok(())
    }
}
