use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink, ProgressSinkKind};
use crate::error::ShelfError;

const EVENTS_MAX: usize = 8;
const LOGS_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Operational,
    Logs,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Prepare,
    Fetch,
    Store,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Prepare => "Prepare",
            Phase::Fetch => "Fetch",
            Phase::Store => "Store",
        }
    }
}

#[derive(Debug)]
struct AppState {
    status: String,
    phase: Phase,
    latency_ms: Option<u128>,
    step_ms: Option<u128>,
    completed: usize,
    total: usize,
    failures: usize,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    view: View,
    started: Instant,
    active: bool,
}

/// Progress view for one long-running operation. The operation runs on a
/// background thread and reports through a [`ProgressSink`]; this thread
/// only renders the shared state.
pub struct Tui {
    kind: ProgressSinkKind,
    state: Arc<Mutex<AppState>>,
    log_scroll: u16,
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some(elapsed) = event.elapsed {
                if message.starts_with("remote.response") {
                    state.latency_ms = Some(elapsed.as_millis());
                } else {
                    state.step_ms = Some(elapsed.as_millis());
                }
            }
            if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = phase;
                state.status = payload.to_string();
            } else if let Some((completed, total)) = parse_bulk_progress(&message) {
                state.completed = completed;
                state.total = total;
                state.phase = Phase::Fetch;
            } else {
                if message.starts_with("failed:") {
                    state.failures = state.failures.saturating_add(1);
                }
                state.status = message.clone();
            }

            push_bounded(&mut state.events, message.clone(), EVENTS_MAX);
            let stamp = chrono::Local::now().format("%H:%M:%S");
            push_bounded(&mut state.logs, format!("[{stamp}] {message}"), LOGS_MAX);
        }
    }
}

impl Tui {
    pub fn new(kind: ProgressSinkKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(AppState {
                status: "ready".to_string(),
                phase: Phase::Resolve,
                latency_ms: None,
                step_ms: None,
                completed: 0,
                total: 0,
                failures: 0,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                view: View::Operational,
                started: Instant::now(),
                active: false,
            })),
            log_scroll: 0,
        }
    }

    /// Runs `f` on a worker thread while rendering its progress. Leaving the
    /// view with `q` does not cancel the operation; it is still awaited.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, ShelfError> + Send + 'static,
        R: Send + 'static,
    {
        self.set_active(true);

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || {
            let sink: &dyn ProgressSink = &sink;
            tx.send(f(sink))
        });

        let mut tick = 0usize;
        let outcome = loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self, &state, tick))
                    .into_diagnostic()?;
            }

            if let Some(result) = poll_result(&rx) {
                break Some(result);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key) {
                        break None;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        };

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;

        let result = match outcome {
            Some(result) => result,
            None => {
                eprintln!("waiting for the running operation to finish...");
                rx.recv()
                    .map_err(|_| miette::Report::msg("operation thread exited unexpectedly"))?
            }
        };
        handle.join().ok();
        self.set_active(false);
        result.map_err(miette::Report::new)
    }

    pub fn confirm(&mut self, title: &str, lines: &[String]) -> miette::Result<bool> {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;

        let confirmed = loop {
            terminal
                .draw(|frame| {
                    let block = Block::default().borders(Borders::ALL).title(title.to_string());
                    let mut text: Vec<Line> =
                        lines.iter().map(|line| Line::from(line.clone())).collect();
                    text.push(Line::from(""));
                    text.push(Line::from("Press y to confirm, n to cancel."));
                    let view = Paragraph::new(text)
                        .alignment(Alignment::Center)
                        .block(block)
                        .wrap(Wrap { trim: true });
                    frame.render_widget(view, frame.area());
                })
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(100)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    match key.code {
                        KeyCode::Char('y') | KeyCode::Char('Y') => break true,
                        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => break false,
                        _ => {}
                    }
                }
            }
        };

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        Ok(confirmed)
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::F(1) => self.set_view(View::Help),
            KeyCode::F(4) => self.set_view(View::Logs),
            KeyCode::Esc => self.set_view(View::Operational),
            KeyCode::Up => self.log_scroll = self.log_scroll.saturating_sub(1),
            KeyCode::Down => self.log_scroll = self.log_scroll.saturating_add(1),
            _ => {}
        }
        false
    }

    fn set_view(&self, view: View) {
        if let Ok(mut state) = self.state.lock() {
            state.view = view;
        }
    }

    fn set_active(&self, active: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.active = active;
            if active {
                state.started = Instant::now();
            }
        }
    }
}

fn draw_ui(frame: &mut ratatui::Frame, tui: &Tui, state: &AppState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(state, tui.kind, tick), chunks[0]);
    match state.view {
        View::Operational => frame.render_widget(draw_status_panel(state), chunks[1]),
        View::Logs => frame.render_widget(draw_logs_view(state, tui.log_scroll), chunks[1]),
        View::Help => frame.render_widget(draw_help(), chunks[1]),
    }
    let footer = Paragraph::new(Line::from(Span::styled(
        "q leave view (keeps waiting)   F1 help   F4 logs   Esc back",
        Style::default().fg(Color::Gray),
    )))
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[2]);
}

fn draw_header(state: &AppState, kind: ProgressSinkKind, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let op_label = match kind {
        ProgressSinkKind::Fetch => "Fetch",
        ProgressSinkKind::Bulk => "Bulk",
        ProgressSinkKind::Album => "Album",
    };
    let elapsed = state.started.elapsed().as_secs();
    let header_line = Line::from(vec![
        Span::styled(
            "COMIC-SHELF",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Op: "),
        Span::styled(op_label, Style::default().fg(Color::Cyan)),
        Span::raw(format!("   Elapsed: {}m{:02}s   ", elapsed / 60, elapsed % 60)),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    Paragraph::new(vec![header_line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status_panel(state: &AppState) -> Paragraph<'static> {
    let phase_color = if state.active {
        Color::Cyan
    } else {
        Color::Green
    };
    let millis = |value: Option<u128>| {
        value
            .map(|v| format!("{v} ms"))
            .unwrap_or_else(|| "--".to_string())
    };
    let mut lines = vec![
        Line::from(Span::styled(
            "STATUS / PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:<8}", state.phase.label()),
                Style::default().fg(phase_color),
            ),
            Span::styled("Latency: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{:<10}", millis(state.latency_ms))),
            Span::styled("Step: ", Style::default().fg(Color::Gray)),
            Span::raw(millis(state.step_ms)),
        ]),
    ];
    if state.total > 0 {
        let percent = (state.completed * 100 / state.total) as u8;
        lines.push(Line::from(vec![
            Span::styled("Completed: ", Style::default().fg(Color::Gray)),
            Span::raw(progress_bar(percent)),
            Span::raw(format!(" {}/{}", state.completed, state.total)),
            Span::styled(
                format!("   Failed: {}", state.failures),
                Style::default().fg(if state.failures > 0 {
                    Color::Red
                } else {
                    Color::Gray
                }),
            ),
        ]));
    }
    lines.push(Line::from(vec![
        Span::styled("Status: ", Style::default().fg(Color::Gray)),
        Span::raw(state.status.clone()),
    ]));
    lines.push(Line::from(Span::styled(
        "Recent events:",
        Style::default().fg(Color::Gray),
    )));
    for event in state.events.iter().rev() {
        let color = if event.starts_with("failed:") {
            Color::Red
        } else {
            Color::White
        };
        lines.push(Line::from(Span::styled(
            format!("- {event}"),
            Style::default().fg(color),
        )));
    }

    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_logs_view(state: &AppState, scroll: u16) -> Paragraph<'static> {
    let lines: Vec<Line> = state
        .logs
        .iter()
        .map(|line| Line::from(line.clone()))
        .collect();
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Logs"))
        .scroll((scroll, 0))
}

fn draw_help() -> Paragraph<'static> {
    let lines = vec![
        Line::from("The operation keeps running in the background."),
        Line::from("q      leave this view; the process waits for completion"),
        Line::from("F4     full event log, Up/Down to scroll"),
        Line::from("Esc    back to progress"),
    ];
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .wrap(Wrap { trim: true })
}

fn progress_bar(percent: u8) -> String {
    let filled = (percent as usize * 20) / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(20 - filled))
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let (head, rest) = message.split_once(';')?;
    let phase = match head.strip_prefix("phase=")? {
        "Resolve" => Phase::Resolve,
        "Prepare" => Phase::Prepare,
        "Fetch" => Phase::Fetch,
        "Store" => Phase::Store,
        _ => return None,
    };
    Some((phase, rest.trim()))
}

fn parse_bulk_progress(message: &str) -> Option<(usize, usize)> {
    let rest = message.strip_prefix("bulk.progress ")?;
    let mut completed = None;
    let mut total = None;
    for part in rest.split_whitespace() {
        if let Some(value) = part.strip_prefix("completed=") {
            completed = value.parse().ok();
        } else if let Some(value) = part.strip_prefix("total=") {
            total = value.parse().ok();
        }
    }
    Some((completed?, total?))
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}

/// Non-blocking check for the operation's result. A sender dropped without a
/// result means the operation thread died.
fn poll_result<R>(rx: &mpsc::Receiver<Result<R, ShelfError>>) -> Option<Result<R, ShelfError>> {
    match rx.try_recv() {
        Ok(result) => Some(result),
        Err(TryRecvError::Disconnected) => Some(Err(ShelfError::Worker(
            "operation thread exited unexpectedly".to_string(),
        ))),
        Err(TryRecvError::Empty) => None,
    }
}
