use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink, ProgressSinkKind};
use crate::error::BndError;
use crate::fs_util::bytes_to_human;

const EVENTS_MAX: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Rename,
    Validate,
    Plan,
    Transfer,
    Verify,
}

impl Phase {
    const ALL: [Phase; 6] = [
        Phase::Resolve,
        Phase::Rename,
        Phase::Validate,
        Phase::Plan,
        Phase::Transfer,
        Phase::Verify,
    ];

    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Rename => "Rename",
            Phase::Validate => "Validate",
            Phase::Plan => "Plan",
            Phase::Transfer => "Transfer",
            Phase::Verify => "Verify",
        }
    }
}

#[derive(Debug)]
struct ProgressState {
    status: String,
    phase: Phase,
    files_done: usize,
    files_total: usize,
    events: VecDeque<String>,
    started: Instant,
}

pub struct Tui {
    kind: ProgressSinkKind,
    state: Arc<Mutex<ProgressState>>,
}

struct TuiProgress {
    state: Arc<Mutex<ProgressState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            match parse_phase(&message) {
                Some((phase, payload)) => {
                    state.phase = phase;
                    state.status = payload.to_string();
                    if let Some((done, total)) = parse_counter(payload) {
                        state.files_done = done;
                        state.files_total = total;
                    }
                }
                None => state.status = message.clone(),
            }
            let line = match event.elapsed {
                Some(elapsed) => format!("{message} +{:.1}s", elapsed.as_secs_f64()),
                None => message,
            };
            state.events.push_back(line);
            while state.events.len() > EVENTS_MAX {
                state.events.pop_front();
            }
        }
    }
}

impl Tui {
    pub fn new(kind: ProgressSinkKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(ProgressState {
                status: "starting".to_string(),
                phase: Phase::Resolve,
                files_done: 0,
                files_total: 0,
                events: VecDeque::new(),
                started: Instant::now(),
            })),
        }
    }

    /// Runs `f` on a worker thread while drawing its progress. `q` or Esc detaches the
    /// screen; the worker is not interrupted mid-file.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, BndError> + Send + 'static,
        R: Send + 'static,
    {
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
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        let mut detached = false;
        loop {
            if !detached && let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_progress(frame, self.kind, &state, tick))
                    .into_diagnostic()?;
            }

            if let Some(outcome) = poll_worker(&rx) {
                if !detached {
                    restore_terminal()?;
                }
                handle.join().ok();
                return outcome;
            }

            if !detached
                && event::poll(Duration::from_millis(120)).into_diagnostic()?
                && let Event::Key(key) = event::read().into_diagnostic()?
                && key.kind == KeyEventKind::Press
                && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
            {
                restore_terminal()?;
                eprintln!("progress screen closed, waiting for the transfer to finish...");
                detached = true;
            }
            if detached {
                thread::sleep(Duration::from_millis(120));
            }

            tick = tick.wrapping_add(1);
        }
    }

    pub fn confirm(prompt: &str) -> miette::Result<bool> {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;

        let confirmed = loop {
            terminal
                .draw(|frame| {
                    let block = Block::default().borders(Borders::ALL).title("Confirm");
                    let text = Paragraph::new(vec![
                        Line::from(prompt.to_string()),
                        Line::from("Press y to confirm, n to cancel."),
                    ])
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true })
                    .block(block);
                    frame.render_widget(text, frame.area());
                })
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(100)).into_diagnostic()?
                && let Event::Key(key) = event::read().into_diagnostic()?
            {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => break true,
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => break false,
                    _ => {}
                }
            }
        };

        restore_terminal()?;
        Ok(confirmed)
    }
}

/// The worker's result once it is done; a worker that hung up without sending one panicked.
fn poll_worker<R>(rx: &Receiver<Result<R, BndError>>) -> Option<miette::Result<R>> {
    match rx.try_recv() {
        Ok(result) => Some(result.map_err(miette::Report::new)),
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Disconnected) => {
            tracing::error!("transfer worker exited without a result");
            Some(Err(miette::miette!("transfer worker stopped without a result")))
        }
    }
}

fn restore_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout()
        .execute(LeaveAlternateScreen)
        .into_diagnostic()?;
    Ok(())
}

fn draw_progress(frame: &mut ratatui::Frame, kind: ProgressSinkKind, state: &ProgressState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(4),
        ])
        .split(frame.area());

    let hb = if tick % 2 == 0 { "*" } else { " " };
    let op_label = match kind {
        ProgressSinkKind::Upload => "Upload",
        ProgressSinkKind::Download => "Download",
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "BND",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Op: "),
        Span::styled(op_label, Style::default().fg(Color::Cyan)),
        Span::raw(format!(
            "   Elapsed: {}s   ",
            state.started.elapsed().as_secs()
        )),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]))
    .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    let phases: Vec<Span> = Phase::ALL
        .iter()
        .flat_map(|phase| {
            let style = if *phase == state.phase {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            [Span::styled(phase.label(), style), Span::raw("  ")]
        })
        .collect();
    let phase_line = Paragraph::new(vec![
        Line::from(phases),
        Line::from(Span::styled(
            state.status.clone(),
            Style::default().fg(Color::Gray),
        )),
    ]);
    frame.render_widget(phase_line, chunks[1]);

    let ratio = if state.files_total == 0 {
        0.0
    } else {
        state.files_done as f64 / state.files_total as f64
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Files"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.clamp(0.0, 1.0))
        .label(format!("{}/{}", state.files_done, state.files_total));
    frame.render_widget(gauge, chunks[2]);

    let mut lines = vec![Line::from(Span::styled(
        "Recent events:",
        Style::default().fg(Color::Gray),
    ))];
    for event in state.events.iter().rev() {
        lines.push(Line::from(format!("- {event}")));
    }
    lines.push(Line::from(Span::styled(
        "q/Esc: hide this screen",
        Style::default().fg(Color::DarkGray),
    )));
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), chunks[3]);
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (name, payload) = rest.split_once(';')?;
    let phase = Phase::ALL.into_iter().find(|phase| phase.label() == name)?;
    Some((phase, payload.trim()))
}

/// `[3/10] path (1.2 MB)` -> `(3, 10)`
fn parse_counter(payload: &str) -> Option<(usize, usize)> {
    let inner = payload.strip_prefix('[')?.split(']').next()?;
    let (done, total) = inner.split_once('/')?;
    Some((done.parse().ok()?, total.parse().ok()?))
}

/// Summary line printed after the screen closes.
pub fn summary_line(copied: usize, bytes: u64, elapsed: Duration) -> String {
    format!(
        "{copied} file(s), {} in {:.1}s",
        bytes_to_human(bytes),
        elapsed.as_secs_f64()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_and_counters_parse() {
        let (phase, payload) = parse_phase("phase=Transfer; [3/10] ephys/a.bin (1.0 KB)").unwrap();
        assert_eq!(phase, Phase::Transfer);
        assert_eq!(parse_counter(payload), Some((3, 10)));
        assert!(parse_phase("phase=Unknown; x").is_none());
        assert!(parse_counter("validating").is_none());
    }

    #[test]
    fn worker_result_is_picked_up_once_sent() {
        let (tx, rx) = mpsc::channel::<Result<u64, BndError>>();
        assert!(poll_worker(&rx).is_none());
        tx.send(Ok(7)).unwrap();
        assert_eq!(poll_worker(&rx).unwrap().unwrap(), 7);
    }

    #[test]
    fn worker_that_hangs_up_ends_the_wait() {
        let (tx, rx) = mpsc::channel::<Result<u64, BndError>>();
        thread::spawn(move || drop(tx)).join().unwrap();
        let outcome = poll_worker(&rx).unwrap();
        assert!(outcome.unwrap_err().to_string().contains("without a result"));
    }
}
