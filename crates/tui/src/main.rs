//! convertd dashboard TUI
//!
//! Terminal interface for watching conversion jobs and system load.
//! Connects to the daemon status endpoint at http://127.0.0.1:7879/status;
//! `c` requests cancellation of the selected job.

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, Wrap},
    text::Line,
    Frame, Terminal,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    io::{self, Stdout},
    time::{Duration, Instant},
};

const STATUS_URL: &str = "http://127.0.0.1:7879/status";
const CANCEL_URL: &str = "http://127.0.0.1:7879/cancel";
const POLL_INTERVAL_MS: u64 = 500;
const MAX_EVENT_LOG_ENTRIES: usize = 100;

// ============================================================================
// Data Models (mirroring daemon status types)
// ============================================================================

/// Public per-job view served by the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobView {
    pub id: String,
    pub source: String,
    pub profile: String,
    pub state: String,
    pub percentage_complete: f32,
    pub eta: String,
    pub current_action: String,
    pub error_msg: String,
    pub cancelled: bool,
}

/// System-level metrics for resource monitoring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub mem_usage_percent: f32,
    pub load_avg_1: f32,
    pub load_avg_5: f32,
    pub load_avg_15: f32,
}

/// Complete status snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StatusSnapshot {
    pub timestamp_unix_ms: i64,
    pub jobs: Vec<JobView>,
    pub system: SystemMetrics,
    pub queue_len: usize,
    pub running_jobs: usize,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub cancelled_jobs: u64,
}

// ============================================================================
// App State
// ============================================================================

/// Main application state for the dashboard
pub struct App {
    /// Current snapshot from the daemon
    pub snapshot: Option<StatusSnapshot>,
    /// Selected row in the jobs table
    pub selected: usize,
    /// Event log with recent happenings
    pub event_log: VecDeque<String>,
    /// Connection status
    pub connected: bool,
    /// HTTP client for polling
    client: reqwest::Client,
}

impl App {
    pub fn new() -> Self {
        Self {
            snapshot: None,
            selected: 0,
            event_log: VecDeque::with_capacity(MAX_EVENT_LOG_ENTRIES),
            connected: false,
            client: reqwest::Client::new(),
        }
    }

    /// Add an event to the log
    pub fn log_event(&mut self, event: String) {
        if self.event_log.len() >= MAX_EVENT_LOG_ENTRIES {
            self.event_log.pop_front();
        }
        self.event_log.push_back(event);
    }

    /// Fetch the status snapshot from the daemon
    pub async fn fetch_status(&mut self) {
        match self.client.get(STATUS_URL).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    match response.json::<StatusSnapshot>().await {
                        Ok(snapshot) => {
                            self.clamp_selection(snapshot.jobs.len());
                            self.snapshot = Some(snapshot);
                            self.connected = true;
                        }
                        Err(e) => {
                            self.log_event(format!("JSON parse error: {}", e));
                            self.connected = false;
                        }
                    }
                } else {
                    self.log_event(format!("HTTP error: {}", response.status()));
                    self.connected = false;
                }
            }
            Err(e) => {
                if self.connected {
                    self.log_event(format!("Connection lost: {}", e));
                }
                self.connected = false;
            }
        }
    }

    /// Request cancellation of the selected job
    pub async fn cancel_selected(&mut self) {
        let Some(job) = self
            .snapshot
            .as_ref()
            .and_then(|s| s.jobs.get(self.selected))
            .cloned()
        else {
            return;
        };

        let url = format!("{}/{}", CANCEL_URL, job.id);
        match self.client.post(&url).send().await {
            Ok(response) if response.status().is_success() => {
                self.log_event(format!("Cancel requested for {}", job.source));
            }
            Ok(response) => {
                self.log_event(format!("Cancel rejected: {}", response.status()));
            }
            Err(e) => {
                self.log_event(format!("Cancel failed: {}", e));
            }
        }
    }

    pub fn select_next(&mut self) {
        let count = self.snapshot.as_ref().map(|s| s.jobs.len()).unwrap_or(0);
        if count > 0 && self.selected + 1 < count {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    fn clamp_selection(&mut self, job_count: usize) {
        if job_count == 0 {
            self.selected = 0;
        } else if self.selected >= job_count {
            self.selected = job_count - 1;
        }
    }
}

// ============================================================================
// Terminal Setup/Teardown
// ============================================================================

/// Initialize the terminal for TUI rendering
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restore terminal to normal state
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

// ============================================================================
// Widget Rendering
// ============================================================================

/// Shorten a path to its file name for the table
fn short_source(source: &str) -> String {
    source
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source)
        .to_string()
}

/// Render the jobs table
fn render_jobs_table(f: &mut Frame, area: Rect, app: &App) {
    let header_cells = ["Source", "Profile", "State", "Progress", "ETA", "Action"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows: Vec<Row> = if let Some(ref snapshot) = app.snapshot {
        snapshot
            .jobs
            .iter()
            .enumerate()
            .map(|(i, job)| {
                let state_color = match job.state.as_str() {
                    "converting" => Color::Cyan,
                    "completed" => Color::Green,
                    "failed" => Color::Red,
                    "cancelled" => Color::Magenta,
                    _ => Color::Gray,
                };
                let style = if i == app.selected {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                Row::new(vec![
                    Cell::from(short_source(&job.source)),
                    Cell::from(job.profile.clone()),
                    Cell::from(job.state.clone()).style(Style::default().fg(state_color)),
                    Cell::from(format!("{:.1}%", job.percentage_complete)),
                    Cell::from(if job.eta.is_empty() {
                        "-".to_string()
                    } else {
                        job.eta.clone()
                    }),
                    Cell::from(job.current_action.clone()),
                ])
                .style(style)
            })
            .collect()
    } else {
        vec![]
    };

    let widths = [
        Constraint::Min(20),
        Constraint::Length(12),
        Constraint::Length(11),
        Constraint::Length(9),
        Constraint::Length(10),
        Constraint::Min(20),
    ];

    let title = if app.connected {
        " Conversions "
    } else {
        " Conversions (Disconnected) "
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title));

    f.render_widget(table, area);
}

/// Render progress gauge for the selected job
fn render_selected_progress(f: &mut Frame, area: Rect, app: &App) {
    let (ratio, label) = app
        .snapshot
        .as_ref()
        .and_then(|s| s.jobs.get(app.selected))
        .map(|job| {
            (
                (job.percentage_complete as f64 / 100.0).clamp(0.0, 1.0),
                format!("{:.1}% {}", job.percentage_complete, job.current_action),
            )
        })
        .unwrap_or((0.0, "no job selected".to_string()));

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Selected Job "))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio)
        .label(label);

    f.render_widget(gauge, area);
}

/// Render CPU and memory usage gauges
fn render_system_gauges(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(area);

    let (cpu_percent, mem_percent) = if let Some(ref snapshot) = app.snapshot {
        (
            snapshot.system.cpu_usage_percent as f64 / 100.0,
            snapshot.system.mem_usage_percent as f64 / 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    let cpu_gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" CPU "))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(cpu_percent.clamp(0.0, 1.0))
        .label(format!("{:.1}%", cpu_percent * 100.0));

    let mem_gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Memory "))
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio(mem_percent.clamp(0.0, 1.0))
        .label(format!("{:.1}%", mem_percent * 100.0));

    f.render_widget(cpu_gauge, chunks[0]);
    f.render_widget(mem_gauge, chunks[1]);
}

/// Render load averages table
fn render_load_averages(f: &mut Frame, area: Rect, app: &App) {
    let (load_1, load_5, load_15) = if let Some(ref snapshot) = app.snapshot {
        (
            snapshot.system.load_avg_1,
            snapshot.system.load_avg_5,
            snapshot.system.load_avg_15,
        )
    } else {
        (0.0, 0.0, 0.0)
    };

    let rows = vec![
        Row::new(vec![
            Cell::from("1 min"),
            Cell::from(format!("{:.2}", load_1)),
        ]),
        Row::new(vec![
            Cell::from("5 min"),
            Cell::from(format!("{:.2}", load_5)),
        ]),
        Row::new(vec![
            Cell::from("15 min"),
            Cell::from(format!("{:.2}", load_15)),
        ]),
    ];

    let widths = [Constraint::Length(8), Constraint::Length(10)];

    let table =
        Table::new(rows, widths).block(Block::default().borders(Borders::ALL).title(" Load Avg "));

    f.render_widget(table, area);
}

/// Render event log showing recent happenings
fn render_event_log(f: &mut Frame, area: Rect, app: &App) {
    let events: Vec<Line> = app
        .event_log
        .iter()
        .rev()
        .take((area.height as usize).saturating_sub(2))
        .map(|e| Line::from(e.as_str()))
        .collect();

    let paragraph = Paragraph::new(events)
        .block(Block::default().borders(Borders::ALL).title(" Event Log "))
        .wrap(Wrap { trim: true });

    f.render_widget(paragraph, area);
}

/// Render status bar with aggregate stats
fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let status = if let Some(ref snapshot) = app.snapshot {
        format!(
            " Queue: {} | Running: {} | Completed: {} | Failed: {} | Cancelled: {} | 'c' cancel, 'q' quit ",
            snapshot.queue_len,
            snapshot.running_jobs,
            snapshot.completed_jobs,
            snapshot.failed_jobs,
            snapshot.cancelled_jobs,
        )
    } else {
        " Connecting to daemon... | 'q' quit ".to_string()
    };

    let paragraph =
        Paragraph::new(status).style(Style::default().fg(Color::White).bg(Color::DarkGray));

    f.render_widget(paragraph, area);
}

// ============================================================================
// Main UI Layout
// ============================================================================

/// Render the complete UI layout
fn ui(f: &mut Frame, app: &App) {
    let size = f.area();

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(size);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(main_chunks[0]);

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(content_chunks[0]);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),
            Constraint::Length(5),
            Constraint::Min(0),
        ])
        .split(content_chunks[1]);

    render_jobs_table(f, left_chunks[0], app);
    render_selected_progress(f, left_chunks[1], app);
    render_event_log(f, left_chunks[2], app);
    render_system_gauges(f, right_chunks[0], app);
    render_load_averages(f, right_chunks[1], app);
    render_status_bar(f, main_chunks[1], app);
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> io::Result<()> {
    let mut terminal = setup_terminal()?;

    let mut app = App::new();
    app.log_event("convertd dashboard started".to_string());

    let result = run_app(&mut terminal, &mut app).await;

    restore_terminal(&mut terminal)?;

    result
}

/// Main application loop
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
) -> io::Result<()> {
    let poll_interval = Duration::from_millis(POLL_INTERVAL_MS);
    let mut last_fetch = Instant::now() - poll_interval; // Fetch immediately on start

    loop {
        if last_fetch.elapsed() >= poll_interval {
            app.fetch_status().await;
            last_fetch = Instant::now();
        }

        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                            return Ok(());
                        }
                        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
                        KeyCode::Up | KeyCode::Char('k') => app.select_previous(),
                        KeyCode::Char('c') | KeyCode::Char('C') => {
                            app.cancel_selected().await;
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}
