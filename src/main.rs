//! dsmon - live resource monitoring for a 389 Directory Server instance.
//!
//! Samples the server process and host through privileged commands on a
//! fixed interval and renders bounded chart windows for CPU, memory, and
//! established connections.

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dsmon::command::ShellRunner;
use dsmon::display::{self, format_kb};
use dsmon::logging::SnapshotLogger;
use dsmon::sampler::{MetricsSampler, Snapshot};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    prelude::CrosstermBackend,
    Terminal,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Live resource monitor for a directory server instance
#[derive(Parser, Debug)]
#[command(name = "dsmon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server instance identifier (the name after "slapd-")
    instance: String,

    /// Sampling interval in seconds
    #[arg(short = 'i', long, default_value = "3")]
    interval: u64,

    /// Run for specified duration (seconds), then exit
    #[arg(short, long)]
    duration: Option<u64>,

    /// Disable TUI and print snapshots to stdout
    #[arg(long)]
    no_tui: bool,

    /// Log all snapshots to a JSON Lines file
    #[arg(short, long)]
    log: Option<PathBuf>,
}

fn run_tui(
    mut rx: watch::Receiver<Snapshot>,
    mut logger: Option<SnapshotLogger>,
    instance: &str,
    duration: Option<Duration>,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let start_time = std::time::Instant::now();

    loop {
        // Check duration limit
        if let Some(dur) = duration {
            if start_time.elapsed() >= dur {
                break;
            }
        }

        // Pick up and log any freshly published snapshot
        if rx.has_changed().unwrap_or(false) {
            let snapshot = rx.borrow_and_update().clone();
            if let Some(ref mut logger) = logger {
                // Suppressed in TUI mode; charts keep rendering regardless
                let _ = logger.log(&snapshot);
            }
        }
        let snapshot = rx.borrow().clone();

        // Draw UI
        terminal.draw(|f| {
            let main_chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Min(10),   // Charts
                    Constraint::Length(1), // Help bar
                ])
                .split(f.area());

            let chart_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Percentage(33),
                    Constraint::Percentage(34),
                    Constraint::Percentage(33),
                ])
                .split(main_chunks[0]);

            display::render_cpu(f, chart_chunks[0], &snapshot);
            display::render_memory(f, chart_chunks[1], &snapshot);
            display::render_connections(f, chart_chunks[2], &snapshot);
            display::render_help_bar(f, main_chunks[1], instance, snapshot.sequence);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && key.code == KeyCode::Char('q') {
                    break;
                }
            }
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    Ok(())
}

async fn run_no_tui(
    mut rx: watch::Receiver<Snapshot>,
    mut logger: Option<SnapshotLogger>,
    duration: Option<Duration>,
) -> Result<()> {
    let deadline = duration.map(|d| tokio::time::Instant::now() + d);

    loop {
        let changed = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(changed) => changed,
                Err(_) => break, // Duration elapsed
            },
            None => rx.changed().await,
        };
        if changed.is_err() {
            break; // Sampler gone
        }

        let snapshot = rx.borrow_and_update().clone();
        print_snapshot(&snapshot);

        if let Some(ref mut logger) = logger {
            if let Err(e) = logger.log(&snapshot) {
                eprintln!("Snapshot log error: {}", e);
            }
        }
    }

    Ok(())
}

fn print_snapshot(s: &Snapshot) {
    println!("\n--- Sample {} ---", s.sequence);
    println!("CPU: {}% (ticks {:?})", s.cpu_percent, s.cpu_ticks);
    println!(
        "Memory: virt {} res {} ({}% of system)",
        format_kb(s.virt_memory_kb),
        format_kb(s.res_memory_kb),
        s.memory_ratio_percent
    );
    println!(
        "Connections: {} (ticks {:?})",
        s.current_connections, s.conn_ticks
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let interval = Duration::from_secs(args.interval.max(1));
    let duration = args.duration.map(Duration::from_secs);

    let logger = match &args.log {
        Some(path) => Some(SnapshotLogger::new(path)?),
        None => None,
    };

    let sampler = MetricsSampler::new(Arc::new(ShellRunner), args.instance.as_str());
    let handle = sampler.start(interval);
    let rx = handle.watch();

    let result = if args.no_tui {
        run_no_tui(rx, logger, duration).await
    } else {
        run_tui(rx, logger, &args.instance, duration)
    };

    handle.stop().await;

    if let Some(ref log_path) = args.log {
        eprintln!("Snapshots logged to: {}", log_path.display());
    }

    result
}
