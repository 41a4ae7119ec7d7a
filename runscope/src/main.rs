//! runscope - live viewer for agent execution traces
//!
//! Terminal UI that subscribes to a trace server over WebSocket and shows
//! runs, their message/tool call tree and overlapping sections as they
//! stream in.

mod app;
mod ui;

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use runscope_core::replay::Recorder;
use runscope_core::{Config, ConnectionEvent, ConnectionManager, Location, Preferences, RunId};
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};

use crate::app::App;

/// Events taken off the connection channel per loop iteration.
const MAX_EVENTS_PER_TICK: usize = 512;

#[derive(Parser)]
#[command(name = "runscope")]
#[command(about = "Live viewer for agent execution traces")]
#[command(version)]
struct Args {
    /// Trace server WebSocket URL; a `#<run id>` fragment opens that run
    #[arg(short, long)]
    url: Option<String>,

    /// Run to open on start (overrides the URL fragment)
    #[arg(short, long)]
    run: Option<RunId>,

    /// Follow whichever run last received an update (remembered)
    #[arg(short, long)]
    follow: bool,

    /// Append every applied frame to `<DIR>/<run id>.jsonl`
    #[arg(long, value_name = "DIR")]
    record: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;
    if let Some(url) = &args.url {
        config.connection.url = url.clone();
    }
    if let Some(dir) = &args.record {
        config.recording.directory = Some(dir.clone());
    }
    config.validate().context("invalid configuration")?;

    // Initialize logging (to file, not stdout since we have a TUI)
    let _log_guard =
        runscope_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("runscope starting up");

    let location: Location = config
        .connection
        .url
        .parse()
        .context("invalid connection url")?;

    let preferences_path = Config::preferences_path();
    let mut preferences = Preferences::load(&preferences_path);

    // A deep link wins over the remembered run and suspends follow mode for
    // this start; `--follow` turns it on regardless and is remembered.
    let deep_link = args.run.or(location.run_id);
    let restored = match deep_link {
        None if config.viewer.restore_last_run => preferences.last_run_for(&location.endpoint()),
        _ => None,
    };
    if args.follow {
        preferences.follow_new_runs = true;
        preferences.save_or_warn(&preferences_path);
    }
    let follow = args.follow || (deep_link.is_none() && preferences.follow_new_runs);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("runscope-conn")
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let manager =
        ConnectionManager::new(&config.connection).context("failed to set up connection")?;
    tracing::info!(url = %manager.url(), "Connecting");
    let (connection, events) = manager.spawn(runtime.handle());

    let mut app = App::new(
        Box::new(connection.clone()),
        location,
        config.viewer.debounce(),
    )
    .with_preferences(preferences, preferences_path);
    app.state.set_follow(follow);
    if let Some(dir) = &config.recording.directory {
        tracing::info!(dir = %dir.display(), "Recording frames");
        app = app.with_recorder(Recorder::new(dir));
    }
    if let Some(run_id) = deep_link.or(restored) {
        app.open_run(run_id);
    }

    // Setup terminal
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;

    // Run the main loop
    let result = run_app(&mut terminal, &mut app, events);

    // Restore terminal
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;

    connection.shutdown();
    runtime.shutdown_timeout(Duration::from_millis(200));
    tracing::info!("runscope shutting down");

    result?;
    if let Some(reason) = app.exit_reason {
        anyhow::bail!(reason);
    }
    Ok(())
}

/// Run the main application loop.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut events: UnboundedReceiver<ConnectionEvent>,
) -> Result<()> {
    loop {
        // Apply whatever the connection delivered since the last pass
        for _ in 0..MAX_EVENTS_PER_TICK {
            match events.try_recv() {
                Ok(event) => app.handle_connection_event(event, Instant::now()),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        app.tick(Instant::now());

        // Render
        terminal.draw(|frame| ui::render(frame, app))?;

        // Handle input, waking up in time for a pending selection
        if event::poll(app.poll_timeout(Instant::now()))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }

        // Check if we should quit
        if app.should_quit {
            break;
        }
    }

    Ok(())
}
