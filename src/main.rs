mod app;
mod config;
mod discovery;
mod entry;
mod export;
mod filter;
mod input;
mod json_format;
mod pins;
mod search;
mod selection;
mod sources;
mod stream;
mod theme;
mod ui;
mod viewport;

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use app::{AppState, NoticeKind};
use config::{Cli, Config};
use discovery::ContainerInfo;
use sources::LogBackend;
use sources::demo::DemoBackend;
use sources::docker::DockerBackend;
use stream::ControllerEvent;

/// Controller events applied per frame before redrawing
const MAX_EVENTS_PER_FRAME: usize = 512;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Send diagnostics to `path`; the terminal belongs to the UI
fn init_tracing(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    let filter = EnvFilter::try_from_env("LOGDECK_LOG").unwrap_or_else(|_| EnvFilter::new("logdeck=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, warnings) = Config::load(&cli);
    if let Some(path) = &config.log_file {
        init_tracing(path)?;
    }
    for warning in &warnings {
        warn!("{}", warning);
    }

    let backend: Arc<dyn LogBackend> = if cli.demo {
        Arc::new(DemoBackend::new())
    } else {
        Arc::new(DockerBackend::new(config.host.clone(), config.channel_buffer))
    };
    info!(backend = %backend.name(), tail = config.tail, "starting logdeck");

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut state = AppState::new(&config, backend, events_tx);
    state.stream_on_open = cli.follow_stream;
    if let Some(warning) = warnings.first() {
        state.notify(NoticeKind::Error, warning.clone());
    }

    state.load_containers().await;
    let initial = match &cli.container {
        Some(query) => Some(state.find_container(query).unwrap_or_else(|| ContainerInfo {
            id: query.clone(),
            names: vec![query.clone()],
            host: config.host.clone(),
            ..Default::default()
        })),
        None => state.containers.iter().find(|c| c.is_running()).cloned(),
    };
    if let Some(container) = initial {
        state.open_container(container).await;
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal on panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
        original_hook(panic);
    }));

    let result = run_event_loop(&mut terminal, &mut state, &mut events_rx).await;

    // Stop the stream before the runtime goes away
    state.close().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)?;
    info!("logdeck exited");

    result
}

async fn run_event_loop<'a>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState<'a>,
    events_rx: &mut mpsc::UnboundedReceiver<ControllerEvent>,
) -> Result<()> {
    let mut frame_tick = tokio::time::interval(FRAME_INTERVAL);
    frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // Pending input goes first on every pass, whatever woke the loop
        while event::poll(Duration::ZERO)? {
            if let Some(command) = input::handle_event(state, event::read()?) {
                state.dispatch(command).await;
            }
        }
        if state.should_quit {
            break;
        }

        // Debounced search and deferred scrolling before drawing
        state.tick(Instant::now());

        terminal.draw(|frame| {
            ui::draw(frame, state);
        })?;

        tokio::select! {
            _ = frame_tick.tick() => {}

            // Snapshot results and stream entries
            Some(event) = events_rx.recv() => {
                state.handle_controller_event(event);
                apply_pending_events(state, events_rx, MAX_EVENTS_PER_FRAME - 1);
            }
        }
    }

    Ok(())
}

/// Apply up to `limit` queued controller events without waiting. Returns
/// how many were applied.
fn apply_pending_events(
    state: &mut AppState,
    events_rx: &mut mpsc::UnboundedReceiver<ControllerEvent>,
    limit: usize,
) -> usize {
    let mut applied = 0;
    while applied < limit {
        match events_rx.try_recv() {
            Ok(event) => state.handle_controller_event(event),
            Err(_) => break,
        }
        applied += 1;
    }
    applied
}
