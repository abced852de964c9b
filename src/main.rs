#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use eve_l_monitor::backend::{GeometryApplier, WindowEnumerator};
use eve_l_monitor::backend::x11::X11Backend;
use eve_l_monitor::cli::{self, Cli, Commands};
use eve_l_monitor::config::Config;
use eve_l_monitor::error::LayoutError;
use eve_l_monitor::ipc::server::{IpcContext, forward_events, spawn_ipc_listener};
use eve_l_monitor::ipc::{MonitorClient, MonitorMessage, MonitorRequest, MonitorServer};
use eve_l_monitor::layout::compute_layout;
use eve_l_monitor::pipeline::TrackingSession;
use eve_l_monitor::snapshot;
use eve_l_monitor::types::{WindowId, WindowInfo};

/// Events buffered per IPC client before it is considered lagging
const IPC_EVENT_BUFFER: usize = 256;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let env_level = std::env::var("LOG_LEVEL").ok();
    let log_level = cli::resolve_log_level(cli.log_level, env_level.as_deref(), &config.log_level);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    runtime.block_on(run(cli.command, config))
}

async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::List => list(&config),
        Commands::Watch {
            reconcile_secs,
            no_ipc,
        } => watch(config, Duration::from_secs(reconcile_secs.max(1)), no_ipc).await,
        Commands::Layout { pattern, dry_run } => layout(&config, &pattern, dry_run),
        Commands::Snapshot { out } => write_snapshots(&config, &out).await,
        Commands::Monitor => monitor().await,
    }
}

/// Enumerated windows passing the title filter, ordered by title
fn matching_windows(backend: &X11Backend, config: &Config) -> Result<Vec<WindowInfo>> {
    let mut windows: Vec<_> = backend
        .list_windows()?
        .into_iter()
        .filter(|window| config.matches_title(&window.title))
        .collect();
    windows.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
    Ok(windows)
}

fn list(config: &Config) -> Result<()> {
    let backend = X11Backend::connect(None)?;
    for window in matching_windows(&backend, config)? {
        let mut flags = Vec::new();
        if window.active {
            flags.push("active");
        }
        if window.minimized {
            flags.push("minimized");
        }
        println!("{}\t{}\t{}\t{}", window.id, window.geometry, flags.join(","), window.title);
    }
    Ok(())
}

async fn watch(config: Config, reconcile_every: Duration, no_ipc: bool) -> Result<()> {
    let backend = Arc::new(X11Backend::connect(None)?);
    let (session, events) = TrackingSession::start(Arc::clone(&backend), config);
    let session = Arc::new(session);

    let (clients, _) = broadcast::channel(IPC_EVENT_BUFFER);
    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(forward_events(events, clients.clone()));

    let listener = if no_ipc {
        None
    } else {
        let server = MonitorServer::bind()?;
        Some(spawn_ipc_listener(
            server,
            IpcContext {
                session: Arc::clone(&session),
                events: clients.clone(),
                shutdown: shutdown_tx.clone(),
            },
        ))
    };

    let mut ticker = tokio::time::interval(reconcile_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let enumerator = Arc::clone(&backend);
                match tokio::task::spawn_blocking(move || enumerator.list_windows()).await {
                    Ok(Ok(windows)) => {
                        session.reconcile(&windows).await;
                    }
                    Ok(Err(e)) => warn!(error = ?e, "Window enumeration failed"),
                    Err(e) => error!(error = %e, "Window enumeration task failed"),
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Received Ctrl-C, shutting down");
                break;
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown requested via IPC");
                break;
            }
        }
    }

    session.shutdown().await;
    if let Some(listener) = listener {
        // Dropping the server removes the socket file
        listener.abort();
        if let Err(e) = listener.await {
            if e.is_panic() {
                error!(error = %e, "IPC listener task failed");
            }
        }
    }
    if let Err(e) = forwarder.await {
        error!(error = %e, "Event forwarder task failed");
    }
    Ok(())
}

fn layout(config: &Config, pattern: &str, dry_run: bool) -> Result<()> {
    let backend = X11Backend::connect(None)?;
    let windows = matching_windows(&backend, config)?;
    let ids: Vec<WindowId> = windows.iter().map(|window| window.id).collect();
    let screen = backend.screen_rect();
    let pattern = cli::parse_pattern(pattern, &config.layout, screen, ids.len())?;

    let assignment = match compute_layout(&pattern, &ids, screen, config.layout.spacing) {
        Ok(assignment) => assignment,
        Err(LayoutError::Overflow {
            assignment,
            unplaced,
        }) => {
            warn!(unplaced = unplaced.len(), "Not every window fits the layout, leaving extras in place");
            assignment
        }
        Err(e) => return Err(e).context("Failed to compute layout"),
    };

    for (window, rect) in assignment.placements() {
        let title = windows
            .iter()
            .find(|info| info.id == *window)
            .map_or("", |info| info.title.as_str());
        println!("{window}\t{rect}\t{title}");
    }

    if dry_run {
        return Ok(());
    }
    backend.apply(&assignment)?;
    info!(count = assignment.len(), "Layout applied");
    Ok(())
}

async fn write_snapshots(config: &Config, out: &Path) -> Result<()> {
    let backend = X11Backend::connect(None)?;
    let windows = matching_windows(&backend, config)?;
    let written = snapshot::capture_all(&backend, &windows, out, config.capture.timeout()).await?;
    println!("Wrote {} of {} snapshot(s) to {}", written.len(), windows.len(), out.display());
    Ok(())
}

async fn monitor() -> Result<()> {
    let mut client = MonitorClient::connect().await?;
    if let MonitorMessage::Windows(windows) = client.request(MonitorRequest::ListWindows).await? {
        for window in windows {
            println!(
                "{}\t{}ms\t{}\t{}",
                window.id,
                window.interval_ms,
                if window.enabled { "enabled" } else { "disabled" },
                window.title
            );
        }
    }

    loop {
        match client.recv().await {
            Ok(MonitorMessage::Alert(alert)) => println!("ALERT {} {}", alert.window, alert.level),
            Ok(MonitorMessage::CaptureFailed {
                window,
                reason,
                consecutive_failures,
            }) => println!("FAILED {window} after {consecutive_failures} attempt(s): {reason}"),
            Ok(MonitorMessage::FrameAvailable { window, sequence }) => println!("FRAME {window} #{sequence}"),
            Ok(other) => println!("{other:?}"),
            Err(e) => {
                info!(error = %e, "Daemon connection closed");
                return Ok(());
            }
        }
    }
}
