use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use playtime_daemon::capabilities::{Resolution, StartupDiagnostics};
use playtime_daemon::clock::SystemClock;
use playtime_daemon::ledger::{self, LedgerStore, SharedLedger};
use playtime_daemon::persistence::{FileStore, KeyValueStore, MemoryStore};
use playtime_daemon::summary::{self, SummaryMode, SummarySink};
use playtime_daemon::tracker::SessionTracker;
use playtime_daemon::{changelog, config, event, paths, process_monitor, settings, status};

#[derive(Parser)]
#[command(version, about = "Tracks how long each game has been played")]
struct Cli {
    /// Application data directory. Defaults to the platform data directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Watch configured games and record their playtime (default).
    Run,
    /// Print the playtime summary, longest played first.
    Summary {
        #[arg(long, value_enum, default_value_t = SummaryMode::Message)]
        mode: SummaryMode,
    },
    /// List tracked games, most recently played first.
    List,
    /// Forget a tracked game.
    Delete {
        /// Game id (executable name) as shown by `list`.
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("playtime_daemon=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_daemon(cli.data_dir).await,
        Command::Summary { mode } => {
            let ledger = open_ledger(cli.data_dir)?;
            let text = {
                let store = ledger::lock(&ledger);
                summary::render_summary(&summary::build_summary(store.ledger()))
            };
            summary::deliver_summary(mode, &text, &ConsoleSink);
            Ok(())
        }
        Command::List => {
            let ledger = open_ledger(cli.data_dir)?;
            let rows = settings::game_rows(&ledger);
            if rows.is_empty() {
                println!("{}\n  {}", settings::EMPTY_TITLE, settings::EMPTY_NOTE);
            }
            for row in rows {
                println!("{}  ({})\n  {}", row.name, row.id, row.note);
            }
            Ok(())
        }
        Command::Delete { id } => {
            let ledger = open_ledger(cli.data_dir)?;
            if settings::delete_game(&ledger, &id) {
                println!("Deleted {id}");
            } else {
                println!("No tracked game with id '{id}'");
            }
            Ok(())
        }
    }
}

/// Writes summaries to stdout.
struct ConsoleSink;

impl SummarySink for ConsoleSink {
    fn send_message(&self, text: &str) {
        println!("{text}");
    }

    /// Raw text with no trailing newline, for piping into a clipboard tool.
    fn copy_to_clipboard(&self, text: &str) {
        print!("{text}");
    }

    fn send_bot_message(&self, text: &str) {
        for line in text.lines() {
            println!("> {line}");
        }
    }
}

fn resolve_app_dir(data_dir: Option<PathBuf>) -> Resolution<PathBuf> {
    Resolution::from_option(
        data_dir.or_else(paths::default_app_dir),
        "no platform data directory; pass --data-dir",
    )
}

fn open_file_store(app_dir: &Path) -> Resolution<FileStore> {
    Resolution::from_result(FileStore::open(paths::store_dir(app_dir)))
}

/// Opens the durable ledger for one-shot commands, which need real storage.
fn open_ledger(data_dir: Option<PathBuf>) -> Result<SharedLedger> {
    let app_dir = match resolve_app_dir(data_dir) {
        Resolution::Found(dir) => dir,
        Resolution::Missing { reason } => anyhow::bail!("Data directory unavailable: {reason}"),
    };
    let store = FileStore::open(paths::store_dir(&app_dir))
        .with_context(|| format!("Failed to open store in {}", app_dir.display()))?;
    Ok(LedgerStore::load(Arc::new(store)).into_shared())
}

async fn run_daemon(data_dir: Option<PathBuf>) -> Result<()> {
    // ── Capabilities ──────────────────────────────────────────────────────────
    let mut diagnostics = StartupDiagnostics::new();

    let app_dir = diagnostics.check("data directory", resolve_app_dir(data_dir));
    let file_store = app_dir
        .as_deref()
        .and_then(|dir| diagnostics.check("persistent store", open_file_store(dir)));
    let store: Arc<dyn KeyValueStore> = match file_store {
        Some(s) => {
            info!(dir = %s.dir().display(), "Using persistent store");
            Arc::new(s)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let config_path = app_dir.as_deref().map(paths::config_file_path);
    let status_path = app_dir.as_deref().map(paths::status_file_path);

    // ── Configuration ─────────────────────────────────────────────────────────
    let initial_config = match &config_path {
        Some(path) => config::load_or_default(path).unwrap_or_else(|e| {
            warn!("{e:#} (using defaults)");
            config::Config::default()
        }),
        None => config::Config::default(),
    };
    if initial_config.applications.is_empty() {
        warn!("No applications configured; nothing will be tracked");
    }
    let shared_config = Arc::new(RwLock::new(initial_config));

    let (event_tx, mut event_rx) = mpsc::channel::<event::DaemonEvent>(32);

    if let Some(path) = config_path {
        let watcher = diagnostics.check(
            "config watcher",
            Resolution::from_result(config::create_watcher(&path)),
        );
        if let Some((watcher, watch_rx)) = watcher {
            tokio::spawn(config::watch_config(path, watcher, watch_rx, event_tx.clone()));
        }
    }

    let process_listing = diagnostics.check(
        "process listing",
        Resolution::from_option(
            sysinfo::IS_SUPPORTED_SYSTEM.then_some(()),
            "unsupported platform",
        ),
    );

    diagnostics.report();

    // ── Ledger & tracker ──────────────────────────────────────────────────────
    let version = env!("CARGO_PKG_VERSION");
    changelog::show_changelog_if_needed(store.as_ref(), version);

    let ledger = LedgerStore::load(Arc::clone(&store)).into_shared();
    let mut tracker = SessionTracker::new(Arc::clone(&ledger), Arc::new(SystemClock));

    let mut current_status = status::DaemonStatus::new();
    if diagnostics.is_degraded() {
        let names: Vec<_> = diagnostics.missing().iter().map(|m| m.name).collect();
        current_status.error = Some(format!("Missing capabilities: {}", names.join(", ")));
    }
    let publish = |s: &status::DaemonStatus| {
        if let Some(path) = &status_path {
            status::write_status(path, s);
        }
    };
    publish(&current_status);

    // ── Background tasks ──────────────────────────────────────────────────────
    let mut monitor = process_listing
        .map(|_| process_monitor::start(Arc::clone(&shared_config), event_tx.clone()));

    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(event::DaemonEvent::Shutdown).await;
            }
        });
    }

    info!("playtime-daemon v{version} started");

    // ── Event loop ────────────────────────────────────────────────────────────
    // Id → display name of every game with an open session.
    let mut running: BTreeMap<String, String> = BTreeMap::new();

    while let Some(evt) = event_rx.recv().await {
        match evt {
            event::DaemonEvent::Lifecycle(change) => {
                tracker.on_lifecycle_change(&change);

                for p in &change.added {
                    running.insert(p.id.clone(), p.display_name.clone());
                }
                for p in &change.removed {
                    running.remove(&p.id);
                }
                if let Some(last) = change.removed.last() {
                    current_status.last_closed_game = Some(last.display_name.clone());
                    current_status.last_closed_at = Some(chrono::Local::now().to_rfc3339());
                }
                current_status.set_running(running.values().cloned().collect());
                publish(&current_status);
            }

            event::DaemonEvent::ConfigReloaded(new_config) => {
                info!(
                    applications = new_config.applications.len(),
                    "Config reloaded"
                );
                *shared_config.write().await = new_config;
            }

            event::DaemonEvent::Shutdown => {
                info!(
                    open_sessions = tracker.open_session_count(),
                    "Shutting down"
                );
                break;
            }
        }
    }

    if let Some(monitor) = monitor.as_mut() {
        monitor.stop().await;
    }

    current_status.set_running(Vec::new());
    current_status.error = None;
    publish(&current_status);
    Ok(())
}
