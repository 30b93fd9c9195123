use std::collections::BTreeMap;
use std::sync::Arc;
use sysinfo::{ProcessesToUpdate, System};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::config::{ApplicationConfig, Config};
use crate::event::DaemonEvent;
use crate::lifecycle::{diff_running, LifecycleEvent, ProcessDescriptor};

/// A running OS process as seen by one scan.
#[derive(Debug, Clone)]
pub struct RunningProcess {
    pub name: String,
    /// Seconds since the Unix epoch; 0 when the OS does not report it.
    pub start_time_secs: u64,
}

/// Maps a process list onto the configured games. Matching is
/// case-insensitive on the executable name; the configured spelling becomes
/// the id. When several instances of one game run, the earliest known start
/// wins; a game none of whose instances report a start time gets no hint.
pub fn match_applications(
    applications: &[ApplicationConfig],
    processes: &[RunningProcess],
) -> BTreeMap<String, ProcessDescriptor> {
    let mut running = BTreeMap::new();
    for app in applications {
        let target = app.executable_name.to_lowercase();
        let mut instances = processes
            .iter()
            .filter(|p| p.name.to_lowercase() == target)
            .peekable();
        if instances.peek().is_none() {
            continue;
        }
        let earliest = instances
            .map(|p| p.start_time_secs)
            .filter(|&secs| secs > 0)
            .min();

        let mut descriptor = ProcessDescriptor::new(&app.executable_name, &app.display_name);
        if let Some(start_secs) = earliest {
            let start_ms = i64::try_from(start_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
            descriptor = descriptor.with_start_hint(start_ms);
        }
        running.insert(app.executable_name.clone(), descriptor);
    }
    running
}

/// Drops start hints from `added` processes that were already running at
/// the previous scan (`previous_scan_ms`). Such a process only shows up as
/// new because the configuration changed; its OS start time would re-count
/// time that was already recorded, so the tracker uses the current time.
/// On the first scan (`None`) every hint is kept.
pub fn discard_stale_start_hints(change: &mut LifecycleEvent, previous_scan_ms: Option<i64>) {
    let Some(previous_scan_ms) = previous_scan_ms else {
        return;
    };
    for process in &mut change.added {
        if process.start_hint.is_some_and(|start| start < previous_scan_ms) {
            debug!(id = %process.id, "Ignoring start time from before the previous scan");
            process.start_hint = None;
        }
    }
}

/// Handle to the polling task. Stopping is idempotent.
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Signals the polling task to stop and waits for it to finish.
    pub async fn stop(&mut self) {
        self.stop_tx.send_replace(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// Spawns a task that scans the OS process list every
/// `poll_interval_secs` and emits a [`DaemonEvent::Lifecycle`] batch whenever
/// the set of running configured games changes.
///
/// Games that are already running on the first scan are reported as added,
/// with their OS start time as the start hint. Later scans only pass on start
/// times that fall after the scan before them.
pub fn start(config: Arc<RwLock<Config>>, tx: mpsc::Sender<DaemonEvent>) -> MonitorHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(run(config, tx, stop_rx));
    MonitorHandle {
        stop_tx,
        handle: Some(handle),
    }
}

async fn run(
    config: Arc<RwLock<Config>>,
    tx: mpsc::Sender<DaemonEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut sys = System::new();
    let mut previous: BTreeMap<String, ProcessDescriptor> = BTreeMap::new();
    let mut previous_scan_ms: Option<i64> = None;

    loop {
        let scan_ms = chrono::Utc::now().timestamp_millis();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let processes: Vec<RunningProcess> = sys
            .processes()
            .values()
            .map(|p| RunningProcess {
                name: p.name().to_string_lossy().into_owned(),
                start_time_secs: p.start_time(),
            })
            .collect();

        let (current, interval) = {
            let config = config.read().await;
            (
                match_applications(&config.applications, &processes),
                config.global.effective_poll_interval(),
            )
        };

        let mut change = diff_running(&previous, &current);
        discard_stale_start_hints(&mut change, previous_scan_ms);
        previous_scan_ms = Some(scan_ms);
        if !change.is_empty() {
            for p in &change.added {
                info!(id = %p.id, "Detected");
            }
            for p in &change.removed {
                info!(id = %p.id, "Exited");
            }
            if tx.send(DaemonEvent::Lifecycle(change)).await.is_err() {
                break;
            }
        }
        previous = current;

        tokio::select! {
            _ = sleep(Duration::from_secs(interval)) => {}
            _ = stop_rx.changed() => break,
        }
        if *stop_rx.borrow() {
            break;
        }
    }
    debug!("Process monitor stopped");
}
