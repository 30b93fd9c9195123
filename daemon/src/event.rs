use crate::config::Config;
use crate::lifecycle::LifecycleEvent;

pub enum DaemonEvent {
    /// Watched processes started and/or stopped since the last scan.
    Lifecycle(LifecycleEvent),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the daemon should flush state and exit.
    Shutdown,
}
