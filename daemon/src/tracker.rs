use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::ledger::{self, SharedLedger};
use crate::lifecycle::LifecycleEvent;

/// Turns process start/stop notifications into ledger updates.
///
/// Start times of running processes are kept in memory only; a process that
/// was already running before tracking began can still be timed if the event
/// source supplies a start hint when it reports the process.
pub struct SessionTracker {
    /// Process id → start time (epoch ms) of the currently open session.
    open_sessions: HashMap<String, i64>,
    ledger: SharedLedger,
    clock: Arc<dyn Clock>,
}

impl SessionTracker {
    pub fn new(ledger: SharedLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            open_sessions: HashMap::new(),
            ledger,
            clock,
        }
    }

    /// Start time of the open session for `id`, if any.
    pub fn open_session(&self, id: &str) -> Option<i64> {
        self.open_sessions.get(id).copied()
    }

    pub fn open_session_count(&self) -> usize {
        self.open_sessions.len()
    }

    /// Applies one lifecycle batch.
    ///
    /// Every `added` entry opens (or reopens) a session. Every `removed` entry
    /// closes its session and merges the rounded, zero-clamped elapsed seconds
    /// into the ledger. The ledger is persisted once per batch, and only when
    /// the batch contains removals. The stored ledger is re-read first so a
    /// game deleted by another process is not written back.
    pub fn on_lifecycle_change(&mut self, event: &LifecycleEvent) {
        let now = self.clock.now_millis();

        for process in &event.added {
            let start = process.start_hint.unwrap_or(now);
            if self.open_sessions.insert(process.id.clone(), start).is_some() {
                debug!(id = %process.id, "Replacing open session for already-running process");
            }
            info!(id = %process.id, name = %process.display_name, start, "Session opened");
        }

        if event.removed.is_empty() {
            return;
        }

        // Held across every merge and the final save so deletes from the
        // settings view cannot interleave with this batch.
        let mut store = ledger::lock(&self.ledger);
        store.reload();

        for process in &event.removed {
            // Always clear, so a skipped removal leaves no stale session behind.
            let recorded = self.open_sessions.remove(&process.id);
            let Some(start) = process.start_hint.or(recorded) else {
                warn!(
                    id = %process.id,
                    name = %process.display_name,
                    "Game closed but start time is unknown"
                );
                continue;
            };

            let seconds = elapsed_seconds(start, now);
            info!(id = %process.id, name = %process.display_name, seconds, "Session closed");
            store.merge_session(&process.id, &process.display_name, seconds, now);
        }

        store.save();
    }
}

/// Whole seconds between `start` and `now`, rounded half-up. Negative spans
/// (clock skew, start hints in the future) count as zero.
pub fn elapsed_seconds(start_ms: i64, now_ms: i64) -> u64 {
    let elapsed_ms = now_ms.saturating_sub(start_ms).max(0) as u64;
    (elapsed_ms + 500) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::ledger::LedgerStore;
    use crate::lifecycle::ProcessDescriptor;
    use crate::persistence::{KeyValueStore, MemoryStore, StoreError, SETTINGS_KEY};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store that counts writes.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        saves: AtomicUsize,
    }

    impl CountingStore {
        fn saves(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }
    }

    impl KeyValueStore for CountingStore {
        fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.load(key)
        }

        fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(key, value)
        }

        fn backup(&self, key: &str) -> Result<(), StoreError> {
            self.inner.backup(key)
        }
    }

    struct Harness {
        tracker: SessionTracker,
        ledger: SharedLedger,
        store: Arc<CountingStore>,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new(now: i64) -> Self {
            let store = Arc::new(CountingStore::default());
            let clock = Arc::new(ManualClock::at(now));
            let ledger = LedgerStore::load(store.clone()).into_shared();
            let tracker = SessionTracker::new(Arc::clone(&ledger), clock.clone());
            Self {
                tracker,
                ledger,
                store,
                clock,
            }
        }

        fn added(&mut self, processes: Vec<ProcessDescriptor>) {
            self.tracker.on_lifecycle_change(&LifecycleEvent {
                added: processes,
                removed: vec![],
            });
        }

        fn removed(&mut self, processes: Vec<ProcessDescriptor>) {
            self.tracker.on_lifecycle_change(&LifecycleEvent {
                added: vec![],
                removed: processes,
            });
        }

        fn playtime(&self, id: &str) -> Option<u64> {
            ledger::lock(&self.ledger)
                .ledger()
                .get(id)
                .map(|g| g.playtime_seconds)
        }
    }

    fn game(id: &str, name: &str) -> ProcessDescriptor {
        ProcessDescriptor::new(id, name)
    }

    // ── elapsed_seconds ───────────────────────────────────────────────────────

    #[test]
    fn elapsed_rounds_to_nearest_second() {
        assert_eq!(elapsed_seconds(0, 1_499), 1);
        assert_eq!(elapsed_seconds(0, 1_500), 2);
        assert_eq!(elapsed_seconds(0, 499), 0);
        assert_eq!(elapsed_seconds(1_000, 6_000), 5);
    }

    #[test]
    fn elapsed_clamps_negative_to_zero() {
        assert_eq!(elapsed_seconds(10_000, 6_000), 0);
        assert_eq!(elapsed_seconds(i64::MAX, i64::MIN), 0);
    }

    // ── added ─────────────────────────────────────────────────────────────────

    #[test]
    fn added_uses_start_hint_when_present() {
        let mut h = Harness::new(5_000);
        h.added(vec![game("a.exe", "A").with_start_hint(1_000)]);
        assert_eq!(h.tracker.open_session("a.exe"), Some(1_000));
    }

    #[test]
    fn added_without_hint_uses_current_time() {
        let mut h = Harness::new(5_000);
        h.added(vec![game("a.exe", "A")]);
        assert_eq!(h.tracker.open_session("a.exe"), Some(5_000));
    }

    #[test]
    fn duplicate_added_overwrites_open_session() {
        let mut h = Harness::new(5_000);
        h.added(vec![game("a.exe", "A").with_start_hint(1_000)]);
        h.added(vec![game("a.exe", "A").with_start_hint(3_000)]);
        assert_eq!(h.tracker.open_session("a.exe"), Some(3_000));
        assert_eq!(h.tracker.open_session_count(), 1);
    }

    #[test]
    fn added_alone_does_not_persist() {
        let mut h = Harness::new(5_000);
        h.added(vec![game("a.exe", "A"), game("b.exe", "B")]);
        assert_eq!(h.store.saves(), 0);
        assert!(h.store.load(SETTINGS_KEY).unwrap().is_none());
    }

    // ── removed ───────────────────────────────────────────────────────────────

    #[test]
    fn single_session_scenario() {
        let mut h = Harness::new(1_000);
        h.added(vec![game("a.exe", "A").with_start_hint(1_000)]);
        h.clock.set(6_000);
        h.removed(vec![game("a.exe", "A")]);

        let store = ledger::lock(&h.ledger);
        let entry = store.ledger().get("a.exe").unwrap();
        assert_eq!(entry.playtime_seconds, 5);
        assert_eq!(entry.last_played, 6_000);
        assert_eq!(h.tracker.open_session("a.exe"), None);
    }

    #[test]
    fn consecutive_sessions_accumulate_and_keep_latest_name() {
        let mut h = Harness::new(0);
        h.added(vec![game("a.exe", "A")]);
        h.clock.advance(10_000);
        h.removed(vec![game("a.exe", "A")]);

        h.added(vec![game("a.exe", "A: Directors Cut")]);
        h.clock.advance(20_000);
        h.removed(vec![game("a.exe", "A: Directors Cut")]);

        let store = ledger::lock(&h.ledger);
        let entry = store.ledger().get("a.exe").unwrap();
        assert_eq!(entry.playtime_seconds, 30);
        assert_eq!(entry.name, "A: Directors Cut");
        assert_eq!(entry.last_played, 30_000);
    }

    #[test]
    fn removal_hint_takes_precedence_over_open_session() {
        let mut h = Harness::new(0);
        h.added(vec![game("a.exe", "A")]);
        h.clock.set(10_000);
        h.removed(vec![game("a.exe", "A").with_start_hint(8_000)]);
        assert_eq!(h.playtime("a.exe"), Some(2));
    }

    #[test]
    fn removal_hint_works_without_open_session() {
        let mut h = Harness::new(60_000);
        h.removed(vec![game("a.exe", "A").with_start_hint(0)]);
        assert_eq!(h.playtime("a.exe"), Some(60));
    }

    #[test]
    fn future_start_hint_adds_zero() {
        let mut h = Harness::new(6_000);
        h.removed(vec![game("a.exe", "A").with_start_hint(1_000)]);
        h.removed(vec![game("a.exe", "A").with_start_hint(60_000)]);
        assert_eq!(h.playtime("a.exe"), Some(5));

        let store = ledger::lock(&h.ledger);
        assert_eq!(store.ledger().get("a.exe").unwrap().last_played, 6_000);
    }

    #[test]
    fn unknown_start_time_leaves_ledger_unchanged() {
        let mut h = Harness::new(10_000);
        h.removed(vec![game("ghost.exe", "Ghost")]);
        assert_eq!(h.playtime("ghost.exe"), None);
    }

    #[test]
    fn unknown_start_time_does_not_disturb_other_removals() {
        let mut h = Harness::new(0);
        h.added(vec![game("a.exe", "A")]);
        h.clock.set(4_000);
        h.removed(vec![game("ghost.exe", "Ghost"), game("a.exe", "A")]);
        assert_eq!(h.playtime("ghost.exe"), None);
        assert_eq!(h.playtime("a.exe"), Some(4));
    }

    #[test]
    fn removal_clears_open_session() {
        let mut h = Harness::new(0);
        h.added(vec![game("a.exe", "A")]);
        h.removed(vec![game("a.exe", "A")]);
        h.clock.set(50_000);
        // A repeated removal has nothing left to resolve against.
        h.removed(vec![game("a.exe", "A")]);
        assert_eq!(h.playtime("a.exe"), Some(0));
        assert_eq!(h.tracker.open_session_count(), 0);
    }

    #[test]
    fn removals_persist_once_per_batch() {
        let mut h = Harness::new(0);
        h.added(vec![game("a.exe", "A"), game("b.exe", "B"), game("c.exe", "C")]);
        h.clock.set(3_000);
        h.removed(vec![game("a.exe", "A"), game("b.exe", "B"), game("c.exe", "C")]);
        assert_eq!(h.store.saves(), 1);

        let persisted = LedgerStore::load(h.store.clone());
        assert_eq!(persisted.ledger().games.len(), 3);
        assert_eq!(persisted.ledger().get("b.exe").unwrap().playtime_seconds, 3);
    }

    #[test]
    fn batch_with_only_skipped_removals_still_persists_once() {
        let mut h = Harness::new(0);
        h.removed(vec![game("ghost.exe", "Ghost")]);
        assert_eq!(h.store.saves(), 1);
    }

    #[test]
    fn added_and_removed_in_one_batch() {
        let mut h = Harness::new(0);
        h.added(vec![game("a.exe", "A")]);
        h.clock.set(7_000);
        h.tracker.on_lifecycle_change(&LifecycleEvent {
            added: vec![game("b.exe", "B")],
            removed: vec![game("a.exe", "A")],
        });
        assert_eq!(h.playtime("a.exe"), Some(7));
        assert_eq!(h.tracker.open_session("b.exe"), Some(7_000));
        assert_eq!(h.store.saves(), 1);
    }

    #[test]
    fn playtime_equals_sum_of_rounded_sessions() {
        let mut h = Harness::new(0);
        let sessions_ms = [1_400_i64, 2_600, 999, 61_500, 0];
        let mut expected = 0;
        for ms in sessions_ms {
            h.added(vec![game("a.exe", "A")]);
            h.clock.advance(ms);
            h.removed(vec![game("a.exe", "A")]);
            expected += elapsed_seconds(0, ms);
        }
        assert_eq!(expected, 1 + 3 + 1 + 62);
        assert_eq!(h.playtime("a.exe"), Some(expected));
    }

    #[test]
    fn empty_event_is_a_noop() {
        let mut h = Harness::new(0);
        h.tracker.on_lifecycle_change(&LifecycleEvent::default());
        assert_eq!(h.store.saves(), 0);
        assert_eq!(h.tracker.open_session_count(), 0);
    }

    #[test]
    fn merges_on_top_of_previously_persisted_ledger() {
        let store = Arc::new(MemoryStore::new());
        store
            .save(
                SETTINGS_KEY,
                &serde_json::json!({ "games": { "a.exe": { "name": "A", "playtimeSeconds": 100 } } }),
            )
            .unwrap();
        let ledger = LedgerStore::load(store).into_shared();
        let clock = Arc::new(ManualClock::at(0));
        let mut tracker = SessionTracker::new(Arc::clone(&ledger), clock.clone());

        tracker.on_lifecycle_change(&LifecycleEvent {
            added: vec![game("a.exe", "A")],
            removed: vec![],
        });
        clock.set(5_000);
        tracker.on_lifecycle_change(&LifecycleEvent {
            added: vec![],
            removed: vec![game("a.exe", "A")],
        });

        let store = ledger::lock(&ledger);
        assert_eq!(store.ledger().get("a.exe").unwrap().playtime_seconds, 105);
    }

    #[test]
    fn close_does_not_restore_game_deleted_by_another_process() {
        let mut h = Harness::new(0);
        h.added(vec![game("a.exe", "A"), game("b.exe", "B")]);
        h.clock.set(10_000);
        h.removed(vec![game("a.exe", "A")]);
        assert_eq!(h.playtime("a.exe"), Some(10));

        // A separate handle on the same store, as the `delete` command has.
        let mut other = LedgerStore::load(h.store.clone());
        assert!(other.delete("a.exe"));

        h.clock.set(20_000);
        h.removed(vec![game("b.exe", "B")]);

        let persisted = LedgerStore::load(h.store.clone());
        assert!(persisted.ledger().get("a.exe").is_none());
        assert_eq!(persisted.ledger().get("b.exe").unwrap().playtime_seconds, 20);
        assert_eq!(h.playtime("a.exe"), None);
    }

    #[test]
    fn close_keeps_sessions_recorded_alongside_a_malformed_entry() {
        let store = Arc::new(MemoryStore::new());
        store
            .save(
                SETTINGS_KEY,
                &serde_json::json!({ "games": {
                    "a.exe": { "name": "A", "playtimeSeconds": 360000 },
                    "b.exe": { "name": "B", "playtimeSeconds": -1 }
                } }),
            )
            .unwrap();
        let ledger = LedgerStore::load(store.clone()).into_shared();
        let clock = Arc::new(ManualClock::at(0));
        let mut tracker = SessionTracker::new(Arc::clone(&ledger), clock.clone());

        tracker.on_lifecycle_change(&LifecycleEvent {
            added: vec![game("c.exe", "C")],
            removed: vec![],
        });
        clock.set(60_000);
        tracker.on_lifecycle_change(&LifecycleEvent {
            added: vec![],
            removed: vec![game("c.exe", "C")],
        });

        let persisted = LedgerStore::load(store.clone());
        assert_eq!(persisted.ledger().get("a.exe").unwrap().playtime_seconds, 360_000);
        assert_eq!(persisted.ledger().get("c.exe").unwrap().playtime_seconds, 60);
        assert!(store.load("settings.bak").unwrap().is_some());
    }
}
