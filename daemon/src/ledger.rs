/// Durable per-game playtime ledger.
///
/// The ledger lives in memory for the lifetime of the process and is written
/// back to the key-value store under [`SETTINGS_KEY`] as
/// `{"games": {"<id>": {"name", "playtimeSeconds", "lastPlayed"}}}`.
///
/// Entries are decoded one by one so a single bad record only costs that
/// record. A document that could not be read in full is moved aside before
/// it is first overwritten.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::persistence::{KeyValueStore, SETTINGS_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedGame {
    /// Display name from the most recent closed session. Records stored
    /// without one load with the id as their name.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub playtime_seconds: u64,
    /// Epoch milliseconds of the most recent session close.
    #[serde(default)]
    pub last_played: i64,
}

impl TrackedGame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            playtime_seconds: 0,
            last_played: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub games: BTreeMap<String, TrackedGame>,
}

impl Ledger {
    pub fn get(&self, id: &str) -> Option<&TrackedGame> {
        self.games.get(id)
    }

    pub fn total_seconds(&self) -> u64 {
        self.games.values().map(|g| g.playtime_seconds).sum()
    }

    /// Entries ordered most-recently-played first. Ties are ordered by id.
    pub fn by_recent(&self) -> Vec<(&str, &TrackedGame)> {
        let mut entries: Vec<_> = self.games.iter().map(|(id, g)| (id.as_str(), g)).collect();
        entries.sort_by(|a, b| b.1.last_played.cmp(&a.1.last_played).then(a.0.cmp(b.0)));
        entries
    }
}

/// Ledger shared between the session tracker and the settings view.
/// Holding the lock serializes merges, saves and deletes.
pub type SharedLedger = Arc<Mutex<LedgerStore>>;

/// Locks a shared ledger, recovering the guard if a previous holder panicked.
pub fn lock(ledger: &SharedLedger) -> MutexGuard<'_, LedgerStore> {
    ledger.lock().unwrap_or_else(|e| e.into_inner())
}

/// Owner of the in-memory ledger and the only path to its durable copy.
pub struct LedgerStore {
    store: Arc<dyn KeyValueStore>,
    ledger: Ledger,
    /// The stored document was not fully understood; move it aside before
    /// the next write replaces it.
    backup_pending: bool,
    /// In-memory changes the store has not accepted yet.
    unsaved: bool,
}

/// What [`read_stored`] found under [`SETTINGS_KEY`].
enum Stored {
    Absent,
    /// `lossy` is set when malformed entries were dropped.
    Decoded { ledger: Ledger, lossy: bool },
    Unreadable,
}

fn read_stored(store: &dyn KeyValueStore) -> Stored {
    match store.load(SETTINGS_KEY) {
        Ok(None) => Stored::Absent,
        Ok(Some(value)) => match decode_ledger(value) {
            Some((ledger, lossy)) => Stored::Decoded { ledger, lossy },
            None => Stored::Unreadable,
        },
        Err(e) => {
            warn!("Stored ledger is unreadable: {e}");
            Stored::Unreadable
        }
    }
}

/// Decodes the `games` table entry by entry. Returns `None` when the
/// document itself has the wrong shape.
fn decode_ledger(value: Value) -> Option<(Ledger, bool)> {
    let Value::Object(mut document) = value else {
        warn!(key = SETTINGS_KEY, "Stored ledger is not a JSON object");
        return None;
    };
    let entries = match document.remove("games") {
        None | Some(Value::Null) => return Some((Ledger::default(), false)),
        Some(Value::Object(entries)) => entries,
        Some(_) => {
            warn!(key = SETTINGS_KEY, "Stored ledger has a malformed games table");
            return None;
        }
    };

    let mut ledger = Ledger::default();
    let mut lossy = false;
    for (id, entry) in entries {
        match serde_json::from_value::<TrackedGame>(entry) {
            Ok(mut game) => {
                if game.name.is_empty() {
                    game.name = id.clone();
                }
                ledger.games.insert(id, game);
            }
            Err(e) => {
                warn!(id = %id, "Dropping malformed ledger entry: {e}");
                lossy = true;
            }
        }
    }
    Some((ledger, lossy))
}

impl LedgerStore {
    /// Reads the persisted ledger; this never fails. An absent document
    /// yields an empty ledger. Malformed entries are dropped, and an
    /// unreadable document yields an empty ledger; in both cases the stored
    /// document is backed up before the first save.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let (ledger, backup_pending) = match read_stored(store.as_ref()) {
            Stored::Absent => (Ledger::default(), false),
            Stored::Decoded { ledger, lossy } => (ledger, lossy),
            Stored::Unreadable => (Ledger::default(), true),
        };
        if backup_pending {
            warn!("Stored ledger was not fully readable; it will be backed up before the next save");
        }
        debug!(games = ledger.games.len(), "Ledger loaded");
        Self {
            store,
            ledger,
            backup_pending,
            unsaved: false,
        }
    }

    /// Replaces the in-memory ledger with the stored one, picking up writes
    /// made by other processes such as the `delete` command. Skipped while
    /// there are unsaved changes. An unreadable document keeps the in-memory
    /// copy.
    pub fn reload(&mut self) {
        if self.unsaved {
            debug!("Ledger has unsaved changes; not reloading");
            return;
        }
        match read_stored(self.store.as_ref()) {
            Stored::Absent => self.ledger = Ledger::default(),
            Stored::Decoded { ledger, lossy } => {
                self.ledger = ledger;
                self.backup_pending |= lossy;
            }
            Stored::Unreadable => self.backup_pending = true,
        }
    }

    pub fn into_shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Writes the whole ledger under [`SETTINGS_KEY`]. Failures are logged,
    /// never returned. Nothing is written while a pending backup cannot be
    /// made.
    pub fn save(&mut self) {
        if self.backup_pending {
            if let Err(e) = self.store.backup(SETTINGS_KEY) {
                error!("Not saving ledger, the unreadable document could not be backed up: {e}");
                return;
            }
            self.backup_pending = false;
        }
        let value = match serde_json::to_value(&self.ledger) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to encode ledger: {e}");
                return;
            }
        };
        match self.store.save(SETTINGS_KEY, &value) {
            Ok(()) => self.unsaved = false,
            Err(e) => warn!("Failed to persist ledger: {e}"),
        }
    }

    /// Adds one closed session to the entry for `id`, creating it if needed.
    pub fn merge_session(&mut self, id: &str, display_name: &str, seconds: u64, closed_at: i64) {
        let game = self
            .ledger
            .games
            .entry(id.to_string())
            .or_insert_with(|| TrackedGame::new(display_name));
        game.name = display_name.to_string();
        game.playtime_seconds = game.playtime_seconds.saturating_add(seconds);
        game.last_played = closed_at;
        self.unsaved = true;
    }

    /// Removes the entry for `id` and persists. Returns whether an entry
    /// was removed; an unknown id is a no-op and nothing is written.
    pub fn delete(&mut self, id: &str) -> bool {
        if self.ledger.games.remove(id).is_none() {
            return false;
        }
        self.unsaved = true;
        self.save();
        true
    }
}
