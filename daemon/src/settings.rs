/// Read and delete access to the ledger for the settings view.
use tracing::info;

use crate::ledger::{self, SharedLedger};
use crate::summary::format_duration;

pub const EMPTY_TITLE: &str = "No games found";
pub const EMPTY_NOTE: &str = "Go play some!";

/// One row in the settings list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRow {
    pub id: String,
    pub name: String,
    /// Formatted total playtime.
    pub note: String,
}

/// Rows for every tracked game, most recently played first.
pub fn game_rows(ledger: &SharedLedger) -> Vec<GameRow> {
    let store = ledger::lock(ledger);
    store
        .ledger()
        .by_recent()
        .into_iter()
        .map(|(id, game)| GameRow {
            id: id.to_string(),
            name: game.name.clone(),
            note: format_duration(game.playtime_seconds),
        })
        .collect()
}

/// Deletes a tracked game. Takes the same lock as the session tracker, so a
/// delete never lands in the middle of a merge.
pub fn delete_game(ledger: &SharedLedger, id: &str) -> bool {
    let removed = ledger::lock(ledger).delete(id);
    if removed {
        info!(id, "Deleted tracked game");
    }
    removed
}
