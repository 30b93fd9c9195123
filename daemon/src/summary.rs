/// Human-readable playtime reports.
use clap::ValueEnum;
use std::fmt;

use crate::ledger::Ledger;

/// Name of the synthetic trailing entry in a summary.
pub const TOTAL_LABEL: &str = "---------\nTotal";

/// Formats a second count as `"{h}h {m}m {s}s"`.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours}h {minutes}m {secs}s")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLine {
    pub name: String,
    pub duration: String,
}

impl fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.duration)
    }
}

/// Games ranked by total playtime, longest first, followed by a total line.
pub fn build_summary(ledger: &Ledger) -> Vec<SummaryLine> {
    let mut games: Vec<_> = ledger.games.iter().collect();
    games.sort_by(|(a_id, a), (b_id, b)| {
        b.playtime_seconds
            .cmp(&a.playtime_seconds)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a_id.cmp(b_id))
    });

    let mut lines: Vec<SummaryLine> = games
        .into_iter()
        .map(|(_, game)| SummaryLine {
            name: game.name.clone(),
            duration: format_duration(game.playtime_seconds),
        })
        .collect();

    lines.push(SummaryLine {
        name: TOTAL_LABEL.to_string(),
        duration: format_duration(ledger.total_seconds()),
    });
    lines
}

/// Joins summary lines into the text handed to a delivery sink.
pub fn render_summary(lines: &[SummaryLine]) -> String {
    lines
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Where a rendered summary should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SummaryMode {
    /// Posted as a regular chat message.
    #[default]
    Message,
    /// Copied to the clipboard.
    Clipboard,
    /// Shown as a local-only bot message.
    Clyde,
}

/// External destinations for summary text.
pub trait SummarySink {
    fn send_message(&self, text: &str);
    fn copy_to_clipboard(&self, text: &str);
    fn send_bot_message(&self, text: &str);
}

pub fn deliver_summary(mode: SummaryMode, text: &str, sink: &dyn SummarySink) {
    match mode {
        SummaryMode::Message => sink.send_message(text),
        SummaryMode::Clipboard => sink.copy_to_clipboard(text),
        SummaryMode::Clyde => sink.send_bot_message(text),
    }
}
