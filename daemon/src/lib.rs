//! Per-game playtime tracking.
//!
//! Process start/stop notifications flow from an event source into the
//! [`tracker::SessionTracker`], which turns them into elapsed seconds and
//! merges them into the durable [`ledger::Ledger`].

pub mod capabilities;
pub mod changelog;
pub mod clock;
pub mod config;
pub mod event;
pub mod ledger;
pub mod lifecycle;
pub mod paths;
pub mod persistence;
pub mod process_monitor;
pub mod settings;
pub mod status;
pub mod summary;
pub mod tracker;
