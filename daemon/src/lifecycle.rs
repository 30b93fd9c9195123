/// Process lifecycle notifications consumed by the session tracker.
///
/// A [`LifecycleEvent`] is one batch of processes that started (`added`) and/or
/// stopped (`removed`) since the previous notification. The event source is
/// free to batch several changes together; ordering inside each list carries
/// no meaning for the tracker.
use std::collections::BTreeMap;

/// A single process as reported by the event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    /// Stable process identity, e.g. the executable file name.
    pub id: String,
    /// Human-readable name shown in summaries and the settings view.
    pub display_name: String,
    /// Start time in epoch milliseconds, when the source knows it.
    pub start_hint: Option<i64>,
}

impl ProcessDescriptor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            start_hint: None,
        }
    }

    pub fn with_start_hint(mut self, start_ms: i64) -> Self {
        self.start_hint = Some(start_ms);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub added: Vec<ProcessDescriptor>,
    pub removed: Vec<ProcessDescriptor>,
}

impl LifecycleEvent {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compares two snapshots of running processes (keyed by id) and returns the
/// batch that turns `previous` into `current`.
///
/// Removed descriptors carry no start hint: the process is gone and the
/// tracker falls back to the start time it recorded when the process appeared.
pub fn diff_running(
    previous: &BTreeMap<String, ProcessDescriptor>,
    current: &BTreeMap<String, ProcessDescriptor>,
) -> LifecycleEvent {
    let added = current
        .iter()
        .filter(|(id, _)| !previous.contains_key(*id))
        .map(|(_, p)| p.clone())
        .collect();

    let removed = previous
        .iter()
        .filter(|(id, _)| !current.contains_key(*id))
        .map(|(_, p)| ProcessDescriptor {
            start_hint: None,
            ..p.clone()
        })
        .collect();

    LifecycleEvent { added, removed }
}
