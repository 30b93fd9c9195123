/// Startup resolution of optional host capabilities.
///
/// Each capability resolves to [`Resolution::Found`] or [`Resolution::Missing`].
/// Missing capabilities never abort startup; they are collected and reported
/// together so the daemon can run with reduced functionality.
use tracing::{error, warn};

#[derive(Debug)]
pub enum Resolution<T> {
    Found(T),
    Missing { reason: String },
}

impl<T> Resolution<T> {
    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(handle) => Resolution::Found(handle),
            Err(e) => Resolution::Missing {
                reason: e.to_string(),
            },
        }
    }

    pub fn from_option(option: Option<T>, reason: &str) -> Self {
        match option {
            Some(handle) => Resolution::Found(handle),
            None => Resolution::Missing {
                reason: reason.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCapability {
    pub name: &'static str,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct StartupDiagnostics {
    missing: Vec<MissingCapability>,
}

impl StartupDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unwraps a resolution, recording it under `name` when missing.
    pub fn check<T>(&mut self, name: &'static str, resolution: Resolution<T>) -> Option<T> {
        match resolution {
            Resolution::Found(handle) => Some(handle),
            Resolution::Missing { reason } => {
                self.missing.push(MissingCapability { name, reason });
                None
            }
        }
    }

    pub fn missing(&self) -> &[MissingCapability] {
        &self.missing
    }

    pub fn is_degraded(&self) -> bool {
        !self.missing.is_empty()
    }

    /// Logs every missing capability, then one line summarizing the lot.
    pub fn report(&self) {
        if self.missing.is_empty() {
            return;
        }
        for m in &self.missing {
            error!(capability = m.name, "{} not found: {}", m.name, m.reason);
        }
        let names: Vec<_> = self.missing.iter().map(|m| m.name).collect();
        warn!(
            "Starting with reduced functionality, missing: {}",
            names.join(", ")
        );
    }
}
