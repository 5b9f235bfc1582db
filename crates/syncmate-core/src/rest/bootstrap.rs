//! Three-way fan-in for the startup fetches.
//!
//! Each readiness edge starts a new [`Bootstrap`] generation with three
//! independent slots (version, configuration, system info). Slots are filled
//! exactly once, in any order, either with a value or with the reason it
//! could not be obtained. The bootstrap is complete when no slot is pending,
//! whether or not every fetch succeeded.

use std::fmt;

use serde_json::Value;
use tracing::warn;

use super::ApiError;
use super::types::SystemInfo;

/// One of the three startup fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    Version,
    Config,
    SystemInfo,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BootstrapStep::Version => "version",
            BootstrapStep::Config => "config",
            BootstrapStep::SystemInfo => "system info",
        })
    }
}

/// State of a single fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    Pending,
    Ready(T),
    Failed(String),
}

impl<T> Slot<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending)
    }

    fn failure(&self) -> Option<&str> {
        match self {
            Slot::Failed(reason) => Some(reason.as_str()),
            _ => None,
        }
    }

    fn into_ready(self) -> Option<T> {
        match self {
            Slot::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Outcome of a finished bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub generation: u64,
    /// Steps that did not produce a value, with the reason.
    pub failed: Vec<(BootstrapStep, String)>,
}

impl BootstrapReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Values gathered by a finished bootstrap; `None` where the fetch failed.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapResults {
    pub version: Option<String>,
    pub config: Option<Value>,
    pub system: Option<SystemInfo>,
}

/// The three startup slots of one readiness edge.
#[derive(Debug)]
pub struct Bootstrap {
    generation: u64,
    version: Slot<String>,
    config: Slot<Value>,
    system: Slot<SystemInfo>,
}

impl Bootstrap {
    pub const STEPS: usize = 3;

    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            version: Slot::Pending,
            config: Slot::Pending,
            system: Slot::Pending,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn record_version(&mut self, outcome: Result<String, ApiError>) {
        fill(&mut self.version, BootstrapStep::Version, outcome);
    }

    pub fn record_config(&mut self, outcome: Result<Value, ApiError>) {
        fill(&mut self.config, BootstrapStep::Config, outcome);
    }

    pub fn record_system(&mut self, outcome: Result<SystemInfo, ApiError>) {
        fill(&mut self.system, BootstrapStep::SystemInfo, outcome);
    }

    /// Number of fetches still outstanding.
    pub fn remaining(&self) -> usize {
        [
            self.version.is_pending(),
            self.config.is_pending(),
            self.system.is_pending(),
        ]
        .into_iter()
        .filter(|pending| *pending)
        .count()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    pub fn report(&self) -> BootstrapReport {
        let failed = [
            (BootstrapStep::Version, self.version.failure()),
            (BootstrapStep::Config, self.config.failure()),
            (BootstrapStep::SystemInfo, self.system.failure()),
        ]
        .into_iter()
        .filter_map(|(step, reason)| reason.map(|r| (step, r.to_string())))
        .collect();

        BootstrapReport {
            generation: self.generation,
            failed,
        }
    }

    pub fn into_results(self) -> BootstrapResults {
        BootstrapResults {
            version: self.version.into_ready(),
            config: self.config.into_ready(),
            system: self.system.into_ready(),
        }
    }
}

fn fill<T>(slot: &mut Slot<T>, step: BootstrapStep, outcome: Result<T, ApiError>) {
    if !slot.is_pending() {
        warn!(%step, "Duplicate bootstrap completion ignored");
        return;
    }
    *slot = match outcome {
        Ok(value) => Slot::Ready(value),
        Err(e) => {
            warn!(%step, error = %e, "Bootstrap fetch failed");
            Slot::Failed(e.to_string())
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn system(id: &str) -> SystemInfo {
        SystemInfo {
            alloc: 1,
            cpu_percent: 0.0,
            ext_announce_ok: false,
            goroutines: 1,
            my_id: id.to_string(),
            sys: 1,
        }
    }

    #[test]
    fn test_completes_after_three_in_any_order() {
        let mut b = Bootstrap::new(1);
        assert_eq!(b.remaining(), Bootstrap::STEPS);

        b.record_system(Ok(system("X")));
        assert!(!b.is_complete());
        b.record_config(Ok(json!({})));
        assert_eq!(b.remaining(), 1);
        b.record_version(Ok("v1".to_string()));
        assert!(b.is_complete());
        assert!(b.report().is_success());

        let results = b.into_results();
        assert_eq!(results.version.as_deref(), Some("v1"));
        assert_eq!(results.system.map(|s| s.my_id).as_deref(), Some("X"));
    }

    #[test]
    fn test_failures_count_toward_completion() {
        let mut b = Bootstrap::new(7);
        b.record_version(Ok("v1".to_string()));
        b.record_config(Err(ApiError::Parse {
            what: "configuration",
            message: "eof".to_string(),
        }));
        b.record_system(Ok(system("X")));

        assert!(b.is_complete());
        let report = b.report();
        assert_eq!(report.generation, 7);
        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, BootstrapStep::Config);
        assert_eq!(b.into_results().config, None);
    }

    #[test]
    fn test_duplicate_completion_does_not_overcount() {
        let mut b = Bootstrap::new(1);
        b.record_version(Ok("v1".to_string()));
        b.record_version(Ok("v2".to_string()));
        assert_eq!(b.remaining(), 2);
        assert_eq!(b.into_results().version.as_deref(), Some("v1"));
    }
}
