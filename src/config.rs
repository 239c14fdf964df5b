//! Configuration types for the scheduler.

use serde::{Deserialize, Serialize};

/// Scheduler tunables.
///
/// Embed this in the host application's configuration; the scheduler does
/// no config file I/O of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks. Precision, not correctness: a task
    /// due at time T runs on the first tick at or after T.
    pub tick_interval_secs: u64,
    /// Max run-history entries kept in memory.
    pub history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            history_limit: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_interval_secs, 5);
        assert_eq!(config.history_limit, 200);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"tick_interval_secs": 1}"#).expect("parse");
        assert_eq!(config.tick_interval_secs, 1);
        assert_eq!(config.history_limit, 200);
    }
}
