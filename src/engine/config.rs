use serde::Deserialize;

use crate::sim::config::Config;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct EngineConfig {
    /// In-flight events before the one-time overload warning.
    pub overload_events: usize,
    /// Events processed by one heap drain at teardown before it is declared non-terminating.
    pub max_finalization_events: u64,
}

impl Config for EngineConfig {}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            overload_events: 10_000,
            max_finalization_events: 10_000_000,
        }
    }
}
