use std::path::PathBuf;

use anyhow::Context;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::{Table, Value};

use crate::engine::EngineConfig;
use crate::mem::MemConfig;
use crate::traffic::TrafficConfig;

/// A top-level section of the TOML configuration.
pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> anyhow::Result<Self> {
        match section {
            Some(value) => value
                .clone()
                .try_into()
                .context("cannot deserialize config"),
            None => {
                warn!("config section not found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    /// Base cycles after which the run is cut short.
    pub max_cycles: u64,
    /// Client clock in MHz.
    pub client_frequency: u32,
    /// Where to write the JSON report; stdout when unset.
    pub report: Option<PathBuf>,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_cycles: 10_000_000,
            client_frequency: 1000,
            report: None,
        }
    }
}

/// Every section of a configuration file.
#[derive(Debug, Clone, Default)]
pub struct TopConfig {
    pub sim: SimConfig,
    pub engine: EngineConfig,
    pub mem: MemConfig,
    pub traffic: TrafficConfig,
}

impl TopConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let table: Table = toml::from_str(text).context("cannot parse config toml")?;
        Ok(Self {
            sim: SimConfig::from_section(table.get("sim")).context("[sim]")?,
            engine: EngineConfig::from_section(table.get("engine")).context("[engine]")?,
            mem: MemConfig::from_section(table.get("mem")).context("[mem]")?,
            traffic: TrafficConfig::from_section(table.get("traffic")).context("[traffic]")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::AddressPattern;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = TopConfig::parse("[sim]\nmax_cycles = 500\n").unwrap();
        assert_eq!(500, config.sim.max_cycles);
        assert_eq!(1000, config.sim.client_frequency);
        assert_eq!(10_000, config.engine.overload_events);
        assert_eq!(4, config.mem.cache.len() + 1);
    }

    #[test]
    fn sections_are_read_by_name() {
        let text = r#"
            [engine]
            overload_events = 50

            [traffic]
            accesses = 12
            pattern = "random"
            write_ratio = 0.5
        "#;
        let config = TopConfig::parse(text).unwrap();
        assert_eq!(50, config.engine.overload_events);
        assert_eq!(10_000_000, config.engine.max_finalization_events);
        assert_eq!(12, config.traffic.accesses);
        assert_eq!(AddressPattern::Random, config.traffic.pattern);
    }

    #[test]
    fn malformed_section_is_an_error() {
        let err = TopConfig::parse("[sim]\nmax_cycles = \"soon\"\n").unwrap_err();
        assert!(format!("{:#}", err).contains("[sim]"));
    }
}
