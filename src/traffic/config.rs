use anyhow::bail;
use serde::Deserialize;

use super::patterns::AddressPattern;
use crate::sim::config::Config;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficConfig {
    /// Accesses issued by each client.
    pub accesses: u64,
    /// Accesses a client may have outstanding at once.
    pub max_inflight: usize,
    pub issue_per_cycle: usize,
    /// Fraction of accesses that are writes.
    pub write_ratio: f64,
    pub pattern: AddressPattern,
    pub stride: u64,
    pub base_addr: u64,
    /// Size of the address window every client walks.
    pub range_bytes: u64,
    pub seed: u64,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            accesses: 1000,
            max_inflight: 16,
            issue_per_cycle: 1,
            write_ratio: 0.2,
            pattern: AddressPattern::Sequential,
            stride: 64,
            base_addr: 0,
            range_bytes: 1 << 20,
            seed: 1,
        }
    }
}

impl TrafficConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.write_ratio) {
            bail!("write_ratio must be within [0, 1], got {}", self.write_ratio);
        }
        if self.max_inflight == 0 {
            bail!("invalid value for 'max_inflight'");
        }
        if self.issue_per_cycle == 0 {
            bail!("invalid value for 'issue_per_cycle'");
        }
        if self.range_bytes < 4 {
            bail!("address range must cover at least one word");
        }
        Ok(())
    }
}
