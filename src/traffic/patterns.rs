use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::config::TrafficConfig;
use crate::mem::{AccessKind, Addr};

const WORD_BYTES: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressPattern {
    /// Consecutive words.
    #[default]
    Sequential,
    /// Every `stride` bytes.
    Strided,
    /// Uniformly distributed words.
    Random,
}

impl FromStr for AddressPattern {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sequential" => Ok(Self::Sequential),
            "strided" => Ok(Self::Strided),
            "random" => Ok(Self::Random),
            _ => Err(format!(
                "unsupported address pattern '{}', expected one of: sequential, strided, random",
                value
            )),
        }
    }
}

/// Generates the address and direction of every access of one client.
#[derive(Debug)]
pub struct AccessGen {
    pattern: AddressPattern,
    base: Addr,
    range: u64,
    stride: u64,
    write_ratio: f64,
    step: u64,
    rng: StdRng,
}

impl AccessGen {
    /// Clients share the address window but draw from differently seeded streams.
    pub fn new(config: &TrafficConfig, client: usize) -> Self {
        Self {
            pattern: config.pattern,
            base: config.base_addr,
            range: config.range_bytes,
            stride: config.stride.max(1),
            write_ratio: config.write_ratio,
            step: 0,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(client as u64)),
        }
    }

    pub fn next_access(&mut self) -> (AccessKind, Addr) {
        let offset = match self.pattern {
            AddressPattern::Sequential => self.step.wrapping_mul(WORD_BYTES) % self.range,
            AddressPattern::Strided => self.step.wrapping_mul(self.stride) % self.range,
            AddressPattern::Random => self.rng.gen_range(0..self.range),
        };
        self.step += 1;
        let kind = if self.rng.gen_bool(self.write_ratio) {
            AccessKind::Write
        } else {
            AccessKind::Read
        };
        (kind, self.base.wrapping_add(offset & !(WORD_BYTES - 1)))
    }
}
