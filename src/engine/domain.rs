use anyhow::bail;

use super::Time;
use crate::timeq::Cycle;

pub type DomainId = usize;

/// Highest accepted domain frequency in MHz (a 1 ps cycle).
pub const MAX_FREQUENCY: u32 = 1_000_000;

/// Picoseconds per microsecond; a domain of `f` MHz has a `PS_PER_US / f` ps cycle.
pub const PS_PER_US: Time = 1_000_000;

/// An independent clock. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyDomain {
    name: String,
    frequency: u32,
    cycle_time: Time,
}

impl FrequencyDomain {
    pub fn new(name: impl Into<String>, frequency: u32) -> anyhow::Result<Self> {
        let name = name.into();
        if !(1..=MAX_FREQUENCY).contains(&frequency) {
            bail!(
                "frequency domain '{}': frequency not in range [1, {}] MHz (={})",
                name,
                MAX_FREQUENCY,
                frequency
            );
        }
        Ok(Self {
            name,
            frequency,
            cycle_time: PS_PER_US / frequency as Time,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frequency in MHz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Cycle length in picoseconds.
    pub fn cycle_time(&self) -> Time {
        self.cycle_time
    }

    /// Domain cycle containing `time`. Cycles are 1-based.
    pub fn cycle(&self, time: Time) -> Cycle {
        time / self.cycle_time + 1
    }

    /// Start of the domain cycle containing `time`.
    pub fn align(&self, time: Time) -> Time {
        time / self.cycle_time * self.cycle_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_time_is_derived_from_frequency() {
        let d = FrequencyDomain::new("cpu", 1000).unwrap();
        assert_eq!(1000, d.cycle_time());
        let d = FrequencyDomain::new("slow", 3).unwrap();
        assert_eq!(333_333, d.cycle_time());
    }

    #[test]
    fn cycles_are_one_based() {
        let d = FrequencyDomain::new("mem", 500).unwrap();
        assert_eq!(1, d.cycle(0));
        assert_eq!(1, d.cycle(1999));
        assert_eq!(2, d.cycle(2000));
        assert_eq!(2000, d.align(3999));
    }

    #[test]
    fn out_of_range_frequency_is_rejected() {
        assert!(FrequencyDomain::new("zero", 0).is_err());
        assert!(FrequencyDomain::new("fast", MAX_FREQUENCY + 1).is_err());
        assert!(FrequencyDomain::new("max", MAX_FREQUENCY).is_ok());
    }
}
