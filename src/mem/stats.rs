use std::fmt;
use std::ops::AddAssign;

use serde::Serialize;

use crate::timeq::Cycle;

/// Why an access was parked on a module waiting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    Order,
    InFlight,
    NoReadPort,
    NoWritePort,
    WriteAfterRead,
}

impl WaitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::InFlight => "in_flight",
            Self::NoReadPort => "no_read_port",
            Self::NoWritePort => "no_write_port",
            Self::WriteAfterRead => "write_after_read",
        }
    }
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModStats {
    accesses: u64,
    reads: u64,
    writes: u64,
    coalesced_reads: u64,
    coalesced_writes: u64,
    effective_reads: u64,
    effective_read_hits: u64,
    effective_read_misses: u64,
    effective_writes: u64,
    effective_write_hits: u64,
    effective_write_misses: u64,
    evictions: u64,
    waits_order: u64,
    waits_in_flight: u64,
    waits_no_read_port: u64,
    waits_no_write_port: u64,
    waits_write_after_read: u64,
    peak_locked_read_ports: u64,
    peak_locked_write_ports: u64,
}

impl ModStats {
    pub fn accesses(&self) -> u64 {
        self.accesses
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn coalesced_reads(&self) -> u64 {
        self.coalesced_reads
    }

    pub fn coalesced_writes(&self) -> u64 {
        self.coalesced_writes
    }

    pub fn effective_reads(&self) -> u64 {
        self.effective_reads
    }

    pub fn effective_read_hits(&self) -> u64 {
        self.effective_read_hits
    }

    pub fn effective_read_misses(&self) -> u64 {
        self.effective_read_misses
    }

    pub fn effective_writes(&self) -> u64 {
        self.effective_writes
    }

    pub fn effective_write_hits(&self) -> u64 {
        self.effective_write_hits
    }

    pub fn effective_write_misses(&self) -> u64 {
        self.effective_write_misses
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn waits(&self, reason: WaitReason) -> u64 {
        match reason {
            WaitReason::Order => self.waits_order,
            WaitReason::InFlight => self.waits_in_flight,
            WaitReason::NoReadPort => self.waits_no_read_port,
            WaitReason::NoWritePort => self.waits_no_write_port,
            WaitReason::WriteAfterRead => self.waits_write_after_read,
        }
    }

    pub fn peak_locked_read_ports(&self) -> u64 {
        self.peak_locked_read_ports
    }

    pub fn peak_locked_write_ports(&self) -> u64 {
        self.peak_locked_write_ports
    }

    pub fn record_read(&mut self, coalesced: bool) {
        self.accesses = self.accesses.saturating_add(1);
        self.reads = self.reads.saturating_add(1);
        if coalesced {
            self.coalesced_reads = self.coalesced_reads.saturating_add(1);
        }
    }

    pub fn record_write(&mut self, coalesced: bool) {
        self.accesses = self.accesses.saturating_add(1);
        self.writes = self.writes.saturating_add(1);
        if coalesced {
            self.coalesced_writes = self.coalesced_writes.saturating_add(1);
        }
    }

    pub fn record_effective_read(&mut self, hit: bool) {
        self.effective_reads = self.effective_reads.saturating_add(1);
        if hit {
            self.effective_read_hits = self.effective_read_hits.saturating_add(1);
        } else {
            self.effective_read_misses = self.effective_read_misses.saturating_add(1);
        }
    }

    pub fn record_effective_write(&mut self, hit: bool) {
        self.effective_writes = self.effective_writes.saturating_add(1);
        if hit {
            self.effective_write_hits = self.effective_write_hits.saturating_add(1);
        } else {
            self.effective_write_misses = self.effective_write_misses.saturating_add(1);
        }
    }

    pub fn record_eviction(&mut self) {
        self.evictions = self.evictions.saturating_add(1);
    }

    pub fn record_wait(&mut self, reason: WaitReason) {
        let counter = match reason {
            WaitReason::Order => &mut self.waits_order,
            WaitReason::InFlight => &mut self.waits_in_flight,
            WaitReason::NoReadPort => &mut self.waits_no_read_port,
            WaitReason::NoWritePort => &mut self.waits_no_write_port,
            WaitReason::WriteAfterRead => &mut self.waits_write_after_read,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn update_locked_ports(&mut self, read: usize, write: usize) {
        self.peak_locked_read_ports = self.peak_locked_read_ports.max(read as u64);
        self.peak_locked_write_ports = self.peak_locked_write_ports.max(write as u64);
    }
}

impl AddAssign<&ModStats> for ModStats {
    fn add_assign(&mut self, other: &ModStats) {
        self.accesses = self.accesses.saturating_add(other.accesses);
        self.reads = self.reads.saturating_add(other.reads);
        self.writes = self.writes.saturating_add(other.writes);
        self.coalesced_reads = self.coalesced_reads.saturating_add(other.coalesced_reads);
        self.coalesced_writes = self.coalesced_writes.saturating_add(other.coalesced_writes);
        self.effective_reads = self.effective_reads.saturating_add(other.effective_reads);
        self.effective_read_hits = self
            .effective_read_hits
            .saturating_add(other.effective_read_hits);
        self.effective_read_misses = self
            .effective_read_misses
            .saturating_add(other.effective_read_misses);
        self.effective_writes = self.effective_writes.saturating_add(other.effective_writes);
        self.effective_write_hits = self
            .effective_write_hits
            .saturating_add(other.effective_write_hits);
        self.effective_write_misses = self
            .effective_write_misses
            .saturating_add(other.effective_write_misses);
        self.evictions = self.evictions.saturating_add(other.evictions);
        self.waits_order = self.waits_order.saturating_add(other.waits_order);
        self.waits_in_flight = self.waits_in_flight.saturating_add(other.waits_in_flight);
        self.waits_no_read_port = self
            .waits_no_read_port
            .saturating_add(other.waits_no_read_port);
        self.waits_no_write_port = self
            .waits_no_write_port
            .saturating_add(other.waits_no_write_port);
        self.waits_write_after_read = self
            .waits_write_after_read
            .saturating_add(other.waits_write_after_read);
        self.peak_locked_read_ports = self
            .peak_locked_read_ports
            .max(other.peak_locked_read_ports);
        self.peak_locked_write_ports = self
            .peak_locked_write_ports
            .max(other.peak_locked_write_ports);
    }
}

impl AddAssign<ModStats> for ModStats {
    fn add_assign(&mut self, other: ModStats) {
        *self += &other;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    messages: u64,
    bytes: u64,
    delivered: u64,
    total_latency: u64,
    max_latency: Cycle,
    retries: u64,
}

impl NetworkStats {
    pub fn messages(&self) -> u64 {
        self.messages
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn total_latency(&self) -> u64 {
        self.total_latency
    }

    pub fn max_latency(&self) -> Cycle {
        self.max_latency
    }

    pub fn retries(&self) -> u64 {
        self.retries
    }

    pub fn record_send(&mut self, bytes: u32) {
        self.messages = self.messages.saturating_add(1);
        self.bytes = self.bytes.saturating_add(bytes as u64);
    }

    pub fn record_delivery(&mut self, latency: Cycle) {
        self.delivered = self.delivered.saturating_add(1);
        self.total_latency = self.total_latency.saturating_add(latency);
        self.max_latency = self.max_latency.max(latency);
    }

    pub fn record_retry(&mut self) {
        self.retries = self.retries.saturating_add(1);
    }
}
