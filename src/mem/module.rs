use serde::Serialize;

use super::cache::Cache;
use super::network::NetPoint;
use super::policy::{bank_for, block_index, block_tag};
use super::port::{PortKind, PortSet};
use super::stats::ModStats;
use super::waiting::WaitingList;
use super::Addr;

pub type ModuleId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Cache,
    MainMemory,
}

/// Where an address lands inside a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub tag: Addr,
    pub block_index: u64,
    pub bank: usize,
}

/// A level of the hierarchy: a cache or the terminal main memory.
#[derive(Debug)]
pub struct MemModule {
    pub(super) name: String,
    pub(super) kind: ModuleKind,
    pub(super) block_size: u32,
    pub(super) log_block_size: u32,
    pub(super) latency: u64,
    pub(super) banks: usize,
    pub(super) read_ports: PortSet,
    pub(super) write_ports: PortSet,
    pub(super) cache: Option<Cache>,
    pub(super) waiting: WaitingList,
    pub(super) high_net: Option<NetPoint>,
    pub(super) low_net: Option<NetPoint>,
    pub(super) low_module: Option<ModuleId>,
    pub(super) stats: ModStats,
}

impl MemModule {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        name: impl Into<String>,
        kind: ModuleKind,
        block_size: u32,
        latency: u64,
        banks: usize,
        read_ports: usize,
        write_ports: usize,
        cache: Option<Cache>,
    ) -> Self {
        assert_eq!(
            kind == ModuleKind::Cache,
            cache.is_some(),
            "only cache modules carry a tag array"
        );
        Self {
            name: name.into(),
            kind,
            block_size,
            log_block_size: block_size.trailing_zeros(),
            latency,
            banks,
            read_ports: PortSet::new(PortKind::Read, banks, read_ports),
            write_ports: PortSet::new(PortKind::Write, banks, write_ports),
            cache,
            waiting: WaitingList::default(),
            high_net: None,
            low_net: None,
            low_module: None,
            stats: ModStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn is_main_memory(&self) -> bool {
        self.kind == ModuleKind::MainMemory
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn latency(&self) -> u64 {
        self.latency
    }

    pub fn banks(&self) -> usize {
        self.banks
    }

    pub fn read_ports(&self) -> &PortSet {
        &self.read_ports
    }

    pub fn write_ports(&self) -> &PortSet {
        &self.write_ports
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn high_net(&self) -> Option<NetPoint> {
        self.high_net
    }

    pub fn low_net(&self) -> Option<NetPoint> {
        self.low_net
    }

    pub fn stats(&self) -> &ModStats {
        &self.stats
    }

    /// Next module down the hierarchy for `addr`.
    pub fn low_module(&self, _addr: Addr) -> Option<ModuleId> {
        self.low_module
    }

    pub fn locate(&self, addr: Addr) -> Location {
        let tag = block_tag(addr, self.block_size);
        let block_index = block_index(tag, self.log_block_size);
        Location {
            tag,
            block_index,
            bank: bank_for(block_index, self.banks),
        }
    }
}
