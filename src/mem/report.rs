use serde::Serialize;

use super::module::{MemModule, ModuleKind};
use super::network::Network;
use super::policy::ReplacementPolicy;
use super::stats::{ModStats, NetworkStats};

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub sets: usize,
    pub assoc: usize,
    pub policy: ReplacementPolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub name: String,
    pub kind: ModuleKind,
    pub block_size: u32,
    pub latency: u64,
    pub banks: usize,
    pub read_ports: usize,
    pub write_ports: usize,
    pub cache: Option<CacheReport>,
    pub stats: ModStats,
}

impl From<&MemModule> for ModuleReport {
    fn from(module: &MemModule) -> Self {
        Self {
            name: module.name().to_string(),
            kind: module.kind(),
            block_size: module.block_size(),
            latency: module.latency(),
            banks: module.banks(),
            read_ports: module.read_ports().count(),
            write_ports: module.write_ports().count(),
            cache: module.cache().map(|cache| CacheReport {
                sets: cache.sets(),
                assoc: cache.assoc(),
                policy: cache.policy(),
            }),
            stats: *module.stats(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub name: String,
    pub nodes: Vec<String>,
    pub bandwidth: u32,
    pub latency: u64,
    pub buffer_bytes: u32,
    pub stats: NetworkStats,
}

impl From<&Network> for NetworkReport {
    fn from(net: &Network) -> Self {
        let link = net.link_config();
        Self {
            name: net.name().to_string(),
            nodes: net.nodes().to_vec(),
            bandwidth: link.bytes_per_cycle,
            latency: link.base_latency,
            buffer_bytes: link.buffer_bytes,
            stats: *net.stats(),
        }
    }
}

/// Configuration and statistics of the whole hierarchy.
#[derive(Debug, Clone, Serialize)]
pub struct MemReport {
    pub frequency: u32,
    pub modules: Vec<ModuleReport>,
    pub networks: Vec<NetworkReport>,
    pub totals: ModStats,
}
