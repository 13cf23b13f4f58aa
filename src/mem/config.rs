use std::collections::HashSet;

use anyhow::{bail, Context};
use serde::Deserialize;

use super::policy::ReplacementPolicy;
use crate::sim::config::Config;

/// Module name under which caches refer to main memory.
pub const GLOBAL_MEMORY: &str = "global-memory";

/// Deepest cache path allowed between an entry point and main memory.
pub const MAX_LEVELS: usize = 10;

/// Bytes added to every message on top of its payload.
pub const MESSAGE_HEADER: u32 = 8;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheGeometry {
    pub name: String,
    pub sets: usize,
    pub assoc: usize,
    pub block_size: u32,
    pub latency: u64,
    pub policy: ReplacementPolicy,
    pub banks: usize,
    pub read_ports: usize,
    pub write_ports: usize,
}

impl Default for CacheGeometry {
    fn default() -> Self {
        Self {
            name: String::new(),
            sets: 16,
            assoc: 2,
            block_size: 256,
            latency: 1,
            policy: ReplacementPolicy::Lru,
            banks: 1,
            read_ports: 2,
            write_ports: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CacheSpec {
    pub name: String,
    pub geometry: String,
    pub low_module: String,
    pub high_network: Option<String>,
    pub low_network: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GlobalMemorySpec {
    pub block_size: u32,
    pub latency: u64,
    pub banks: usize,
    pub read_ports: usize,
    pub write_ports: usize,
    pub high_network: Option<String>,
}

impl Default for GlobalMemorySpec {
    fn default() -> Self {
        Self {
            block_size: 64,
            latency: 1,
            banks: 4,
            read_ports: 2,
            write_ports: 2,
            high_network: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NetworkSpec {
    pub name: String,
    pub input_buffer_size: u32,
    pub output_buffer_size: u32,
    /// Bytes per memory cycle on every link.
    pub bandwidth: u32,
    /// Cycles per hop, on top of serialization.
    pub latency: u64,
}

/// Maps a client name to the first module its accesses enter.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EntrySpec {
    pub name: String,
    pub module: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemConfig {
    /// Memory-hierarchy clock in MHz.
    pub frequency: u32,
    /// Seed for random block replacement.
    pub seed: u64,
    pub geometry: Vec<CacheGeometry>,
    pub cache: Vec<CacheSpec>,
    pub global_memory: GlobalMemorySpec,
    pub network: Vec<NetworkSpec>,
    pub entry: Vec<EntrySpec>,
}

impl Config for MemConfig {}

impl Default for MemConfig {
    fn default() -> Self {
        let network = |name: &str| NetworkSpec {
            name: name.to_string(),
            input_buffer_size: 528,
            output_buffer_size: 528,
            bandwidth: 264,
            latency: 1,
        };
        let l1 = |name: &str| CacheSpec {
            name: name.to_string(),
            geometry: "l1".to_string(),
            low_module: "l2".to_string(),
            high_network: None,
            low_network: Some("net-l1-l2".to_string()),
        };
        Self {
            frequency: 1000,
            seed: 0,
            geometry: vec![
                CacheGeometry {
                    name: "l1".to_string(),
                    sets: 16,
                    assoc: 2,
                    block_size: 256,
                    latency: 1,
                    policy: ReplacementPolicy::Lru,
                    banks: 1,
                    read_ports: 2,
                    write_ports: 2,
                },
                CacheGeometry {
                    name: "l2".to_string(),
                    sets: 64,
                    assoc: 4,
                    block_size: 256,
                    latency: 10,
                    policy: ReplacementPolicy::Lru,
                    banks: 4,
                    read_ports: 2,
                    write_ports: 2,
                },
            ],
            cache: vec![
                l1("l1-0"),
                l1("l1-1"),
                CacheSpec {
                    name: "l2".to_string(),
                    geometry: "l2".to_string(),
                    low_module: GLOBAL_MEMORY.to_string(),
                    high_network: Some("net-l1-l2".to_string()),
                    low_network: Some("net-l2-gm".to_string()),
                },
            ],
            global_memory: GlobalMemorySpec {
                block_size: 256,
                latency: 100,
                banks: 8,
                read_ports: 2,
                write_ports: 2,
                high_network: Some("net-l2-gm".to_string()),
            },
            network: vec![network("net-l1-l2"), network("net-l2-gm")],
            entry: vec![
                EntrySpec {
                    name: "cu0".to_string(),
                    module: "l1-0".to_string(),
                },
                EntrySpec {
                    name: "cu1".to_string(),
                    module: "l1-1".to_string(),
                },
            ],
        }
    }
}

impl MemConfig {
    pub fn geometry(&self, name: &str) -> Option<&CacheGeometry> {
        self.geometry.iter().find(|g| g.name == name)
    }

    pub fn cache(&self, name: &str) -> Option<&CacheSpec> {
        self.cache.iter().find(|c| c.name == name)
    }

    pub fn network(&self, name: &str) -> Option<&NetworkSpec> {
        self.network.iter().find(|n| n.name == name)
    }

    fn is_module(&self, name: &str) -> bool {
        name == GLOBAL_MEMORY || self.cache(name).is_some()
    }

    fn block_size_of(&self, module: &str) -> Option<u32> {
        if module == GLOBAL_MEMORY {
            return Some(self.global_memory.block_size);
        }
        let cache = self.cache(module)?;
        self.geometry(&cache.geometry).map(|g| g.block_size)
    }

    fn high_network_of(&self, module: &str) -> Option<&str> {
        if module == GLOBAL_MEMORY {
            return self.global_memory.high_network.as_deref();
        }
        self.cache(module)?.high_network.as_deref()
    }

    /// Check the hierarchy before anything is built from it.
    pub fn validate(&self) -> anyhow::Result<()> {
        for geometry in &self.geometry {
            validate_geometry(geometry)
                .with_context(|| format!("cache geometry '{}'", geometry.name))?;
        }
        unique(self.geometry.iter().map(|g| g.name.as_str()), "cache geometry")?;

        validate_global_memory(&self.global_memory).context("global memory")?;

        for net in &self.network {
            if net.name.is_empty() {
                bail!("network without a name");
            }
            if net.bandwidth == 0 {
                bail!("network '{}': invalid or missing value for 'bandwidth'", net.name);
            }
            if net.input_buffer_size == 0 || net.output_buffer_size == 0 {
                bail!("network '{}': buffer sizes missing", net.name);
            }
        }
        unique(self.network.iter().map(|n| n.name.as_str()), "network")?;

        for cache in &self.cache {
            self.validate_cache(cache)
                .with_context(|| format!("cache '{}'", cache.name))?;
        }
        unique(
            self.cache
                .iter()
                .map(|c| c.name.as_str())
                .chain(std::iter::once(GLOBAL_MEMORY)),
            "module",
        )?;

        if let Some(net) = &self.global_memory.high_network {
            self.check_attachment(GLOBAL_MEMORY, net)?;
        }

        if self.entry.is_empty() {
            bail!("memory configuration does not specify a valid entry point");
        }
        for entry in &self.entry {
            if !self.is_module(&entry.module) {
                bail!(
                    "entry '{}': invalid module name '{}'",
                    entry.name,
                    entry.module
                );
            }
        }
        unique(self.entry.iter().map(|e| e.name.as_str()), "entry")?;
        Ok(())
    }

    fn validate_cache(&self, cache: &CacheSpec) -> anyhow::Result<()> {
        if cache.name.is_empty() {
            bail!("cache without a name");
        }
        if self.geometry(&cache.geometry).is_none() {
            bail!("invalid geometry '{}'", cache.geometry);
        }
        if !self.is_module(&cache.low_module) || cache.low_module == cache.name {
            bail!("invalid cache name '{}' in 'low_module'", cache.low_module);
        }

        let Some(low_net) = cache.low_network.as_deref() else {
            bail!("no network to lower-level module '{}'", cache.low_module);
        };
        self.check_attachment(&cache.name, low_net)?;
        if let Some(high_net) = cache.high_network.as_deref() {
            self.check_attachment(&cache.name, high_net)?;
            if high_net == low_net {
                bail!("network '{}' already contains module '{}'", low_net, cache.name);
            }
        }
        if self.high_network_of(&cache.low_module) != Some(low_net) {
            bail!(
                "not in same network as lower-level module '{}'",
                cache.low_module
            );
        }

        // every path must reach main memory with non-decreasing block sizes
        let mut module = cache.name.as_str();
        let mut levels = 0;
        while module != GLOBAL_MEMORY {
            let spec = self
                .cache(module)
                .with_context(|| format!("invalid module '{}' on the path", module))?;
            let (upper, lower) = (
                self.block_size_of(module),
                self.block_size_of(&spec.low_module),
            );
            if let (Some(upper), Some(lower)) = (upper, lower) {
                if lower < upper {
                    bail!("decreasing block size below '{}'", module);
                }
            }
            levels += 1;
            if levels > MAX_LEVELS {
                bail!("too many cache levels");
            }
            module = &spec.low_module;
        }
        Ok(())
    }

    fn check_attachment(&self, module: &str, net: &str) -> anyhow::Result<()> {
        let spec = self
            .network(net)
            .with_context(|| format!("{}: invalid network name '{}'", module, net))?;
        let block_size = self.block_size_of(module).unwrap_or(0);
        let minimum = block_size + MESSAGE_HEADER;
        if spec.input_buffer_size < minimum || spec.output_buffer_size < minimum {
            bail!(
                "network '{}': minimum buffer size is {} for module '{}'",
                net,
                minimum,
                module
            );
        }
        Ok(())
    }
}

fn validate_geometry(g: &CacheGeometry) -> anyhow::Result<()> {
    if g.name.is_empty() {
        bail!("geometry without a name");
    }
    if !g.sets.is_power_of_two() {
        bail!("number of sets must be a power of two");
    }
    if !g.assoc.is_power_of_two() {
        bail!("associativity must be a power of two");
    }
    validate_banked(g.block_size, g.latency, g.banks, g.read_ports, g.write_ports)
}

fn validate_global_memory(gm: &GlobalMemorySpec) -> anyhow::Result<()> {
    validate_banked(
        gm.block_size,
        gm.latency,
        gm.banks,
        gm.read_ports,
        gm.write_ports,
    )
}

fn validate_banked(
    block_size: u32,
    latency: u64,
    banks: usize,
    read_ports: usize,
    write_ports: usize,
) -> anyhow::Result<()> {
    if !block_size.is_power_of_two() || block_size < 4 {
        bail!("block size must be power of two and at least 4");
    }
    if latency < 1 {
        bail!("invalid value for 'latency'");
    }
    if !banks.is_power_of_two() {
        bail!("number of banks must be a power of two");
    }
    if read_ports < 1 {
        bail!("invalid value for 'read_ports'");
    }
    if write_ports < 1 {
        bail!("invalid value for 'write_ports'");
    }
    Ok(())
}

fn unique<'a>(names: impl Iterator<Item = &'a str>, what: &str) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            bail!("duplicate {} name '{}'", what, name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(config: &MemConfig) -> String {
        format!("{:#}", config.validate().unwrap_err())
    }

    #[test]
    fn default_hierarchy_is_valid() {
        MemConfig::default().validate().unwrap();
    }

    #[test]
    fn parses_from_toml() {
        let text = r#"
            frequency = 500

            [[geometry]]
            name = "small"
            sets = 4
            assoc = 1
            block_size = 64
            policy = "FIFO"

            [[cache]]
            name = "l1"
            geometry = "small"
            low_module = "global-memory"
            low_network = "net"

            [global_memory]
            block_size = 64
            latency = 20
            high_network = "net"

            [[network]]
            name = "net"
            input_buffer_size = 144
            output_buffer_size = 144
            bandwidth = 72

            [[entry]]
            name = "cpu"
            module = "l1"
        "#;
        let config: MemConfig = toml::from_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(500, config.frequency);
        assert_eq!(ReplacementPolicy::Fifo, config.geometry[0].policy);
        assert_eq!(2, config.geometry[0].read_ports);
        assert_eq!(20, config.global_memory.latency);
    }

    #[test]
    fn rejects_non_power_of_two_sets() {
        let mut config = MemConfig::default();
        config.geometry[0].sets = 12;
        assert!(err(&config).contains("sets must be a power of two"));
    }

    #[test]
    fn rejects_small_network_buffers() {
        let mut config = MemConfig::default();
        config.network[0].output_buffer_size = 200;
        assert!(err(&config).contains("minimum buffer size is 264"));
    }

    #[test]
    fn rejects_decreasing_block_size() {
        let mut config = MemConfig::default();
        config.global_memory.block_size = 64;
        assert!(err(&config).contains("decreasing block size"));
    }

    #[test]
    fn rejects_mismatched_low_network() {
        let mut config = MemConfig::default();
        config.cache[0].low_network = Some("net-l2-gm".to_string());
        assert!(err(&config).contains("not in same network"));
    }

    #[test]
    fn rejects_unknown_low_module() {
        let mut config = MemConfig::default();
        config.cache[2].low_module = "dram".to_string();
        assert!(err(&config).contains("'dram'"));
    }

    #[test]
    fn rejects_cache_cycles() {
        let mut config = MemConfig::default();
        config.cache[2].low_module = "l1-0".to_string();
        config.cache[0].high_network = Some("net-l2-gm".to_string());
        config.cache[2].low_network = Some("net-l2-gm".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_missing_entry_points() {
        let mut config = MemConfig::default();
        config.entry.clear();
        assert!(err(&config).contains("valid entry point"));
    }

    #[test]
    fn rejects_duplicate_cache_names() {
        let mut config = MemConfig::default();
        config.cache[1].name = "l1-0".to_string();
        assert!(err(&config).contains("duplicate module name 'l1-0'"));
    }
}
