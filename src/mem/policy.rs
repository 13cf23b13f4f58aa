use serde::{Deserialize, Serialize};

use super::Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPolicy {
    #[default]
    #[serde(alias = "LRU")]
    Lru,
    #[serde(alias = "FIFO")]
    Fifo,
    #[serde(alias = "Random")]
    Random,
}

/// Address of the first byte of the block holding `addr`.
pub(crate) fn block_tag(addr: Addr, block_size: u32) -> Addr {
    debug_assert!(block_size.is_power_of_two());
    addr & !(block_size as Addr - 1)
}

pub(crate) fn block_index(tag: Addr, log_block_size: u32) -> u64 {
    tag >> log_block_size
}

pub(crate) fn bank_for(block_index: u64, banks: usize) -> usize {
    (block_index % banks.max(1) as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_names_accept_both_spellings() {
        #[derive(Deserialize)]
        struct Geometry {
            policy: ReplacementPolicy,
        }
        let parse = |text: &str| toml::from_str::<Geometry>(text).map(|g| g.policy);
        assert_eq!(ReplacementPolicy::Lru, parse("policy = \"LRU\"").unwrap());
        assert_eq!(ReplacementPolicy::Fifo, parse("policy = \"fifo\"").unwrap());
        assert_eq!(ReplacementPolicy::Random, parse("policy = \"Random\"").unwrap());
        assert!(parse("policy = \"mru\"").is_err());
    }

    #[test]
    fn address_decomposition() {
        let tag = block_tag(0x1234, 256);
        assert_eq!(0x1200, tag);
        assert_eq!(0x12, block_index(tag, 8));
        assert_eq!(2, bank_for(0x12, 4));
        assert_eq!(0, bank_for(0x12, 1));
    }
}
