use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

use super::policy::ReplacementPolicy;
use super::Addr;

type Ways<T> = SmallVec<[T; 8]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheBlock {
    pub tag: Addr,
    pub valid: bool,
}

/// Result of a tag lookup. `way` is meaningful only on a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub hit: bool,
    pub set: usize,
    pub way: usize,
}

/// Set-associative tag array. Holds no data, only tags, validity and replacement order.
#[derive(Debug)]
pub struct Cache {
    sets: usize,
    assoc: usize,
    log_block_size: u32,
    policy: ReplacementPolicy,
    blocks: Vec<Ways<CacheBlock>>,
    // most recently used (LRU) or most recently filled (FIFO) way first
    order: Vec<Ways<usize>>,
    rng: StdRng,
}

impl Cache {
    pub fn new(
        sets: usize,
        assoc: usize,
        block_size: u32,
        policy: ReplacementPolicy,
        seed: u64,
    ) -> Self {
        assert!(sets.is_power_of_two(), "number of sets must be a power of two");
        assert!(assoc.is_power_of_two(), "associativity must be a power of two");
        assert!(block_size.is_power_of_two(), "block size must be a power of two");
        Self {
            sets,
            assoc,
            log_block_size: block_size.trailing_zeros(),
            policy,
            blocks: (0..sets)
                .map(|_| SmallVec::from_elem(CacheBlock::default(), assoc))
                .collect(),
            order: (0..sets).map(|_| (0..assoc).collect()).collect(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn sets(&self) -> usize {
        self.sets
    }

    pub fn assoc(&self) -> usize {
        self.assoc
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    pub fn set_of(&self, tag: Addr) -> usize {
        ((tag >> self.log_block_size) as usize) & (self.sets - 1)
    }

    pub fn find_block(&self, tag: Addr) -> Lookup {
        let set = self.set_of(tag);
        match self.blocks[set]
            .iter()
            .position(|block| block.valid && block.tag == tag)
        {
            Some(way) => Lookup {
                hit: true,
                set,
                way,
            },
            None => Lookup {
                hit: false,
                set,
                way: 0,
            },
        }
    }

    /// Choose the way to fill in `set`. Invalid ways are used first.
    pub fn replace_block(&mut self, set: usize) -> usize {
        if let Some(way) = self.blocks[set].iter().position(|block| !block.valid) {
            return way;
        }
        match self.policy {
            ReplacementPolicy::Lru | ReplacementPolicy::Fifo => {
                *self.order[set].last().unwrap_or(&0)
            }
            ReplacementPolicy::Random => self.rng.gen_range(0..self.assoc),
        }
    }

    pub fn block(&self, set: usize, way: usize) -> CacheBlock {
        self.blocks[set][way]
    }

    pub fn set_block(&mut self, set: usize, way: usize, tag: Addr, valid: bool) {
        let block = &mut self.blocks[set][way];
        let refill = block.tag != tag || !block.valid;
        *block = CacheBlock { tag, valid };
        if self.policy == ReplacementPolicy::Fifo && refill {
            self.promote(set, way);
        }
    }

    /// Recency update after an access.
    pub fn access_block(&mut self, set: usize, way: usize) {
        if self.policy == ReplacementPolicy::Lru {
            self.promote(set, way);
        }
    }

    fn promote(&mut self, set: usize, way: usize) {
        let order = &mut self.order[set];
        if let Some(pos) = order.iter().position(|&idx| idx == way) {
            order.remove(pos);
        }
        order.insert(0, way);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(cache: &mut Cache, tag: Addr) -> usize {
        let set = cache.set_of(tag);
        let way = cache.replace_block(set);
        cache.set_block(set, way, tag, true);
        cache.access_block(set, way);
        way
    }

    #[test]
    fn miss_then_fill_then_hit() {
        let mut cache = Cache::new(4, 2, 64, ReplacementPolicy::Lru, 0);
        assert!(!cache.find_block(0x100).hit);
        let way = fill(&mut cache, 0x100);
        let lookup = cache.find_block(0x100);
        assert!(lookup.hit);
        assert_eq!(way, lookup.way);
        assert_eq!(cache.set_of(0x100), lookup.set);
    }

    #[test]
    fn invalid_ways_are_filled_first() {
        let mut cache = Cache::new(1, 4, 64, ReplacementPolicy::Random, 7);
        let ways: Vec<_> = (0..4).map(|i| fill(&mut cache, i * 64)).collect();
        assert_eq!(vec![0, 1, 2, 3], ways);
    }

    #[test]
    fn lru_evicts_least_recently_accessed() {
        let mut cache = Cache::new(1, 2, 64, ReplacementPolicy::Lru, 0);
        fill(&mut cache, 0);
        fill(&mut cache, 64);
        let hit = cache.find_block(0);
        cache.access_block(hit.set, hit.way);
        fill(&mut cache, 128);
        assert!(cache.find_block(0).hit);
        assert!(!cache.find_block(64).hit);
    }

    #[test]
    fn fifo_ignores_accesses() {
        let mut cache = Cache::new(1, 2, 64, ReplacementPolicy::Fifo, 0);
        fill(&mut cache, 0);
        fill(&mut cache, 64);
        let hit = cache.find_block(0);
        cache.access_block(hit.set, hit.way);
        fill(&mut cache, 128);
        assert!(!cache.find_block(0).hit);
        assert!(cache.find_block(64).hit);
    }

    #[test]
    fn random_replacement_is_seeded() {
        let victims = |seed| {
            let mut cache = Cache::new(1, 8, 64, ReplacementPolicy::Random, seed);
            for i in 0..8 {
                fill(&mut cache, i * 64);
            }
            (0..16).map(|_| cache.replace_block(0)).collect::<Vec<_>>()
        };
        assert_eq!(victims(3), victims(3));
        assert!(victims(3).iter().all(|&way| way < 8));
    }

    #[test]
    fn set_index_uses_block_number() {
        let cache = Cache::new(16, 2, 256, ReplacementPolicy::Lru, 0);
        assert_eq!(0, cache.set_of(0));
        assert_eq!(1, cache.set_of(256));
        assert_eq!(0, cache.set_of(256 * 16));
    }
}
