use serde::Serialize;

use super::stack::StackId;
use super::waiting::WaitingList;
use super::Addr;
use crate::engine::EventId;
use crate::timeq::Cycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Read,
    Write,
}

/// Location of a port inside its module: `index` counts within the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRef {
    pub kind: PortKind,
    pub bank: usize,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct Port {
    locked: bool,
    lock_cycle: Cycle,
    owner: Option<StackId>,
    tag: Addr,
    waiting: WaitingList,
}

impl Port {
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock_cycle(&self) -> Cycle {
        self.lock_cycle
    }

    pub fn owner(&self) -> Option<StackId> {
        self.owner
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }
}

/// A locked port handling the tag being looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMatch {
    pub index: usize,
    pub lock_cycle: Cycle,
    pub owner: StackId,
}

/// All ports of one kind in a module, `count` per bank.
#[derive(Debug)]
pub struct PortSet {
    kind: PortKind,
    banks: usize,
    count: usize,
    ports: Vec<Port>,
    locked: usize,
    peak_locked: usize,
}

impl PortSet {
    pub fn new(kind: PortKind, banks: usize, count: usize) -> Self {
        assert!(banks > 0 && count > 0, "a module needs at least one bank and port");
        Self {
            kind,
            banks,
            count,
            ports: (0..banks * count).map(|_| Port::default()).collect(),
            locked: 0,
            peak_locked: 0,
        }
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    /// Ports per bank.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.banks * self.count
    }

    pub fn locked_count(&self) -> usize {
        self.locked
    }

    pub fn peak_locked(&self) -> usize {
        self.peak_locked
    }

    pub fn port(&self, bank: usize, index: usize) -> &Port {
        &self.ports[self.slot(bank, index)]
    }

    fn slot(&self, bank: usize, index: usize) -> usize {
        assert!(
            bank < self.banks && index < self.count,
            "{:?} port {} of bank {} does not exist",
            self.kind,
            index,
            bank
        );
        bank * self.count + index
    }

    /// First locked port in `bank` whose owner accesses `tag`.
    pub fn find_same_tag(&self, bank: usize, tag: Addr) -> Option<TagMatch> {
        (0..self.count).find_map(|index| {
            let port = self.port(bank, index);
            match port.owner {
                Some(owner) if port.locked && port.tag == tag => Some(TagMatch {
                    index,
                    lock_cycle: port.lock_cycle,
                    owner,
                }),
                _ => None,
            }
        })
    }

    pub fn find_free(&self, bank: usize) -> Option<usize> {
        (0..self.count).find(|&index| !self.port(bank, index).locked)
    }

    pub fn lock(&mut self, bank: usize, index: usize, owner: StackId, tag: Addr, cycle: Cycle) {
        assert!(
            self.locked < self.capacity(),
            "{:?} port lock count exceeds {}",
            self.kind,
            self.capacity()
        );
        let slot = self.slot(bank, index);
        let port = &mut self.ports[slot];
        assert!(
            !port.locked,
            "{:?} port {} of bank {} locked twice",
            self.kind,
            index,
            bank
        );
        port.locked = true;
        port.lock_cycle = cycle;
        port.owner = Some(owner);
        port.tag = tag;
        self.locked += 1;
        self.peak_locked = self.peak_locked.max(self.locked);
    }

    /// Release a port, handing back the accesses that coalesced onto it.
    pub fn unlock(&mut self, bank: usize, index: usize) -> WaitingList {
        let slot = self.slot(bank, index);
        let port = &mut self.ports[slot];
        assert!(
            port.locked,
            "{:?} port {} of bank {} released while not locked",
            self.kind,
            index,
            bank
        );
        assert!(self.locked > 0, "{:?} port lock count underflow", self.kind);
        port.locked = false;
        port.owner = None;
        self.locked -= 1;
        port.waiting.take()
    }

    pub fn wait(&mut self, bank: usize, index: usize, stack: StackId, event: EventId) {
        let slot = self.slot(bank, index);
        self.ports[slot].waiting.push(stack, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EV_NONE;
    use crate::mem::stack::{AccessKind, ModStack, StackArena};
    use crate::mem::Payload;

    fn ids(n: usize) -> Vec<StackId> {
        let mut arena = StackArena::default();
        (0..n)
            .map(|i| {
                arena.insert(ModStack::new(
                    i as u64,
                    None,
                    AccessKind::Read,
                    0,
                    0,
                    EV_NONE,
                    Payload::Client(0),
                    None,
                    1,
                ))
            })
            .collect()
    }

    #[test]
    fn free_ports_are_found_per_bank() {
        let stacks = ids(2);
        let mut ports = PortSet::new(PortKind::Read, 2, 2);
        assert_eq!(4, ports.capacity());
        ports.lock(1, 0, stacks[0], 0x100, 3);
        assert_eq!(Some(0), ports.find_free(0));
        assert_eq!(Some(1), ports.find_free(1));
        ports.lock(1, 1, stacks[1], 0x200, 3);
        assert_eq!(None, ports.find_free(1));
        assert_eq!(2, ports.locked_count());
    }

    #[test]
    fn same_tag_lookup_reports_lock_cycle_and_owner() {
        let stacks = ids(1);
        let mut ports = PortSet::new(PortKind::Write, 1, 2);
        ports.lock(0, 1, stacks[0], 0x100, 7);
        let found = ports.find_same_tag(0, 0x100).unwrap();
        assert_eq!(1, found.index);
        assert_eq!(7, found.lock_cycle);
        assert_eq!(stacks[0], found.owner);
        assert!(ports.find_same_tag(0, 0x140).is_none());
    }

    #[test]
    fn unlock_hands_back_coalesced_waiters() {
        let stacks = ids(3);
        let mut ports = PortSet::new(PortKind::Read, 1, 1);
        ports.lock(0, 0, stacks[0], 0x100, 1);
        ports.wait(0, 0, stacks[1], 5);
        ports.wait(0, 0, stacks[2], 5);
        let woken: Vec<_> = ports.unlock(0, 0).into_iter().map(|w| w.stack).collect();
        assert_eq!(vec![stacks[1], stacks[2]], woken);
        assert_eq!(0, ports.locked_count());
        assert_eq!(1, ports.peak_locked());
        assert!(ports.find_same_tag(0, 0x100).is_none());
    }

    #[test]
    #[should_panic(expected = "released while not locked")]
    fn unlocking_a_free_port_is_fatal() {
        let mut ports = PortSet::new(PortKind::Read, 1, 1);
        ports.unlock(0, 0);
    }

    #[test]
    #[should_panic(expected = "locked twice")]
    fn locking_a_locked_port_is_fatal() {
        let stacks = ids(2);
        let mut ports = PortSet::new(PortKind::Read, 1, 2);
        ports.lock(0, 0, stacks[0], 0, 1);
        ports.lock(0, 0, stacks[1], 0, 1);
    }
}
