use std::cell::Cell;
use std::rc::Rc;

use serde::Serialize;

use super::module::ModuleId;
use super::network::MessageId;
use super::port::PortRef;
use super::{Addr, Payload};
use crate::engine::EventId;
use crate::timeq::Cycle;

/// Progress counter shared between a client and its accesses.
///
/// Reads bump it when they finish; writes bump it as soon as they secure a write port.
#[derive(Debug, Clone, Default)]
pub struct Witness(Rc<Cell<u64>>);

impl Witness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }

    pub(crate) fn bump(&self) {
        self.0.set(self.0.get() + 1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

/// Handle to a live request context. Stale handles are rejected by the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackId {
    index: u32,
    generation: u32,
}

/// Continuation state of one in-flight access.
#[derive(Debug)]
pub struct ModStack {
    pub id: u64,
    pub parent: Option<u64>,
    pub kind: AccessKind,
    pub module: ModuleId,
    pub addr: Addr,
    pub tag: Addr,
    pub block_index: u64,
    pub bank: usize,
    pub set: usize,
    pub way: usize,
    pub hit: bool,
    pub port: Option<PortRef>,
    pub pending: u32,
    pub target: Option<ModuleId>,
    pub msg: Option<MessageId>,
    pub waiting: bool,
    pub ret_event: EventId,
    pub ret_payload: Payload,
    pub witness: Option<Witness>,
    pub issued_at: Cycle,
}

impl ModStack {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        id: u64,
        parent: Option<u64>,
        kind: AccessKind,
        module: ModuleId,
        addr: Addr,
        ret_event: EventId,
        ret_payload: Payload,
        witness: Option<Witness>,
        issued_at: Cycle,
    ) -> Self {
        Self {
            id,
            parent,
            kind,
            module,
            addr,
            tag: 0,
            block_index: 0,
            bank: 0,
            set: 0,
            way: 0,
            hit: false,
            port: None,
            pending: 0,
            target: None,
            msg: None,
            waiting: false,
            ret_event,
            ret_payload,
            witness,
            issued_at,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    stack: Option<ModStack>,
}

/// Generational arena owning every live request context.
#[derive(Debug, Default)]
pub struct StackArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl StackArena {
    pub fn insert(&mut self, stack: ModStack) -> StackId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.stack.is_none());
            slot.stack = Some(stack);
            return StackId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            stack: Some(stack),
        });
        StackId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: StackId) -> &ModStack {
        match self.slots.get(id.index as usize) {
            Some(Slot {
                generation,
                stack: Some(stack),
            }) if *generation == id.generation => stack,
            _ => panic!("request context {:?} is not live", id),
        }
    }

    pub fn get_mut(&mut self, id: StackId) -> &mut ModStack {
        match self.slots.get_mut(id.index as usize) {
            Some(Slot {
                generation,
                stack: Some(stack),
            }) if *generation == id.generation => stack,
            _ => panic!("request context {:?} is not live", id),
        }
    }

    /// Destroy a context. Destroying it a second time is fatal.
    pub fn remove(&mut self, id: StackId) -> ModStack {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .unwrap_or_else(|| panic!("request context {:?} destroyed twice", id));
        let stack = slot
            .stack
            .take()
            .unwrap_or_else(|| panic!("request context {:?} destroyed twice", id));
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        stack
    }

    pub fn live(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(id: u64) -> ModStack {
        ModStack::new(
            id,
            None,
            AccessKind::Read,
            0,
            0x40,
            crate::engine::EV_NONE,
            Payload::Client(0),
            None,
            1,
        )
    }

    #[test]
    fn slots_are_reused_with_a_new_generation() {
        let mut arena = StackArena::default();
        let a = arena.insert(stack(1));
        assert_eq!(1, arena.remove(a).id);
        let b = arena.insert(stack(2));
        assert_ne!(a, b);
        assert_eq!(2, arena.get(b).id);
        assert_eq!(1, arena.live());
    }

    #[test]
    #[should_panic(expected = "destroyed twice")]
    fn double_destroy_is_fatal() {
        let mut arena = StackArena::default();
        let a = arena.insert(stack(1));
        arena.remove(a);
        arena.remove(a);
    }

    #[test]
    #[should_panic(expected = "not live")]
    fn stale_handle_is_rejected() {
        let mut arena = StackArena::default();
        let a = arena.insert(stack(1));
        arena.remove(a);
        arena.insert(stack(2));
        arena.get_mut(a);
    }

    #[test]
    fn witness_is_shared_between_clones() {
        let witness = Witness::new();
        let clone = witness.clone();
        clone.bump();
        clone.bump();
        assert_eq!(2, witness.get());
    }
}
