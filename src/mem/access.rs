/*
Read and write access pipelines.

Each access is a request context (`ModStack`) driven through a fixed sequence of states, one
registered event per state.  A handler either finishes its step and schedules the next state, or
parks the context on exactly one waiting list with the event that resumes it.

Read:  Read -> [coalesce | wait] -> Request -> RequestReceive -> RequestReply -> RequestFinish
       -> Unlock -> Finish
Write: Write -> [coalesce | wait] -> (local update || RequestSend -> RequestReceive
       -> RequestReply -> RequestReplyReceive) -> Unlock -> Finish

A miss (read) or any cache write (write) sends a request to the module below, which runs the same
pipeline for a child context whose return event brings the parent to its reply state.
*/

use log::debug;

use super::config::MESSAGE_HEADER;
use super::module::ModuleId;
use super::network::NetPoint;
use super::port::{PortKind, PortRef};
use super::stack::{AccessKind, StackId};
use super::stats::WaitReason;
use super::{MemSystem, MemWorld, Payload};
use crate::engine::EventScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadState {
    Read,
    Request,
    RequestReceive,
    RequestReply,
    RequestFinish,
    Unlock,
    Finish,
}

impl ReadState {
    pub const COUNT: usize = 7;

    pub const ALL: [ReadState; Self::COUNT] = [
        Self::Read,
        Self::Request,
        Self::RequestReceive,
        Self::RequestReply,
        Self::RequestFinish,
        Self::Unlock,
        Self::Finish,
    ];

    pub fn event_name(self) -> &'static str {
        match self {
            Self::Read => "mod_read",
            Self::Request => "mod_read_request",
            Self::RequestReceive => "mod_read_request_receive",
            Self::RequestReply => "mod_read_request_reply",
            Self::RequestFinish => "mod_read_request_finish",
            Self::Unlock => "mod_read_unlock",
            Self::Finish => "mod_read_finish",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteState {
    Write,
    RequestSend,
    RequestReceive,
    RequestReply,
    RequestReplyReceive,
    Unlock,
    Finish,
}

impl WriteState {
    pub const COUNT: usize = 7;

    pub const ALL: [WriteState; Self::COUNT] = [
        Self::Write,
        Self::RequestSend,
        Self::RequestReceive,
        Self::RequestReply,
        Self::RequestReplyReceive,
        Self::Unlock,
        Self::Finish,
    ];

    pub fn event_name(self) -> &'static str {
        match self {
            Self::Write => "mod_write",
            Self::RequestSend => "mod_write_request_send",
            Self::RequestReceive => "mod_write_request_receive",
            Self::RequestReply => "mod_write_request_reply",
            Self::RequestReplyReceive => "mod_write_request_reply_receive",
            Self::Unlock => "mod_write_unlock",
            Self::Finish => "mod_write_finish",
        }
    }
}

pub(super) fn handle_read<S: MemWorld>(sim: &mut S, state: ReadState, payload: Payload) {
    let id = payload.stack();
    let (engine, mem) = sim.mem();
    match state {
        ReadState::Read => read(engine, mem, id),
        ReadState::Request => read_request(engine, mem, id),
        ReadState::RequestReceive => read_request_receive(engine, mem, id),
        ReadState::RequestReply => read_request_reply(engine, mem, id),
        ReadState::RequestFinish => read_request_finish(engine, mem, id),
        ReadState::Unlock => read_unlock(engine, mem, id),
        ReadState::Finish => read_finish(engine, mem, id),
    }
}

pub(super) fn handle_write<S: MemWorld>(sim: &mut S, state: WriteState, payload: Payload) {
    let id = payload.stack();
    let (engine, mem) = sim.mem();
    match state {
        WriteState::Write => write(engine, mem, id),
        WriteState::RequestSend => write_request_send(engine, mem, id),
        WriteState::RequestReceive => write_request_receive(engine, mem, id),
        WriteState::RequestReply => write_request_reply(engine, mem, id),
        WriteState::RequestReplyReceive => write_request_reply_receive(engine, mem, id),
        WriteState::Unlock => write_unlock(engine, mem, id),
        WriteState::Finish => write_finish(engine, mem, id),
    }
}

/// Result of the tag lookup done once a port is held.
struct Probe {
    hit: bool,
    set: usize,
    way: usize,
    evict: bool,
}

fn read<S: MemWorld>(engine: &mut EventScheduler<S>, mem: &mut MemSystem, id: StackId) {
    let cycle = mem.cycle(engine);
    let retry = mem.events.read(ReadState::Read);
    let (access, module_id, addr) = {
        let stack = mem.stacks.get(id);
        (stack.id, stack.module, stack.addr)
    };
    let module = &mem.modules[module_id];

    // accesses already waiting in the module go first
    if !module.waiting.is_empty() {
        debug!(
            "{} {} read module=\"{}\" addr={:#x} wait why=\"{}\"",
            cycle,
            access,
            module.name,
            addr,
            WaitReason::Order
        );
        mem.wait_in_module(id, retry, WaitReason::Order);
        return;
    }

    let loc = module.locate(addr);
    let same_tag = module.read_ports.find_same_tag(loc.bank, loc.tag);
    let free = module.read_ports.find_free(loc.bank);
    {
        let stack = mem.stacks.get_mut(id);
        stack.tag = loc.tag;
        stack.block_index = loc.block_index;
        stack.bank = loc.bank;
    }

    if let Some(found) = same_tag {
        if found.lock_cycle == cycle {
            let owner = mem.stacks.get(found.owner);
            let (owner_access, hit, set, way) = (owner.id, owner.hit, owner.set, owner.way);
            let port = PortRef {
                kind: PortKind::Read,
                bank: loc.bank,
                index: found.index,
            };
            {
                let stack = mem.stacks.get_mut(id);
                stack.hit = hit;
                stack.set = set;
                stack.way = way;
            }
            debug!(
                "{} {} read module=\"{}\" addr={:#x} bank={} coalesce id={} read_port={}",
                cycle,
                access,
                mem.modules[module_id].name,
                addr,
                loc.bank,
                owner_access,
                found.index
            );
            mem.modules[module_id].stats.record_read(true);
            mem.wait_in_port(id, port, mem.events.read(ReadState::Finish));
            return;
        }

        // the block is handled by an access from an earlier cycle; writes may sit in between
        debug!(
            "{} {} read module=\"{}\" addr={:#x} wait why=\"{}\"",
            cycle,
            access,
            mem.modules[module_id].name,
            addr,
            WaitReason::InFlight
        );
        mem.wait_in_module(id, retry, WaitReason::InFlight);
        return;
    }

    let Some(index) = free else {
        debug!(
            "{} {} read module=\"{}\" addr={:#x} bank={} wait why=\"{}\"",
            cycle,
            access,
            mem.modules[module_id].name,
            addr,
            loc.bank,
            WaitReason::NoReadPort
        );
        mem.wait_in_module(id, retry, WaitReason::NoReadPort);
        return;
    };

    let port = PortRef {
        kind: PortKind::Read,
        bank: loc.bank,
        index,
    };
    mem.lock_port(id, port, loc.tag, cycle);

    let module = &mut mem.modules[module_id];
    module.stats.record_read(false);
    let latency = module.latency;
    let probe = module.cache.as_mut().map(|cache| {
        let found = cache.find_block(loc.tag);
        if found.hit {
            Probe {
                hit: true,
                set: found.set,
                way: found.way,
                evict: false,
            }
        } else {
            let way = cache.replace_block(found.set);
            Probe {
                hit: false,
                set: found.set,
                way,
                evict: cache.block(found.set, way).valid,
            }
        }
    });

    let next = match probe {
        // main memory always hits
        None => {
            module.stats.record_effective_read(true);
            mem.stacks.get_mut(id).hit = true;
            debug!(
                "{} {} read module=\"{}\" addr={:#x} bank={} read_port={}",
                cycle, access, module.name, addr, loc.bank, index
            );
            ReadState::Unlock
        }
        Some(probe) => {
            module.stats.record_effective_read(probe.hit);
            if probe.evict {
                module.stats.record_eviction();
            }
            let stack = mem.stacks.get_mut(id);
            stack.hit = probe.hit;
            stack.set = probe.set;
            stack.way = probe.way;
            debug!(
                "{} {} read module=\"{}\" addr={:#x} bank={} read_port={} set={} way={} hit={}",
                cycle, access, module.name, addr, loc.bank, index, probe.set, probe.way, probe.hit
            );
            if probe.hit {
                ReadState::Unlock
            } else {
                ReadState::Request
            }
        }
    };
    engine.schedule(mem.events.read(next), Payload::Stack(id), latency);
}

fn read_request<S: MemWorld>(engine: &mut EventScheduler<S>, mem: &mut MemSystem, id: StackId) {
    let (low_net, target, target_high) = mem.low_path(id);
    mem.stacks.get_mut(id).target = Some(target);
    trace_send(engine, mem, id, "read_request", target, low_net);
    let msg = mem.send(
        engine,
        id,
        low_net,
        target_high,
        MESSAGE_HEADER,
        mem.events.read(ReadState::RequestReceive),
        mem.events.read(ReadState::Request),
    );
    mem.stacks.get_mut(id).msg = msg;
}

fn read_request_receive<S: MemWorld>(
    engine: &mut EventScheduler<S>,
    mem: &mut MemSystem,
    id: StackId,
) {
    let (access, target, tag) = mem.receive_at_target(engine, id);
    debug!(
        "  {} {} read_request_receive module=\"{}\"",
        mem.cycle(engine),
        access,
        mem.modules[target].name
    );
    let child = mem.new_stack(
        engine,
        Some(access),
        AccessKind::Read,
        target,
        tag,
        mem.events.read(ReadState::RequestReply),
        Payload::Stack(id),
        None,
    );
    engine.schedule(mem.events.read(ReadState::Read), Payload::Stack(child), 0);
}

fn read_request_reply<S: MemWorld>(
    engine: &mut EventScheduler<S>,
    mem: &mut MemSystem,
    id: StackId,
) {
    let (low_net, target, target_high) = mem.low_path(id);
    trace_send(engine, mem, id, "read_request_reply", target, low_net);
    let block_size = mem.modules[mem.stacks.get(id).module].block_size;
    let msg = mem.send(
        engine,
        id,
        target_high,
        low_net,
        block_size + MESSAGE_HEADER,
        mem.events.read(ReadState::RequestFinish),
        mem.events.read(ReadState::RequestReply),
    );
    mem.stacks.get_mut(id).msg = msg;
}

fn read_request_finish<S: MemWorld>(
    engine: &mut EventScheduler<S>,
    mem: &mut MemSystem,
    id: StackId,
) {
    let access = mem.receive_at_source(engine, id);
    debug!("  {} {} read_request_finish", mem.cycle(engine), access);

    let stack = mem.stacks.get(id);
    let (module_id, set, way, tag) = (stack.module, stack.set, stack.way, stack.tag);
    let module = &mut mem.modules[module_id];
    let cache = module
        .cache
        .as_mut()
        .unwrap_or_else(|| panic!("module '{}' filled a block without a cache", module.name));
    cache.set_block(set, way, tag, true);
    engine.schedule(mem.events.read(ReadState::Unlock), Payload::Stack(id), 0);
}

fn read_unlock<S: MemWorld>(engine: &mut EventScheduler<S>, mem: &mut MemSystem, id: StackId) {
    let stack = mem.stacks.get(id);
    let (access, module_id, set, way) = (stack.id, stack.module, stack.set, stack.way);
    debug!("  {} {} read_unlock", mem.cycle(engine), access);

    if let Some(cache) = mem.modules[module_id].cache.as_mut() {
        cache.access_block(set, way);
    }
    mem.unlock_port(engine, id);
    engine.schedule(mem.events.read(ReadState::Finish), Payload::Stack(id), 0);
}

fn read_finish<S: MemWorld>(engine: &mut EventScheduler<S>, mem: &mut MemSystem, id: StackId) {
    let stack = mem.stacks.get(id);
    debug!("  {} {} read_finish", mem.cycle(engine), stack.id);
    if let Some(witness) = &stack.witness {
        witness.bump();
    }
    mem.stack_return(engine, id);
}

fn write<S: MemWorld>(engine: &mut EventScheduler<S>, mem: &mut MemSystem, id: StackId) {
    let cycle = mem.cycle(engine);
    let retry = mem.events.write(WriteState::Write);
    let (access, module_id, addr) = {
        let stack = mem.stacks.get(id);
        (stack.id, stack.module, stack.addr)
    };
    let module = &mem.modules[module_id];

    let blocked = if !module.waiting.is_empty() {
        Some(WaitReason::Order)
    } else if module.read_ports.locked_count() > 0 {
        // writes may overtake reads further down, so they wait for every read to leave
        Some(WaitReason::WriteAfterRead)
    } else {
        None
    };
    if let Some(reason) = blocked {
        debug!(
            "{} {} write module=\"{}\" addr={:#x} wait why=\"{}\"",
            cycle, access, module.name, addr, reason
        );
        mem.wait_in_module(id, retry, reason);
        return;
    }

    let loc = module.locate(addr);
    let same_tag = module.write_ports.find_same_tag(loc.bank, loc.tag);
    let free = module.write_ports.find_free(loc.bank);
    {
        let stack = mem.stacks.get_mut(id);
        stack.tag = loc.tag;
        stack.block_index = loc.block_index;
        stack.bank = loc.bank;
    }

    if let Some(found) = same_tag {
        if found.lock_cycle == cycle {
            let owner_access = mem.stacks.get(found.owner).id;
            let port = PortRef {
                kind: PortKind::Write,
                bank: loc.bank,
                index: found.index,
            };
            debug!(
                "{} {} write module=\"{}\" addr={:#x} bank={} coalesce id={} write_port={}",
                cycle,
                access,
                mem.modules[module_id].name,
                addr,
                loc.bank,
                owner_access,
                found.index
            );
            mem.wait_in_port(id, port, mem.events.write(WriteState::Finish));
            if let Some(witness) = &mem.stacks.get(id).witness {
                witness.bump();
            }
            mem.modules[module_id].stats.record_write(true);
            return;
        }

        debug!(
            "{} {} write module=\"{}\" addr={:#x} wait why=\"{}\"",
            cycle,
            access,
            mem.modules[module_id].name,
            addr,
            WaitReason::InFlight
        );
        mem.wait_in_module(id, retry, WaitReason::InFlight);
        return;
    }

    let Some(index) = free else {
        debug!(
            "{} {} write module=\"{}\" addr={:#x} bank={} wait why=\"{}\"",
            cycle,
            access,
            mem.modules[module_id].name,
            addr,
            loc.bank,
            WaitReason::NoWritePort
        );
        mem.wait_in_module(id, retry, WaitReason::NoWritePort);
        return;
    };

    let port = PortRef {
        kind: PortKind::Write,
        bank: loc.bank,
        index,
    };
    mem.lock_port(id, port, loc.tag, cycle);
    debug!(
        "{} {} write module=\"{}\" addr={:#x} bank={} write_port={}",
        cycle, access, mem.modules[module_id].name, addr, loc.bank, index
    );

    // the write counts as accepted once it holds a port
    if let Some(witness) = &mem.stacks.get(id).witness {
        witness.bump();
    }

    let unlock = mem.events.write(WriteState::Unlock);
    let module = &mut mem.modules[module_id];
    module.stats.record_write(false);
    let latency = module.latency;

    let Some(cache) = module.cache.as_ref() else {
        module.stats.record_effective_write(true);
        let stack = mem.stacks.get_mut(id);
        stack.hit = true;
        stack.pending += 1;
        engine.schedule(unlock, Payload::Stack(id), latency);
        return;
    };

    // the block is only updated if present; the write always goes down
    let found = cache.find_block(loc.tag);
    module.stats.record_effective_write(found.hit);
    let stack = mem.stacks.get_mut(id);
    stack.hit = found.hit;
    stack.set = found.set;
    stack.way = found.way;
    stack.pending += 2;
    engine.schedule(unlock, Payload::Stack(id), latency);
    engine.schedule(
        mem.events.write(WriteState::RequestSend),
        Payload::Stack(id),
        0,
    );
}

fn write_request_send<S: MemWorld>(
    engine: &mut EventScheduler<S>,
    mem: &mut MemSystem,
    id: StackId,
) {
    let (low_net, target, target_high) = mem.low_path(id);
    mem.stacks.get_mut(id).target = Some(target);
    trace_send(engine, mem, id, "write_request_send", target, low_net);
    let msg = mem.send(
        engine,
        id,
        low_net,
        target_high,
        MESSAGE_HEADER,
        mem.events.write(WriteState::RequestReceive),
        mem.events.write(WriteState::RequestSend),
    );
    mem.stacks.get_mut(id).msg = msg;
}

fn write_request_receive<S: MemWorld>(
    engine: &mut EventScheduler<S>,
    mem: &mut MemSystem,
    id: StackId,
) {
    let (access, target, tag) = mem.receive_at_target(engine, id);
    debug!(
        "  {} {} write_request_receive module=\"{}\"",
        mem.cycle(engine),
        access,
        mem.modules[target].name
    );
    let child = mem.new_stack(
        engine,
        Some(access),
        AccessKind::Write,
        target,
        tag,
        mem.events.write(WriteState::RequestReply),
        Payload::Stack(id),
        None,
    );
    engine.schedule(
        mem.events.write(WriteState::Write),
        Payload::Stack(child),
        0,
    );
}

fn write_request_reply<S: MemWorld>(
    engine: &mut EventScheduler<S>,
    mem: &mut MemSystem,
    id: StackId,
) {
    let (low_net, target, target_high) = mem.low_path(id);
    trace_send(engine, mem, id, "write_request_reply", target, low_net);
    let msg = mem.send(
        engine,
        id,
        target_high,
        low_net,
        MESSAGE_HEADER,
        mem.events.write(WriteState::RequestReplyReceive),
        mem.events.write(WriteState::RequestReply),
    );
    mem.stacks.get_mut(id).msg = msg;
}

fn write_request_reply_receive<S: MemWorld>(
    engine: &mut EventScheduler<S>,
    mem: &mut MemSystem,
    id: StackId,
) {
    let access = mem.receive_at_source(engine, id);
    debug!("  {} {} write_request_reply_receive", mem.cycle(engine), access);
    engine.schedule(
        mem.events.write(WriteState::Unlock),
        Payload::Stack(id),
        0,
    );
}

fn write_unlock<S: MemWorld>(engine: &mut EventScheduler<S>, mem: &mut MemSystem, id: StackId) {
    let stack = mem.stacks.get_mut(id);
    assert!(
        stack.pending > 0,
        "access {} unlocked with nothing pending",
        stack.id
    );
    stack.pending -= 1;
    if stack.pending > 0 {
        return;
    }

    let (access, module_id, hit, set, way) =
        (stack.id, stack.module, stack.hit, stack.set, stack.way);
    debug!("  {} {} write_unlock", mem.cycle(engine), access);

    if hit {
        if let Some(cache) = mem.modules[module_id].cache.as_mut() {
            cache.access_block(set, way);
        }
    }
    mem.unlock_port(engine, id);
    engine.schedule(
        mem.events.write(WriteState::Finish),
        Payload::Stack(id),
        0,
    );
}

fn write_finish<S: MemWorld>(engine: &mut EventScheduler<S>, mem: &mut MemSystem, id: StackId) {
    debug!("  {} {} write_finish", mem.cycle(engine), mem.stacks.get(id).id);
    mem.stack_return(engine, id);
}

fn trace_send<S: MemWorld>(
    engine: &EventScheduler<S>,
    mem: &MemSystem,
    id: StackId,
    what: &str,
    target: ModuleId,
    net: NetPoint,
) {
    let stack = mem.stacks.get(id);
    debug!(
        "  {} {} {} module=\"{}\" low=\"{}\" net=\"{}\"",
        mem.cycle(engine),
        stack.id,
        what,
        mem.modules[stack.module].name,
        mem.modules[target].name,
        mem.networks[net.net].name()
    );
}

