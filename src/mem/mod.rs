/*
Cache and memory-hierarchy timing model.

The hierarchy is a tree of modules (caches over a terminal main memory) joined by networks.
Clients issue reads and writes against an entry module; each access becomes a request context
that the read or write pipeline in `access` drives to completion on the shared EventScheduler,
then resumes the client through its return event.

Modules own their ports and waiting lists; `MemSystem` owns the modules, the networks and the
arena of live request contexts.
*/

mod access;
mod cache;
mod config;
mod module;
mod network;
mod policy;
mod port;
mod report;
mod stack;
mod stats;
mod waiting;


pub use access::{ReadState, WriteState};
pub use cache::{Cache, CacheBlock, Lookup};
pub use config::{
    CacheGeometry, CacheSpec, EntrySpec, GlobalMemorySpec, MemConfig, NetworkSpec,
    GLOBAL_MEMORY, MAX_LEVELS, MESSAGE_HEADER,
};
pub use module::{Location, MemModule, ModuleId, ModuleKind};
pub use network::{Message, MessageId, NetPoint, Network, NetworkId, NodeId};
pub use policy::ReplacementPolicy;
pub use port::{Port, PortKind, PortRef, PortSet, TagMatch};
pub use report::{CacheReport, MemReport, ModuleReport, NetworkReport};
pub use stack::{AccessKind, ModStack, StackArena, StackId, Witness};
pub use stats::{ModStats, NetworkStats, WaitReason};
pub use waiting::{Waiter, WaitingList};

use anyhow::Context;

use crate::engine::{DomainId, EventId, EventScheduler, Simulation, EV_INVALID};
use crate::timeq::{Cycle, ServerConfig};

pub type Addr = u64;

/// Event payload of a world hosting the memory hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// A request context driven by the access pipeline.
    Stack(StackId),
    /// An opaque token owned by a client.
    Client(u64),
}

impl Payload {
    pub fn stack(self) -> StackId {
        match self {
            Self::Stack(id) => id,
            Self::Client(token) => panic!("memory event received client payload {}", token),
        }
    }

    pub fn client(self) -> u64 {
        match self {
            Self::Client(token) => token,
            Self::Stack(id) => panic!("client event received request context {:?}", id),
        }
    }
}

/// A simulation world that hosts a `MemSystem`.
pub trait MemWorld: Simulation<Payload = Payload> {
    fn mem(&mut self) -> (&mut EventScheduler<Self>, &mut MemSystem);
}

/// Event ids of the pipeline states.
#[derive(Debug, Clone, Copy)]
pub struct MemEvents {
    read: [EventId; ReadState::COUNT],
    write: [EventId; WriteState::COUNT],
}

impl MemEvents {
    fn register<S: MemWorld>(engine: &mut EventScheduler<S>, domain: DomainId) -> Self {
        let mut read = [EV_INVALID; ReadState::COUNT];
        for state in ReadState::ALL {
            read[state as usize] = engine.register_event(
                state.event_name(),
                domain,
                move |sim: &mut S, _, payload| access::handle_read(sim, state, payload),
            );
        }
        let mut write = [EV_INVALID; WriteState::COUNT];
        for state in WriteState::ALL {
            write[state as usize] = engine.register_event(
                state.event_name(),
                domain,
                move |sim: &mut S, _, payload| access::handle_write(sim, state, payload),
            );
        }
        Self { read, write }
    }

    pub fn read(&self, state: ReadState) -> EventId {
        self.read[state as usize]
    }

    pub fn write(&self, state: WriteState) -> EventId {
        self.write[state as usize]
    }
}

pub struct MemSystem {
    domain: DomainId,
    frequency: u32,
    events: MemEvents,
    modules: Vec<MemModule>,
    networks: Vec<Network>,
    entries: Vec<(String, ModuleId)>,
    stacks: StackArena,
    next_access_id: u64,
}

impl MemSystem {
    /// Build the hierarchy described by `config`, registering its clock domain and events.
    pub fn new<S: MemWorld>(
        engine: &mut EventScheduler<S>,
        config: &MemConfig,
    ) -> anyhow::Result<Self> {
        config.validate().context("invalid memory configuration")?;
        let domain = engine
            .new_domain("mem", config.frequency)
            .context("memory hierarchy clock")?;
        let events = MemEvents::register(engine, domain);

        let mut networks: Vec<Network> = config
            .network
            .iter()
            .map(|spec| {
                Network::new(
                    &spec.name,
                    ServerConfig {
                        base_latency: spec.latency,
                        bytes_per_cycle: spec.bandwidth,
                        buffer_bytes: spec.input_buffer_size.min(spec.output_buffer_size),
                    },
                )
            })
            .collect();

        let mut modules = Vec::with_capacity(config.cache.len() + 1);
        for (index, spec) in config.cache.iter().enumerate() {
            let geometry = config
                .geometry(&spec.geometry)
                .with_context(|| format!("cache '{}': invalid geometry", spec.name))?;
            let cache = Cache::new(
                geometry.sets,
                geometry.assoc,
                geometry.block_size,
                geometry.policy,
                config.seed.wrapping_add(index as u64),
            );
            modules.push(MemModule::new(
                &spec.name,
                ModuleKind::Cache,
                geometry.block_size,
                geometry.latency,
                geometry.banks,
                geometry.read_ports,
                geometry.write_ports,
                Some(cache),
            ));
        }
        let gm = &config.global_memory;
        modules.push(MemModule::new(
            GLOBAL_MEMORY,
            ModuleKind::MainMemory,
            gm.block_size,
            gm.latency,
            gm.banks,
            gm.read_ports,
            gm.write_ports,
            None,
        ));

        let module_id = |name: &str| -> anyhow::Result<ModuleId> {
            if name == GLOBAL_MEMORY {
                return Ok(config.cache.len());
            }
            config
                .cache
                .iter()
                .position(|spec| spec.name == name)
                .with_context(|| format!("invalid module name '{}'", name))
        };
        let mut attach = |net: &str, module: &str| -> anyhow::Result<NetPoint> {
            let id = config
                .network
                .iter()
                .position(|spec| spec.name == net)
                .with_context(|| format!("{}: invalid network name '{}'", module, net))?;
            Ok(NetPoint {
                net: id,
                node: networks[id].add_node(module),
            })
        };

        for (id, spec) in config.cache.iter().enumerate() {
            if let Some(net) = &spec.high_network {
                modules[id].high_net = Some(attach(net, &spec.name)?);
            }
            if let Some(net) = &spec.low_network {
                modules[id].low_net = Some(attach(net, &spec.name)?);
            }
            modules[id].low_module = Some(module_id(&spec.low_module)?);
        }
        if let Some(net) = &gm.high_network {
            modules[config.cache.len()].high_net = Some(attach(net, GLOBAL_MEMORY)?);
        }

        let entries = config
            .entry
            .iter()
            .map(|entry| -> anyhow::Result<(String, ModuleId)> {
                Ok((entry.name.clone(), module_id(&entry.module)?))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            domain,
            frequency: config.frequency,
            events,
            modules,
            networks,
            entries,
            stacks: StackArena::default(),
            next_access_id: 1,
        })
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }

    pub fn events(&self) -> &MemEvents {
        &self.events
    }

    pub fn module(&self, id: ModuleId) -> &MemModule {
        &self.modules[id]
    }

    pub fn modules(&self) -> &[MemModule] {
        &self.modules
    }

    pub fn module_by_name(&self, name: &str) -> Option<ModuleId> {
        self.modules.iter().position(|module| module.name == name)
    }

    /// First module of the client called `name`.
    pub fn entry(&self, name: &str) -> Option<ModuleId> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|&(_, module)| module)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, ModuleId)> {
        self.entries
            .iter()
            .map(|(name, module)| (name.as_str(), *module))
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    pub fn stack(&self, id: StackId) -> &ModStack {
        self.stacks.get(id)
    }

    /// Request contexts not yet returned, including child accesses.
    pub fn live_accesses(&self) -> usize {
        self.stacks.live()
    }

    pub fn issue_read<S: MemWorld>(
        &mut self,
        engine: &mut EventScheduler<S>,
        module: ModuleId,
        addr: Addr,
        ret_event: EventId,
        ret_payload: Payload,
        witness: Option<Witness>,
    ) -> StackId {
        self.issue(engine, AccessKind::Read, module, addr, ret_event, ret_payload, witness)
    }

    pub fn issue_write<S: MemWorld>(
        &mut self,
        engine: &mut EventScheduler<S>,
        module: ModuleId,
        addr: Addr,
        ret_event: EventId,
        ret_payload: Payload,
        witness: Option<Witness>,
    ) -> StackId {
        self.issue(engine, AccessKind::Write, module, addr, ret_event, ret_payload, witness)
    }

    #[allow(clippy::too_many_arguments)]
    fn issue<S: MemWorld>(
        &mut self,
        engine: &mut EventScheduler<S>,
        kind: AccessKind,
        module: ModuleId,
        addr: Addr,
        ret_event: EventId,
        ret_payload: Payload,
        witness: Option<Witness>,
    ) -> StackId {
        assert!(
            module < self.modules.len(),
            "access issued to unknown module {}",
            module
        );
        let id = self.new_stack(
            engine, None, kind, module, addr, ret_event, ret_payload, witness,
        );
        let event = match kind {
            AccessKind::Read => self.events.read(ReadState::Read),
            AccessKind::Write => self.events.write(WriteState::Write),
        };
        engine.schedule(event, Payload::Stack(id), 0);
        id
    }

    pub fn report(&self) -> MemReport {
        let mut totals = ModStats::default();
        for module in &self.modules {
            totals += module.stats();
        }
        MemReport {
            frequency: self.frequency,
            modules: self.modules.iter().map(ModuleReport::from).collect(),
            networks: self.networks.iter().map(NetworkReport::from).collect(),
            totals,
        }
    }

    fn cycle<S: Simulation>(&self, engine: &EventScheduler<S>) -> Cycle {
        engine.domain_cycle(self.domain)
    }

    #[allow(clippy::too_many_arguments)]
    fn new_stack<S: Simulation>(
        &mut self,
        engine: &EventScheduler<S>,
        parent: Option<u64>,
        kind: AccessKind,
        module: ModuleId,
        addr: Addr,
        ret_event: EventId,
        ret_payload: Payload,
        witness: Option<Witness>,
    ) -> StackId {
        let access = self.next_access_id;
        self.next_access_id += 1;
        let issued_at = self.cycle(engine);
        self.stacks.insert(ModStack::new(
            access,
            parent,
            kind,
            module,
            addr,
            ret_event,
            ret_payload,
            witness,
            issued_at,
        ))
    }

    fn wait_in_module(&mut self, id: StackId, event: EventId, reason: WaitReason) {
        let stack = self.stacks.get_mut(id);
        assert!(
            !stack.waiting,
            "access {} is already on a waiting list",
            stack.id
        );
        stack.waiting = true;
        let module = &mut self.modules[stack.module];
        module.waiting.push(id, event);
        module.stats.record_wait(reason);
    }

    fn wait_in_port(&mut self, id: StackId, port: PortRef, event: EventId) {
        let stack = self.stacks.get_mut(id);
        assert!(
            !stack.waiting,
            "access {} is already on a waiting list",
            stack.id
        );
        stack.waiting = true;
        stack.port = Some(port);
        let module = &mut self.modules[stack.module];
        let ports = match port.kind {
            PortKind::Read => &mut module.read_ports,
            PortKind::Write => &mut module.write_ports,
        };
        ports.wait(port.bank, port.index, id, event);
    }

    /// Resume every waiter, in list order, in the current cycle.
    fn wake<S: MemWorld>(&mut self, engine: &mut EventScheduler<S>, list: WaitingList) {
        for waiter in list {
            self.stacks.get_mut(waiter.stack).waiting = false;
            engine.schedule(waiter.event, Payload::Stack(waiter.stack), 0);
        }
    }

    fn lock_port(&mut self, id: StackId, port: PortRef, tag: Addr, cycle: Cycle) {
        let stack = self.stacks.get_mut(id);
        stack.port = Some(port);
        let module = &mut self.modules[stack.module];
        let ports = match port.kind {
            PortKind::Read => &mut module.read_ports,
            PortKind::Write => &mut module.write_ports,
        };
        ports.lock(port.bank, port.index, id, tag, cycle);
        module.stats.update_locked_ports(
            module.read_ports.locked_count(),
            module.write_ports.locked_count(),
        );
    }

    /// Release the port held by `id`, then wake the accesses coalesced on it followed by the
    /// module waiting list.
    fn unlock_port<S: MemWorld>(&mut self, engine: &mut EventScheduler<S>, id: StackId) {
        let stack = self.stacks.get_mut(id);
        let port = stack
            .port
            .take()
            .unwrap_or_else(|| panic!("access {} releases a port it does not hold", stack.id));
        let module = &mut self.modules[stack.module];
        let coalesced = match port.kind {
            PortKind::Read => module.read_ports.unlock(port.bank, port.index),
            PortKind::Write => module.write_ports.unlock(port.bank, port.index),
        };
        let blocked = module.waiting.take();
        self.wake(engine, coalesced);
        self.wake(engine, blocked);
    }

    /// Low network endpoint of the access's module, the module below, and its high endpoint.
    fn low_path(&self, id: StackId) -> (NetPoint, ModuleId, NetPoint) {
        let stack = self.stacks.get(id);
        let module = &self.modules[stack.module];
        let low_net = module
            .low_net
            .unwrap_or_else(|| panic!("module '{}' has no low network", module.name));
        let target = module
            .low_module(stack.addr)
            .unwrap_or_else(|| panic!("module '{}' has no lower-level module", module.name));
        let target_high = self.modules[target].high_net.unwrap_or_else(|| {
            panic!(
                "module '{}' has no high network",
                self.modules[target].name
            )
        });
        (low_net, target, target_high)
    }

    #[allow(clippy::too_many_arguments)]
    fn send<S: MemWorld>(
        &mut self,
        engine: &mut EventScheduler<S>,
        id: StackId,
        from: NetPoint,
        to: NetPoint,
        size: u32,
        receive_event: EventId,
        retry_event: EventId,
    ) -> Option<MessageId> {
        assert_eq!(from.net, to.net, "endpoints on different networks");
        self.networks[from.net].try_send_as_event(
            engine,
            self.domain,
            from.node,
            to.node,
            size,
            receive_event,
            retry_event,
            Payload::Stack(id),
        )
    }

    /// Consume the request message at the lower module. Returns (access id, target, tag).
    fn receive_at_target<S: MemWorld>(
        &mut self,
        engine: &EventScheduler<S>,
        id: StackId,
    ) -> (u64, ModuleId, Addr) {
        let now = self.cycle(engine);
        let stack = self.stacks.get_mut(id);
        let target = stack
            .target
            .unwrap_or_else(|| panic!("access {} has no target module", stack.id));
        let msg = stack
            .msg
            .take()
            .unwrap_or_else(|| panic!("access {} has no message to receive", stack.id));
        let (access, tag) = (stack.id, stack.tag);
        let high = self.modules[target]
            .high_net
            .unwrap_or_else(|| panic!("module '{}' has no high network", self.modules[target].name));
        self.networks[high.net].receive(high.node, msg, now);
        (access, target, tag)
    }

    /// Consume the reply message at the access's own module. Returns the access id.
    fn receive_at_source<S: MemWorld>(&mut self, engine: &EventScheduler<S>, id: StackId) -> u64 {
        let now = self.cycle(engine);
        let stack = self.stacks.get_mut(id);
        let msg = stack
            .msg
            .take()
            .unwrap_or_else(|| panic!("access {} has no message to receive", stack.id));
        let access = stack.id;
        let low = self.modules[stack.module]
            .low_net
            .unwrap_or_else(|| panic!("access {} arrived at a module without low network", access));
        self.networks[low.net].receive(low.node, msg, now);
        access
    }

    /// Schedule the return continuation, then destroy the context.
    fn stack_return<S: MemWorld>(&mut self, engine: &mut EventScheduler<S>, id: StackId) {
        let stack = self.stacks.get(id);
        assert!(
            !stack.waiting,
            "access {} returned while on a waiting list",
            stack.id
        );
        engine.schedule(stack.ret_event, stack.ret_payload, 0);
        self.stacks.remove(id);
    }
}
