use std::collections::HashMap;

use anyhow::Context;
use log::{debug, info};
use serde::Serialize;

use super::config::TrafficConfig;
use super::patterns::AccessGen;
use crate::engine::{DomainId, EventId, EventScheduler, Time};
use crate::mem::{AccessKind, Addr, MemSystem, MemWorld, ModuleId, Payload, Witness};
use crate::timeq::Cycle;

/// A world that hosts a traffic driver next to its memory hierarchy.
pub trait TrafficWorld: MemWorld {
    fn traffic(&mut self) -> (&mut EventScheduler<Self>, &mut MemSystem, &mut TrafficDriver);
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TrafficStats {
    pub issued: u64,
    pub completed: u64,
    pub reads: u64,
    pub writes: u64,
    /// Reads finished plus writes accepted, as counted by the witnesses.
    pub accepted: u64,
    /// Client cycles from issue to completion.
    pub total_latency: u64,
    pub max_latency: u64,
}

impl TrafficStats {
    pub fn mean_latency(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        self.total_latency as f64 / self.completed as f64
    }
}

/// One client bound to a memory entry point.
#[derive(Debug)]
struct Stream {
    name: String,
    module: ModuleId,
    access_gen: AccessGen,
    issued: u64,
    inflight: usize,
    witness: Witness,
    done_at: Option<Cycle>,
}

#[derive(Debug)]
struct Outstanding {
    stream: usize,
    kind: AccessKind,
    addr: Addr,
    issued_at: Time,
}

/// Synthetic clients issuing accesses into the hierarchy under an in-flight limit.
#[derive(Debug)]
pub struct TrafficDriver {
    domain: DomainId,
    tick_event: EventId,
    complete_event: EventId,
    accesses: u64,
    max_inflight: usize,
    issue_per_cycle: usize,
    streams: Vec<Stream>,
    outstanding: HashMap<u64, Outstanding>,
    next_token: u64,
    stopped: bool,
    stats: TrafficStats,
}

impl TrafficDriver {
    /// Register the client clock and events, one stream per entry point of `mem`.
    pub fn new<S: TrafficWorld>(
        engine: &mut EventScheduler<S>,
        mem: &MemSystem,
        config: &TrafficConfig,
        frequency: u32,
    ) -> anyhow::Result<Self> {
        config.validate().context("invalid traffic configuration")?;
        let domain = engine
            .new_domain("client", frequency)
            .context("client clock")?;
        let tick_event = engine.register_event("traffic_tick", domain, Self::tick::<S>);
        let complete_event = engine.register_event("traffic_complete", domain, Self::complete::<S>);

        let streams = mem
            .entries()
            .enumerate()
            .map(|(index, (name, module))| Stream {
                name: name.to_string(),
                module,
                access_gen: AccessGen::new(config, index),
                issued: 0,
                inflight: 0,
                witness: Witness::new(),
                done_at: None,
            })
            .collect();

        Ok(Self {
            domain,
            tick_event,
            complete_event,
            accesses: config.accesses,
            max_inflight: config.max_inflight,
            issue_per_cycle: config.issue_per_cycle,
            streams,
            outstanding: HashMap::new(),
            next_token: 0,
            stopped: false,
            stats: TrafficStats::default(),
        })
    }

    pub fn start<S: TrafficWorld>(&mut self, engine: &mut EventScheduler<S>) {
        if !self.all_issued() {
            engine.schedule(self.tick_event, Payload::Client(0), 0);
        }
    }

    /// Stop issuing. Outstanding accesses still complete.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn all_issued(&self) -> bool {
        self.streams.iter().all(|s| s.issued >= self.accesses)
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Every access issued and completed.
    pub fn is_done(&self) -> bool {
        self.all_issued() && self.outstanding.is_empty()
    }

    pub fn stats(&self) -> TrafficStats {
        TrafficStats {
            accepted: self.streams.iter().map(|s| s.witness.get()).sum(),
            ..self.stats
        }
    }

    fn tick<S: TrafficWorld>(sim: &mut S, _: EventId, _: Payload) {
        let (engine, mem, traffic) = sim.traffic();
        if traffic.stopped {
            return;
        }
        let cycle = engine.domain_cycle(traffic.domain);
        let now = engine.time();
        for index in 0..traffic.streams.len() {
            for _ in 0..traffic.issue_per_cycle {
                let stream = &mut traffic.streams[index];
                if stream.issued >= traffic.accesses || stream.inflight >= traffic.max_inflight {
                    break;
                }
                let (kind, addr) = stream.access_gen.next_access();
                let witness = Some(stream.witness.clone());
                let module = stream.module;
                stream.issued += 1;
                stream.inflight += 1;

                let token = traffic.next_token;
                traffic.next_token += 1;
                let ret = Payload::Client(token);
                match kind {
                    AccessKind::Read => {
                        mem.issue_read(engine, module, addr, traffic.complete_event, ret, witness);
                        traffic.stats.reads += 1;
                    }
                    AccessKind::Write => {
                        mem.issue_write(engine, module, addr, traffic.complete_event, ret, witness);
                        traffic.stats.writes += 1;
                    }
                }
                traffic.stats.issued += 1;
                traffic.outstanding.insert(
                    token,
                    Outstanding {
                        stream: index,
                        kind,
                        addr,
                        issued_at: now,
                    },
                );
                debug!(
                    "{} client \"{}\" issue {:?} addr={:#x} token={}",
                    cycle, traffic.streams[index].name, kind, addr, token
                );
            }
        }

        if !traffic.all_issued() {
            engine.schedule(traffic.tick_event, Payload::Client(0), 1);
        }
    }

    fn complete<S: TrafficWorld>(sim: &mut S, _: EventId, payload: Payload) {
        let (engine, _, traffic) = sim.traffic();
        let token = payload.client();
        let done = traffic
            .outstanding
            .remove(&token)
            .unwrap_or_else(|| panic!("traffic token {} completed twice or never issued", token));
        let cycle = engine.domain_cycle(traffic.domain);
        let latency = (engine.time() - done.issued_at) / engine.domain_cycle_time(traffic.domain);

        let stats = &mut traffic.stats;
        stats.completed += 1;
        stats.total_latency = stats.total_latency.saturating_add(latency);
        stats.max_latency = stats.max_latency.max(latency);

        let accesses = traffic.accesses;
        let stream = &mut traffic.streams[done.stream];
        stream.inflight -= 1;
        debug!(
            "{} client \"{}\" complete {:?} addr={:#x} token={} latency={}",
            cycle, stream.name, done.kind, done.addr, token, latency
        );
        if stream.issued >= accesses && stream.inflight == 0 && stream.done_at.is_none() {
            stream.done_at = Some(cycle);
            info!("client \"{}\" done at cycle {}", stream.name, cycle);
        }
    }
}
