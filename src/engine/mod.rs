/*
Discrete-event scheduler.

Simulated time advances in picoseconds across several frequency domains.  Every registered event
belongs to one domain; scheduling an event `n` cycles ahead rounds the current time down to that
domain's cycle boundary and adds `n` domain cycles.  The heap is drained in (time, insertion
order), so equal-time events fire in the order they were scheduled and every run is reproducible.

The scheduler is owned by the simulation world it drives.  Handlers receive the whole world
(`&mut S`), which lets them reach both the scheduler and whatever state they model; the
associated functions `process_events`, `execute_event`, `process_all_events` and `empty` take
the world for that reason.
*/

mod config;
mod domain;
mod event;

#[cfg(test)]
mod tests;

pub use config::EngineConfig;
pub use domain::{DomainId, FrequencyDomain, MAX_FREQUENCY, PS_PER_US};
pub use event::{EventDescriptor, EventHandler, EventId, ScheduledEvent, EV_INVALID, EV_NONE};

use std::collections::{BinaryHeap, VecDeque};
use std::fmt::{self, Write as _};
use std::rc::Rc;

use log::{trace, warn};
use serde::Serialize;

use crate::timeq::Cycle;

/// Simulated time in picoseconds.
pub type Time = u64;

/// A world driven by an [`EventScheduler`].
pub trait Simulation: Sized + 'static {
    type Payload: Clone + fmt::Debug + 'static;

    fn engine(&mut self) -> &mut EventScheduler<Self>;

    fn engine_ref(&self) -> &EventScheduler<Self>;
}

/// Why the main loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FinishReason {
    #[default]
    None,
    Completed,
    MaxCycles,
    Stall,
}

pub struct EventScheduler<S: Simulation> {
    config: EngineConfig,
    domains: Vec<FrequencyDomain>,
    // period and frequency of the fastest domain
    cycle_time: Time,
    frequency: u32,
    time: Time,
    events: Vec<EventDescriptor<S>>,
    heap: BinaryHeap<ScheduledEvent<S::Payload>>,
    end_events: VecDeque<(EventId, S::Payload)>,
    next_seq: u64,
    started: bool,
    locked: bool,
    overload_shown: bool,
    no_forward_cycles: u64,
    processed: u64,
    finish: FinishReason,
}

impl<S: Simulation> EventScheduler<S> {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            domains: Vec::new(),
            cycle_time: 0,
            frequency: 0,
            time: 0,
            events: vec![
                EventDescriptor::sentinel(EV_INVALID, "Invalid"),
                EventDescriptor::sentinel(EV_NONE, "None"),
            ],
            heap: BinaryHeap::new(),
            end_events: VecDeque::new(),
            next_seq: 0,
            started: false,
            locked: false,
            overload_shown: false,
            no_forward_cycles: 0,
            processed: 0,
            finish: FinishReason::None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a frequency domain. The fastest domain sets the base time step.
    pub fn new_domain(
        &mut self,
        name: impl Into<String>,
        frequency: u32,
    ) -> anyhow::Result<DomainId> {
        assert!(!self.started, "frequency domain created after simulation start");
        let domain = FrequencyDomain::new(name, frequency)?;
        if self.domains.is_empty() || domain.cycle_time() < self.cycle_time {
            self.cycle_time = domain.cycle_time();
            self.frequency = domain.frequency();
        }
        self.domains.push(domain);
        Ok(self.domains.len() - 1)
    }

    pub fn domain(&self, id: DomainId) -> &FrequencyDomain {
        self.domains
            .get(id)
            .unwrap_or_else(|| panic!("invalid frequency domain index ({})", id))
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    pub fn register_event<F>(
        &mut self,
        name: impl Into<String>,
        domain: DomainId,
        handler: F,
    ) -> EventId
    where
        F: Fn(&mut S, EventId, S::Payload) + 'static,
    {
        let name = name.into();
        assert!(
            !self.started,
            "event '{}' registered after simulation start",
            name
        );
        assert!(
            domain < self.domains.len(),
            "event '{}': invalid frequency domain index ({})",
            name,
            domain
        );
        let id = self.events.len();
        self.events.push(EventDescriptor {
            id,
            name,
            domain: Some(domain),
            handler: Some(Rc::new(handler)),
        });
        id
    }

    pub fn descriptor(&self, id: EventId) -> &EventDescriptor<S> {
        self.events
            .get(id)
            .unwrap_or_else(|| panic!("unknown event id {}", id))
    }

    pub fn event_name(&self, id: EventId) -> &str {
        self.descriptor(id).name()
    }

    /// Freeze the domain and event registries. Called implicitly by the first processing step.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        assert!(
            !self.domains.is_empty(),
            "simulation started without any frequency domain"
        );
        self.started = true;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn time(&self) -> Time {
        self.time
    }

    /// Cycle of the fastest domain.
    pub fn cycle(&self) -> Cycle {
        self.time / self.cycle_time.max(1) + 1
    }

    pub fn cycle_time(&self) -> Time {
        self.cycle_time
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn domain_cycle(&self, domain: DomainId) -> Cycle {
        self.domain(domain).cycle(self.time)
    }

    pub fn domain_cycle_time(&self, domain: DomainId) -> Time {
        self.domain(domain).cycle_time()
    }

    pub fn event_count(&self) -> usize {
        self.heap.len()
    }

    pub fn end_event_count(&self) -> usize {
        self.end_events.len()
    }

    /// Main-loop iterations that found nothing to do and did not move time.
    pub fn no_forward_cycles(&self) -> u64 {
        self.no_forward_cycles
    }

    pub fn processed_events(&self) -> u64 {
        self.processed
    }

    pub fn finish(&self) -> FinishReason {
        self.finish
    }

    pub fn set_finish(&mut self, reason: FinishReason) {
        self.finish = reason;
    }

    fn check_event(&self, id: EventId, caller: &str) {
        if id == EV_INVALID {
            panic!("{}: invalid event - forgot to register?", caller);
        }
        if id >= self.events.len() {
            panic!("{}: unknown event id {}", caller, id);
        }
    }

    /// Schedule `id` to run `cycles` cycles of its own domain from now.
    pub fn schedule(&mut self, id: EventId, payload: S::Payload, cycles: u64) {
        if self.locked {
            trace!("schedule of event {} dropped while draining", id);
            return;
        }
        self.check_event(id, "schedule");
        if id == EV_NONE {
            return;
        }

        let domain_id = self.events[id]
            .domain
            .expect("registered events always have a domain");
        let domain = &self.domains[domain_id];
        let when = domain.align(self.time) + domain.cycle_time() * cycles;
        self.push(when, id, payload);

        if !self.overload_shown && self.heap.len() >= self.config.overload_events {
            self.overload_shown = true;
            warn!(
                "number of in-flight events exceeds {}: a timing model is probably issuing \
                 accesses without checking a limit on in-flight work",
                self.config.overload_events
            );
        }
    }

    /// Queue `id` to run once during [`Self::process_all_events`].
    pub fn schedule_end_event(&mut self, id: EventId, payload: S::Payload) {
        if self.locked {
            trace!("end event {} dropped while draining", id);
            return;
        }
        self.check_event(id, "schedule_end_event");
        if id == EV_NONE {
            return;
        }
        self.end_events.push_back((id, payload));
    }

    fn push(&mut self, when: Time, id: EventId, payload: S::Payload) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent {
            when,
            seq,
            id,
            payload,
        });
    }

    fn handler(&self, id: EventId) -> EventHandler<S> {
        self.events[id]
            .handler
            .clone()
            .unwrap_or_else(|| panic!("event '{}' has no handler", self.events[id].name))
    }

    fn pop_due(&mut self) -> Option<ScheduledEvent<S::Payload>> {
        if self.heap.peek()?.when > self.time {
            return None;
        }
        self.heap.pop()
    }

    /// Run the handler of `id` right now, bypassing the heap.
    pub fn execute_event(sim: &mut S, id: EventId, payload: S::Payload) {
        let engine = sim.engine();
        if engine.locked {
            trace!("execution of event {} dropped while draining", id);
            return;
        }
        engine.check_event(id, "execute_event");
        if id == EV_NONE {
            return;
        }
        let handler = engine.handler(id);
        engine.processed += 1;
        handler(sim, id, payload);
    }

    /// Run every event due at the current time, then advance one base cycle.
    ///
    /// Unless `forward` is set, an empty heap leaves time where it is.
    pub fn process_events(sim: &mut S, forward: bool) {
        let engine = sim.engine();
        engine.start();
        if !forward && engine.heap.is_empty() {
            engine.no_forward_cycles += 1;
            return;
        }

        loop {
            let engine = sim.engine();
            let Some(event) = engine.pop_due() else {
                break;
            };
            let handler = engine.handler(event.id);
            engine.processed += 1;
            handler(sim, event.id, event.payload);
        }

        let engine = sim.engine();
        engine.time += engine.cycle_time;
    }

    /// Teardown: drain the heap, run the end events, then drain again.
    pub fn process_all_events(sim: &mut S) {
        Self::drain_heap(sim);

        loop {
            let engine = sim.engine();
            let Some((id, payload)) = engine.end_events.pop_front() else {
                break;
            };
            let handler = engine.handler(id);
            engine.processed += 1;
            handler(sim, id, payload);
        }

        Self::drain_heap(sim);
    }

    fn drain_heap(sim: &mut S) {
        let max = sim.engine_ref().config.max_finalization_events;
        let mut count = 0u64;
        loop {
            let engine = sim.engine();
            engine.start();
            if engine.heap.is_empty() {
                break;
            }
            if count >= max {
                let dump = engine.dump(20);
                panic!(
                    "number of finalization events exceeds {}: some event keeps scheduling \
                     others and the simulation cannot finish\n{}",
                    max, dump
                );
            }

            let event = engine.heap.pop().expect("heap checked non-empty");
            engine.time = engine.time.max(event.when);
            let handler = engine.handler(event.id);
            engine.processed += 1;
            handler(sim, event.id, event.payload);
            count += 1;
        }
    }

    /// Process every pending event with scheduling locked: anything the handlers schedule is
    /// discarded.
    pub fn empty(sim: &mut S) {
        sim.engine().locked = true;
        loop {
            let engine = sim.engine();
            let Some(event) = engine.heap.pop() else {
                break;
            };
            let handler = engine.handler(event.id);
            engine.processed += 1;
            handler(sim, event.id, event.payload);
        }
        sim.engine().locked = false;
    }

    /// Describe up to `max` pending events (all of them if `max` is zero), earliest first.
    pub fn dump(&self, max: usize) -> String {
        let mut pending: Vec<&ScheduledEvent<S::Payload>> = self.heap.iter().collect();
        pending.sort_by(|a, b| b.cmp(a));
        let shown = if max == 0 {
            pending.len()
        } else {
            max.min(pending.len())
        };

        let mut out = String::new();
        let _ = writeln!(out, "event heap state at simulated time {} ps", self.time);
        for event in &pending[..shown] {
            let _ = writeln!(
                out,
                "\t{{ event = '{}', time = {}, rel. time = {} }}",
                self.events[event.id].name,
                event.when,
                event.when as i128 - self.time as i128
            );
        }
        if shown < pending.len() {
            let _ = writeln!(out, "\t\t+ {} more", pending.len() - shown);
        }
        let _ = writeln!(out, "total: {} event(s)", pending.len());
        out
    }
}
