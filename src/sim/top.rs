use log::{info, warn};
use serde::Serialize;

use crate::engine::{EventScheduler, FinishReason, Simulation, Time};
use crate::mem::{MemReport, MemSystem, MemWorld, Payload};
use crate::sim::config::{SimConfig, TopConfig};
use crate::timeq::Cycle;
use crate::traffic::{TrafficDriver, TrafficStats, TrafficWorld};

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub finish: FinishReason,
    /// Base cycles simulated before teardown.
    pub cycles: Cycle,
    /// Picoseconds at the end of teardown.
    pub time: Time,
    pub events: u64,
    pub idle_cycles: u64,
    pub traffic: TrafficStats,
    /// Mean client cycles from issue to completion.
    pub mean_latency: f64,
    pub mem: MemReport,
}

/// Top-level world: the scheduler, the memory hierarchy and its clients.
pub struct MemSim {
    engine: EventScheduler<MemSim>,
    mem: MemSystem,
    traffic: TrafficDriver,
    config: SimConfig,
}

impl Simulation for MemSim {
    type Payload = Payload;

    fn engine(&mut self) -> &mut EventScheduler<Self> {
        &mut self.engine
    }

    fn engine_ref(&self) -> &EventScheduler<Self> {
        &self.engine
    }
}

impl MemWorld for MemSim {
    fn mem(&mut self) -> (&mut EventScheduler<Self>, &mut MemSystem) {
        (&mut self.engine, &mut self.mem)
    }
}

impl TrafficWorld for MemSim {
    fn traffic(&mut self) -> (&mut EventScheduler<Self>, &mut MemSystem, &mut TrafficDriver) {
        (&mut self.engine, &mut self.mem, &mut self.traffic)
    }
}

impl MemSim {
    pub fn new(config: &TopConfig) -> anyhow::Result<Self> {
        let mut engine = EventScheduler::new(config.engine);
        let mem = MemSystem::new(&mut engine, &config.mem)?;
        let traffic =
            TrafficDriver::new(&mut engine, &mem, &config.traffic, config.sim.client_frequency)?;
        Ok(Self {
            engine,
            mem,
            traffic,
            config: config.sim.clone(),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn mem_ref(&self) -> &MemSystem {
        &self.mem
    }

    pub fn traffic_ref(&self) -> &TrafficDriver {
        &self.traffic
    }

    fn finish_reason(&self) -> Option<FinishReason> {
        let idle = self.engine.event_count() == 0;
        if self.traffic.is_done() && idle {
            Some(FinishReason::Completed)
        } else if self.engine.cycle() > self.config.max_cycles {
            Some(FinishReason::MaxCycles)
        } else if idle {
            Some(FinishReason::Stall)
        } else {
            None
        }
    }

    /// Run until the clients are done, the cycle limit is hit, or nothing is left to do, then
    /// drain whatever is still in flight.
    pub fn simulate(&mut self) -> RunSummary {
        self.traffic.start(&mut self.engine);
        let finish = loop {
            if let Some(reason) = self.finish_reason() {
                break reason;
            }
            EventScheduler::process_events(self, false);
        };
        let cycles = self.engine.cycle();
        self.engine.set_finish(finish);
        match finish {
            FinishReason::Completed => info!("simulation completed at cycle {}", cycles),
            FinishReason::MaxCycles => warn!(
                "simulation stopped at cycle limit {} with {} accesses outstanding",
                self.config.max_cycles,
                self.traffic.outstanding()
            ),
            _ => warn!(
                "simulation stalled at cycle {}: no events left with {} accesses outstanding",
                cycles,
                self.traffic.outstanding()
            ),
        }

        self.traffic.stop();
        EventScheduler::process_all_events(self);

        let traffic = self.traffic.stats();
        RunSummary {
            finish,
            cycles,
            time: self.engine.time(),
            events: self.engine.processed_events(),
            idle_cycles: self.engine.no_forward_cycles(),
            traffic,
            mean_latency: traffic.mean_latency(),
            mem: self.mem.report(),
        }
    }
}
