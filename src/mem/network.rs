/*
Interconnect between memory modules.

Every network is a star of end nodes: each directed (source, destination) pair gets its own link,
modelled by a TimedServer that charges `ceil(size / bandwidth)` cycles of serialization plus a
fixed hop latency and bounds the bytes buffered on the link.  A sender that finds the buffer full
gets its retry event scheduled for the cycle the oldest message drains; it is never queued inside
the network.
*/

use std::collections::BTreeMap;

use log::trace;
use serde::Serialize;

use super::stats::NetworkStats;
use crate::engine::{DomainId, EventId, EventScheduler, Simulation};
use crate::timeq::{Cycle, ServerConfig, ServiceRequest, TimedServer};

pub type NetworkId = usize;
pub type NodeId = usize;
pub type MessageId = u64;

/// An end node of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetPoint {
    pub net: NetworkId,
    pub node: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub src: NodeId,
    pub dst: NodeId,
    pub size: u32,
    pub sent_at: Cycle,
    pub ready_at: Cycle,
}

#[derive(Debug)]
pub struct Network {
    name: String,
    link_config: ServerConfig,
    nodes: Vec<String>,
    links: BTreeMap<(NodeId, NodeId), TimedServer<MessageId>>,
    inflight: BTreeMap<MessageId, Message>,
    next_msg: MessageId,
    stats: NetworkStats,
}

impl Network {
    pub fn new(name: impl Into<String>, link_config: ServerConfig) -> Self {
        Self {
            name: name.into(),
            link_config,
            nodes: Vec::new(),
            links: BTreeMap::new(),
            inflight: BTreeMap::new(),
            next_msg: 0,
            stats: NetworkStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn link_config(&self) -> &ServerConfig {
        &self.link_config
    }

    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        self.nodes.push(name.into());
        self.nodes.len() - 1
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Send `size` bytes from `src` to `dst` and schedule `receive_event` at delivery.
    ///
    /// Returns `None` when the link buffer is full; `retry_event` is then scheduled for the cycle
    /// at which space frees up. Both events must live in `domain`, the network's clock.
    #[allow(clippy::too_many_arguments)]
    pub fn try_send_as_event<S: Simulation>(
        &mut self,
        engine: &mut EventScheduler<S>,
        domain: DomainId,
        src: NodeId,
        dst: NodeId,
        size: u32,
        receive_event: EventId,
        retry_event: EventId,
        payload: S::Payload,
    ) -> Option<MessageId> {
        assert!(
            src < self.nodes.len() && dst < self.nodes.len(),
            "network '{}': no route from node {} to node {}",
            self.name,
            src,
            dst
        );
        assert_ne!(src, dst, "network '{}': message sent to its own source", self.name);

        let now = engine.domain_cycle(domain);
        let link_config = self.link_config;
        let link = self
            .links
            .entry((src, dst))
            .or_insert_with(|| TimedServer::new(link_config));
        link.service_ready(now, |_| {});

        let id = self.next_msg;
        match link.try_enqueue(now, ServiceRequest::new(id, size)) {
            Ok(ticket) => {
                self.next_msg += 1;
                self.inflight.insert(
                    id,
                    Message {
                        id,
                        src,
                        dst,
                        size,
                        sent_at: now,
                        ready_at: ticket.ready_at(),
                    },
                );
                self.stats.record_send(size);
                trace!(
                    "net '{}': msg {} {} -> {} size={} ready_at={}",
                    self.name,
                    id,
                    self.nodes[src],
                    self.nodes[dst],
                    size,
                    ticket.ready_at()
                );
                engine.schedule(receive_event, payload, ticket.remaining_cycles(now));
                Some(id)
            }
            Err(backpressure) => {
                self.stats.record_retry();
                trace!(
                    "net '{}': link {} -> {} full, retry at {}",
                    self.name,
                    self.nodes[src],
                    self.nodes[dst],
                    backpressure.retry_at
                );
                engine.schedule(retry_event, payload, backpressure.retry_at - now);
                None
            }
        }
    }

    /// Consume a delivered message at its destination node. Each message is received once.
    pub fn receive(&mut self, node: NodeId, msg: MessageId, now: Cycle) -> Message {
        let message = self.inflight.remove(&msg).unwrap_or_else(|| {
            panic!(
                "network '{}': message {} received twice or never sent",
                self.name, msg
            )
        });
        assert_eq!(
            node, message.dst,
            "network '{}': message {} not at end node",
            self.name, msg
        );
        assert!(
            now >= message.ready_at,
            "network '{}': message {} received before delivery",
            self.name,
            msg
        );
        self.stats.record_delivery(now - message.sent_at);
        message
    }
}
