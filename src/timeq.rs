/*
Time-queue service law shared by the timed collaborators of the memory hierarchy.

A TimedServer models one serializing resource (a network link, for instance): every request pays
a throughput component expressed in bytes-per-cycle, then a fixed base latency.  Requests are
serialized behind each other but their latencies overlap, so a busy link still accepts work as
long as its buffer has room.

When the buffer cannot hold the request the server returns a Backpressure carrying the cycle at
which the oldest in-flight request drains, so the caller can retry then.  Accepted requests yield
a `Ticket` describing when the payload becomes available downstream.
*/

use std::collections::VecDeque;

pub type Cycle = u64;

// Result of queueing a request with a timed server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    issued_at: Cycle,
    ready_at: Cycle,
    size_bytes: u32,
}

impl Ticket {
    fn new(issued_at: Cycle, ready_at: Cycle, size_bytes: u32) -> Self {
        Self {
            issued_at,
            ready_at,
            size_bytes,
        }
    }

    // Cycle at which the request entered the server.
    pub fn issued_at(&self) -> Cycle {
        self.issued_at
    }

    // Cycle at which the server will make the payload available to downstream consumers.
    pub fn ready_at(&self) -> Cycle {
        self.ready_at
    }

    pub fn size_bytes(&self) -> u32 {
        self.size_bytes
    }

    pub fn is_ready(&self, now: Cycle) -> bool {
        now >= self.ready_at
    }

    // Number of cycles until the ticket is ready.  Returns zero if already ready.
    pub fn remaining_cycles(&self, now: Cycle) -> Cycle {
        self.ready_at.saturating_sub(now)
    }
}

// The request carries the payload and the size used to compute the service time
#[derive(Debug)]
pub struct ServiceRequest<T> {
    pub payload: T,
    pub size_bytes: u32,
}

impl<T> ServiceRequest<T> {
    pub fn new(payload: T, size_bytes: u32) -> Self {
        Self { payload, size_bytes }
    }
}

#[derive(Debug)]
pub struct ServiceResult<T> {
    pub payload: T,
    pub ticket: Ticket,
}

// The buffer is full; `retry_at` is the first cycle at which space may free up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backpressure {
    pub retry_at: Cycle,
}

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    // Fixed latency added to every request
    pub base_latency: Cycle,
    // Throughput
    pub bytes_per_cycle: u32,
    // Maximum number of bytes buffered in the server at once
    pub buffer_bytes: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_latency: 0,
            bytes_per_cycle: 1,
            buffer_bytes: u32::MAX,
        }
    }
}

#[derive(Debug)]
struct Inflight<T> {
    payload: T,
    ticket: Ticket,
}

// Single-lane server that enforces the configured latency/bandwidth budget and keeps track of
// outstanding work using a FIFO.
#[derive(Debug)]
pub struct TimedServer<T> {
    config: ServerConfig,
    inflight: VecDeque<Inflight<T>>,
    busy_until: Cycle,
    bytes_in_use: u32,
}

impl<T> TimedServer<T> {
    pub fn new(config: ServerConfig) -> Self {
        assert!(config.bytes_per_cycle > 0, "bytes_per_cycle must be > 0");
        assert!(config.buffer_bytes > 0, "buffer_bytes must be > 0");
        Self {
            config,
            inflight: VecDeque::new(),
            busy_until: 0,
            bytes_in_use: 0,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    // Attempt to enqueue a request at the provided cycle.
    // Returns a Ticket on success or a Backpressure describing when to retry.
    pub fn try_enqueue(
        &mut self,
        now: Cycle,
        request: ServiceRequest<T>,
    ) -> Result<Ticket, Backpressure> {
        assert!(
            request.size_bytes <= self.config.buffer_bytes,
            "request of {} bytes can never fit a {}-byte buffer",
            request.size_bytes,
            self.config.buffer_bytes
        );

        if self.bytes_in_use.saturating_add(request.size_bytes) > self.config.buffer_bytes {
            let retry_at = self
                .inflight
                .front()
                .map(|inflight| inflight.ticket.ready_at())
                .unwrap_or(now);
            return Err(Backpressure {
                retry_at: retry_at.max(now.saturating_add(1)),
            });
        }

        let start = self.busy_until.max(now);
        let service_cycles =
            ceil_div_u64(request.size_bytes as u64, self.config.bytes_per_cycle as u64);
        let ready_at = start
            .saturating_add(service_cycles)
            .saturating_add(self.config.base_latency);
        let ticket = Ticket::new(now, ready_at, request.size_bytes);

        self.busy_until = start.saturating_add(service_cycles);
        self.bytes_in_use += request.size_bytes;
        self.inflight.push_back(Inflight {
            payload: request.payload,
            ticket,
        });

        Ok(ticket)
    }

    // Drain any requests that have completed by "now" and invoke the supplied callback with the
    // results.
    pub fn service_ready<F>(&mut self, now: Cycle, mut callback: F)
    where
        F: FnMut(ServiceResult<T>),
    {
        while let Some(front) = self.inflight.front() {
            if !front.ticket.is_ready(now) {
                break;
            }
            let inflight = self.inflight.pop_front().expect("front just checked");
            self.bytes_in_use -= inflight.ticket.size_bytes();
            callback(ServiceResult {
                payload: inflight.payload,
                ticket: inflight.ticket,
            });
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inflight.len()
    }

    pub fn bytes_in_use(&self) -> u32 {
        self.bytes_in_use
    }
}

fn ceil_div_u64(nom: u64, denom: u64) -> Cycle {
    debug_assert!(denom > 0);
    (nom + denom - 1) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(base_latency: Cycle, bytes_per_cycle: u32, buffer_bytes: u32) -> TimedServer<u32> {
        TimedServer::new(ServerConfig {
            base_latency,
            bytes_per_cycle,
            buffer_bytes,
        })
    }

    #[test]
    fn ticket_includes_service_and_latency() {
        let mut srv = server(2, 8, 64);
        let ticket = srv.try_enqueue(10, ServiceRequest::new(1, 16)).unwrap();
        assert_eq!(10, ticket.issued_at());
        assert_eq!(14, ticket.ready_at());
        assert_eq!(4, ticket.remaining_cycles(10));
    }

    #[test]
    fn back_to_back_requests_serialize_but_overlap_latency() {
        let mut srv = server(5, 8, 64);
        let first = srv.try_enqueue(0, ServiceRequest::new(1, 8)).unwrap();
        let second = srv.try_enqueue(0, ServiceRequest::new(2, 8)).unwrap();
        assert_eq!(6, first.ready_at());
        assert_eq!(7, second.ready_at());
        let third = srv.try_enqueue(1, ServiceRequest::new(3, 8)).unwrap();
        assert_eq!(8, third.ready_at());
    }

    #[test]
    fn full_buffer_reports_oldest_ready_cycle() {
        let mut srv = server(3, 8, 16);
        let first = srv.try_enqueue(0, ServiceRequest::new(1, 16)).unwrap();
        let err = srv
            .try_enqueue(0, ServiceRequest::new(2, 8))
            .expect_err("buffer should be full");
        assert_eq!(first.ready_at(), err.retry_at);
        assert_eq!(1, srv.outstanding());
    }

    #[test]
    fn service_ready_releases_buffer_space() {
        let mut srv = server(0, 4, 8);
        let ticket = srv.try_enqueue(0, ServiceRequest::new(7, 8)).unwrap();
        assert_eq!(8, srv.bytes_in_use());
        let mut seen = Vec::new();
        srv.service_ready(ticket.ready_at() - 1, |r| seen.push(r.payload));
        assert!(seen.is_empty());
        srv.service_ready(ticket.ready_at(), |r| seen.push(r.payload));
        assert_eq!(vec![7], seen);
        assert_eq!(0, srv.bytes_in_use());
        assert_eq!(0, srv.outstanding());
        assert!(srv.try_enqueue(ticket.ready_at(), ServiceRequest::new(8, 8)).is_ok());
    }

    #[test]
    #[should_panic(expected = "can never fit")]
    fn oversized_request_is_fatal() {
        let mut srv = server(0, 4, 8);
        let _ = srv.try_enqueue(0, ServiceRequest::new(1, 9));
    }
}
