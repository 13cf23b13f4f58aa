/*
Synthetic clients for the memory hierarchy.

Each memory entry point gets one stream that issues reads and writes from an address pattern
while it has fewer than `max_inflight` accesses outstanding.
*/

mod config;
mod driver;
mod patterns;

pub use config::TrafficConfig;
pub use driver::{TrafficDriver, TrafficStats, TrafficWorld};
pub use patterns::{AccessGen, AddressPattern};
