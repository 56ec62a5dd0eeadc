//! Test infrastructure for the OVN container network driver
//!
//! Provides:
//! - [`FakeHost`]: an in-memory [`HostNetwork`](ovn_driver_common::HostNetwork)
//!   that records links, bridge ports and every call, with per-primitive
//!   fault injection
//! - Docker request fixtures shaped like libnetwork's JSON

pub mod fixtures;
mod fake_host;

pub use fake_host::{FakeHost, HostCall};
pub use fixtures::*;
