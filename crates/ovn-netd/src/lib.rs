//! OVN network driver for Docker.
//!
//! Maps libnetwork's network and endpoint lifecycle onto the OVN Northbound
//! database and host veth wiring:
//!
//! - a Docker network is a `Logical_Switch` named `ls-<network[..12]>`
//! - endpoint addressing waits in the switch's `other_config` until join
//! - join creates a `Logical_Switch_Port` and a veth pair attached to the
//!   integration bridge, tagged with the port name
//! - leave removes both again, best-effort
//!
//! # Modules
//!
//! - [`naming`]: deterministic names and MACs
//! - [`metadata`]: endpoint metadata in `other_config`
//! - [`veth`]: host wiring with rollback
//! - [`driver`]: the lifecycle operations
//! - [`plugin`]: the remote driver HTTP API

pub mod config;
pub mod driver;
pub mod locks;
pub mod logging;
pub mod metadata;
pub mod naming;
pub mod plugin;
pub mod tables;
pub mod teardown;
pub mod types;
pub mod veth;

pub use config::{DaemonArgs, DriverConfig};
pub use driver::OvnDriver;
pub use logging::init_logging;
pub use metadata::{EndpointMetadata, MetadataStore, StoredEndpoint};
pub use teardown::{TeardownReport, TeardownWarning};
pub use veth::{VethPair, VethWiring};
