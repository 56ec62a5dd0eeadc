//! Common infrastructure for the OVN container network driver.
//!
//! - [`error`]: the driver error taxonomy
//! - [`shell`]: quoted shell command execution
//! - [`commands`]: command line builders for `ip`, `ovs-vsctl`, `ethtool`
//! - [`host`]: the [`HostNetwork`] primitive set and its shell implementation
//!
//! # Example
//!
//! ```ignore
//! use ovn_driver_common::{HostNetwork, ShellHost};
//!
//! let host = ShellHost::new("unix:/var/run/openvswitch/db.sock");
//! host.create_veth_pair("veth0123456", "veth0123456_c").await?;
//! host.set_link_up("veth0123456").await?;
//! ```

pub mod commands;
pub mod error;
pub mod host;
pub mod shell;

pub use error::{DriverError, DriverResult, ErrorKind};
pub use host::{HostNetwork, ShellHost};
