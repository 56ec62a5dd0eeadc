//! OVN Northbound database access.
//!
//! - [`datum`], [`ops`]: the OVSDB data model and atomic transactions with
//!   forward references
//! - [`model`]: `Logical_Switch` and `Logical_Switch_Port` rows
//! - [`api`]: typed lookups and operation builders
//! - [`client`]: the executor trait, with [`jsonrpc::OvsdbClient`] for a real
//!   server and [`memory::MemoryNb`] for the in-process database

pub mod api;
pub mod client;
pub mod connection;
pub mod datum;
pub mod error;
pub mod jsonrpc;
pub mod memory;
pub mod model;
pub mod ops;

pub use api::NbApi;
pub use client::{transact_checked, NbClient};
pub use connection::{normalize, parse_endpoints, Endpoint, DEFAULT_NB_CONNECTION, MEMORY_CONNECTION};
pub use datum::{Atom, Datum, Row, Uuid};
pub use error::{NbError, NbResult};
pub use jsonrpc::OvsdbClient;
pub use memory::{Fault, MemoryNb};
pub use model::{LogicalSwitch, LogicalSwitchPort, TableModel, NB_DATABASE};
pub use ops::{named_uuid, Condition, Mutation, Mutator, OpResult, Operation, Transaction};
