//! Host veth wiring for joined endpoints.
//!
//! Forward path: create the pair, set the container MAC, bring the host end
//! up, attach it to the integration bridge tagged with the logical port name,
//! then turn off tx checksum offload on both ends. A failure after the pair
//! exists deletes the pair before the error is returned; deleting the link
//! also drops its bridge attachment.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use ovn_driver_common::{DriverError, DriverResult, HostNetwork};

use crate::naming::{container_veth_name, host_veth_name};
use crate::teardown::Teardown;

/// Step names, as they appear in errors and teardown warnings.
pub mod steps {
    pub const CREATE_PAIR: &str = "create veth pair";
    pub const SET_MAC: &str = "set container MAC";
    pub const LINK_UP: &str = "bring host link up";
    pub const ATTACH: &str = "attach to bridge";
    pub const DETACH: &str = "detach from bridge";
    pub const DELETE_PAIR: &str = "delete veth pair";
}

/// The two link names of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPair {
    /// Host end; also the bridge port name.
    pub host: String,
    /// Container end, moved into the sandbox by Docker.
    pub container: String,
}

impl VethPair {
    pub fn for_endpoint(endpoint_id: &str) -> Self {
        Self {
            host: host_veth_name(endpoint_id),
            container: container_veth_name(endpoint_id),
        }
    }
}

/// Drives [`HostNetwork`] primitives for one bridge.
#[derive(Clone)]
pub struct VethWiring {
    host: Arc<dyn HostNetwork>,
    bridge: String,
}

impl VethWiring {
    pub fn new(host: Arc<dyn HostNetwork>, bridge: impl Into<String>) -> Self {
        Self {
            host,
            bridge: bridge.into(),
        }
    }

    /// Wires a pair and binds it to `port_tag`.
    #[instrument(skip(self), fields(bridge = %self.bridge))]
    pub async fn wire(&self, pair: &VethPair, mac: &str, port_tag: &str) -> DriverResult<()> {
        self.host
            .create_veth_pair(&pair.host, &pair.container)
            .await
            .map_err(|e| DriverError::host_wiring(steps::CREATE_PAIR, e.to_string()))?;

        if let Err((step, e)) = self.configure(pair, mac, port_tag).await {
            warn!(host = %pair.host, step, error = %e, "Veth wiring failed, deleting pair");
            if let Err(rollback) = self.host.delete_link(&pair.host).await {
                warn!(host = %pair.host, error = %rollback, "Failed to delete veth pair during rollback");
            }
            return Err(DriverError::host_wiring(step, e.to_string()));
        }

        for name in [&pair.host, &pair.container] {
            if let Err(e) = self.host.disable_checksum_offload(name).await {
                debug!(link = %name, error = %e, "Ignoring tx offload failure");
            }
        }

        info!(host = %pair.host, container = %pair.container, port = port_tag, "Veth pair wired");
        Ok(())
    }

    async fn configure(
        &self,
        pair: &VethPair,
        mac: &str,
        port_tag: &str,
    ) -> Result<(), (&'static str, DriverError)> {
        self.host
            .set_mac(&pair.container, mac)
            .await
            .map_err(|e| (steps::SET_MAC, e))?;
        self.host
            .set_link_up(&pair.host)
            .await
            .map_err(|e| (steps::LINK_UP, e))?;
        self.host
            .attach_to_bridge(&self.bridge, &pair.host, &pair.host, port_tag)
            .await
            .map_err(|e| (steps::ATTACH, e))?;
        Ok(())
    }

    /// Detaches and deletes a pair, recording failures in `teardown`.
    pub async fn unwire(&self, pair: &VethPair, teardown: &mut Teardown) {
        teardown.record(
            steps::DETACH,
            self.host.detach_from_bridge(&self.bridge, &pair.host).await,
        );
        teardown.record(steps::DELETE_PAIR, self.host.delete_link(&pair.host).await);
    }
}
