//! Host interface primitives.
//!
//! [`HostNetwork`] is the seam between the lifecycle driver and the kernel /
//! local virtual switch. Each method is a single blocking primitive that may
//! fail independently; sequencing and rollback live in the caller.
//! [`ShellHost`] implements it with `ip`, `ovs-vsctl` and `ethtool`.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::commands::{
    build_attach_port_cmd, build_create_veth_pair_cmd, build_delete_link_cmd,
    build_detach_port_cmd, build_disable_tx_offload_cmd, build_get_ovn_nb_cmd, build_link_up_cmd,
    build_set_mac_cmd,
};
use crate::error::{DriverError, DriverResult};
use crate::shell;

/// Host-side link and bridge operations used by veth wiring.
#[async_trait]
pub trait HostNetwork: Send + Sync {
    /// Creates a veth pair `host_name <-> peer_name`.
    async fn create_veth_pair(&self, host_name: &str, peer_name: &str) -> DriverResult<()>;

    /// Sets the MAC address of a link.
    async fn set_mac(&self, name: &str, mac: &str) -> DriverResult<()>;

    /// Brings a link up.
    async fn set_link_up(&self, name: &str) -> DriverResult<()>;

    /// Deletes a link (and its veth peer).
    async fn delete_link(&self, name: &str) -> DriverResult<()>;

    /// Attaches `port_name` to `bridge`, tagging `iface_name` with `port_tag`
    /// so the switch binds it to the logical port of that name.
    async fn attach_to_bridge(
        &self,
        bridge: &str,
        port_name: &str,
        iface_name: &str,
        port_tag: &str,
    ) -> DriverResult<()>;

    /// Detaches `port_name` from `bridge`. Absent ports are not an error.
    async fn detach_from_bridge(&self, bridge: &str, port_name: &str) -> DriverResult<()>;

    /// Disables transmit checksum offload on a link.
    async fn disable_checksum_offload(&self, name: &str) -> DriverResult<()>;
}

/// `ip` output for a link that does not exist.
const MISSING_DEVICE: &str = "Cannot find device";

/// [`HostNetwork`] backed by the system command line tools.
#[derive(Debug, Clone)]
pub struct ShellHost {
    /// Local OVS database endpoint passed to `ovs-vsctl --db`.
    ovs_db: String,
}

impl ShellHost {
    /// Creates a shell host talking to the given local OVS database.
    pub fn new(ovs_db: impl Into<String>) -> Self {
        Self {
            ovs_db: ovs_db.into(),
        }
    }

    /// Returns the local OVS database endpoint.
    pub fn ovs_db(&self) -> &str {
        &self.ovs_db
    }

    /// Reads `external_ids:ovn-nb` from the local `Open_vSwitch` row.
    ///
    /// Returns `None` when the key is unset.
    pub async fn ovn_nb_connection(&self) -> DriverResult<Option<String>> {
        let output = shell::exec_or_throw(&build_get_ovn_nb_cmd(&self.ovs_db)).await?;
        let value = output.trim().trim_matches('"').to_string();
        if value.is_empty() {
            debug!("external_ids:ovn-nb not set in local OVS database");
            Ok(None)
        } else {
            info!(connection = %value, "Found OVN NB connection in OVS external_ids");
            Ok(Some(value))
        }
    }
}

#[async_trait]
impl HostNetwork for ShellHost {
    async fn create_veth_pair(&self, host_name: &str, peer_name: &str) -> DriverResult<()> {
        shell::exec_or_throw(&build_create_veth_pair_cmd(host_name, peer_name)).await?;
        Ok(())
    }

    async fn set_mac(&self, name: &str, mac: &str) -> DriverResult<()> {
        shell::exec_or_throw(&build_set_mac_cmd(name, mac)).await?;
        Ok(())
    }

    async fn set_link_up(&self, name: &str) -> DriverResult<()> {
        shell::exec_or_throw(&build_link_up_cmd(name)).await?;
        Ok(())
    }

    async fn delete_link(&self, name: &str) -> DriverResult<()> {
        match shell::exec_or_throw(&build_delete_link_cmd(name)).await {
            Err(DriverError::ShellCommandFailed { output, .. }) if output.contains(MISSING_DEVICE) => {
                Err(DriverError::not_found("link", name))
            }
            result => result.map(|_| ()),
        }
    }

    async fn attach_to_bridge(
        &self,
        bridge: &str,
        port_name: &str,
        iface_name: &str,
        port_tag: &str,
    ) -> DriverResult<()> {
        let cmd = build_attach_port_cmd(&self.ovs_db, bridge, port_name, iface_name, port_tag);
        shell::exec_or_throw(&cmd).await?;
        info!(bridge, port = port_name, iface_id = port_tag, "Attached port to bridge");
        Ok(())
    }

    async fn detach_from_bridge(&self, bridge: &str, port_name: &str) -> DriverResult<()> {
        shell::exec_or_throw(&build_detach_port_cmd(&self.ovs_db, bridge, port_name)).await?;
        Ok(())
    }

    async fn disable_checksum_offload(&self, name: &str) -> DriverResult<()> {
        shell::exec_or_throw(&build_disable_tx_offload_cmd(name)).await?;
        Ok(())
    }
}
