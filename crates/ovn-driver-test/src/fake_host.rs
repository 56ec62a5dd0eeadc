//! In-memory host for driving veth wiring without a kernel.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use ovn_driver_common::{DriverError, DriverResult, HostNetwork};

/// Host primitives, for fault injection and call inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCall {
    CreateVethPair,
    SetMac,
    SetLinkUp,
    DeleteLink,
    AttachToBridge,
    DetachFromBridge,
    DisableChecksumOffload,
}

#[derive(Debug, Clone)]
struct Link {
    peer: String,
    mac: Option<String>,
    up: bool,
}

#[derive(Default)]
struct State {
    links: BTreeMap<String, Link>,
    /// bridge -> port -> iface-id
    bridges: BTreeMap<String, BTreeMap<String, String>>,
    calls: Vec<(HostCall, String)>,
    faults: HashMap<HostCall, String>,
}

/// Records host state the way `ip` and `ovs-vsctl` would leave it.
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<State>,
}

fn command_failed(command: &str, output: impl Into<String>) -> DriverError {
    DriverError::ShellCommandFailed {
        command: command.to_string(),
        exit_code: 1,
        output: output.into(),
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `call` fail with `message`.
    pub fn fail(&self, call: HostCall, message: impl Into<String>) {
        self.state.lock().faults.insert(call, message.into());
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Existing link names, both veth ends included.
    pub fn links(&self) -> Vec<String> {
        self.state.lock().links.keys().cloned().collect()
    }

    pub fn has_link(&self, name: &str) -> bool {
        self.state.lock().links.contains_key(name)
    }

    pub fn mac(&self, name: &str) -> Option<String> {
        self.state.lock().links.get(name).and_then(|l| l.mac.clone())
    }

    pub fn is_up(&self, name: &str) -> bool {
        self.state.lock().links.get(name).is_some_and(|l| l.up)
    }

    /// The iface-id a bridge port is tagged with.
    pub fn bridge_port(&self, bridge: &str, port: &str) -> Option<String> {
        self.state
            .lock()
            .bridges
            .get(bridge)
            .and_then(|ports| ports.get(port).cloned())
    }

    pub fn bridge_ports(&self, bridge: &str) -> Vec<String> {
        self.state
            .lock()
            .bridges
            .get(bridge)
            .map(|ports| ports.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Calls made so far, with the link or port each one targeted.
    pub fn calls(&self) -> Vec<(HostCall, String)> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, call: HostCall) -> usize {
        self.state.lock().calls.iter().filter(|(c, _)| *c == call).count()
    }

    fn begin(&self, call: HostCall, target: &str) -> Result<parking_lot::MutexGuard<'_, State>, DriverError> {
        let mut state = self.state.lock();
        state.calls.push((call, target.to_string()));
        if let Some(message) = state.faults.get(&call) {
            return Err(command_failed(&format!("{:?} {}", call, target), message.clone()));
        }
        Ok(state)
    }
}

#[async_trait]
impl HostNetwork for FakeHost {
    async fn create_veth_pair(&self, host_name: &str, peer_name: &str) -> DriverResult<()> {
        let mut state = self.begin(HostCall::CreateVethPair, host_name)?;
        if state.links.contains_key(host_name) || state.links.contains_key(peer_name) {
            return Err(command_failed("ip link add", "RTNETLINK answers: File exists"));
        }
        for (name, peer) in [(host_name, peer_name), (peer_name, host_name)] {
            state.links.insert(
                name.to_string(),
                Link {
                    peer: peer.to_string(),
                    mac: None,
                    up: false,
                },
            );
        }
        Ok(())
    }

    async fn set_mac(&self, name: &str, mac: &str) -> DriverResult<()> {
        let mut state = self.begin(HostCall::SetMac, name)?;
        let link = state
            .links
            .get_mut(name)
            .ok_or_else(|| command_failed("ip link set address", format!("Cannot find device \"{}\"", name)))?;
        link.mac = Some(mac.to_string());
        Ok(())
    }

    async fn set_link_up(&self, name: &str) -> DriverResult<()> {
        let mut state = self.begin(HostCall::SetLinkUp, name)?;
        let link = state
            .links
            .get_mut(name)
            .ok_or_else(|| command_failed("ip link set up", format!("Cannot find device \"{}\"", name)))?;
        link.up = true;
        Ok(())
    }

    async fn delete_link(&self, name: &str) -> DriverResult<()> {
        let mut state = self.begin(HostCall::DeleteLink, name)?;
        let link = state
            .links
            .remove(name)
            .ok_or_else(|| DriverError::not_found("link", name))?;
        state.links.remove(&link.peer);
        // The kernel drops a deleted interface from any bridge it was on.
        for ports in state.bridges.values_mut() {
            ports.remove(name);
            ports.remove(&link.peer);
        }
        Ok(())
    }

    async fn attach_to_bridge(
        &self,
        bridge: &str,
        port_name: &str,
        iface_name: &str,
        port_tag: &str,
    ) -> DriverResult<()> {
        let mut state = self.begin(HostCall::AttachToBridge, port_name)?;
        if !state.links.contains_key(iface_name) {
            return Err(command_failed(
                "ovs-vsctl add-port",
                format!("could not open network device {} (No such device)", iface_name),
            ));
        }
        state
            .bridges
            .entry(bridge.to_string())
            .or_default()
            .insert(port_name.to_string(), port_tag.to_string());
        Ok(())
    }

    async fn detach_from_bridge(&self, bridge: &str, port_name: &str) -> DriverResult<()> {
        let mut state = self.begin(HostCall::DetachFromBridge, port_name)?;
        if let Some(ports) = state.bridges.get_mut(bridge) {
            ports.remove(port_name);
        }
        Ok(())
    }

    async fn disable_checksum_offload(&self, name: &str) -> DriverResult<()> {
        let state = self.begin(HostCall::DisableChecksumOffload, name)?;
        if !state.links.contains_key(name) {
            return Err(command_failed("ethtool -K", format!("Cannot get device settings: No such device {}", name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_delete_removes_peer_and_bridge_port() {
        let host = FakeHost::new();
        host.create_veth_pair("veth0123456", "veth0123456_c").await.unwrap();
        host.set_mac("veth0123456_c", "02:30:31:32:33:34").await.unwrap();
        host.attach_to_bridge("br-int", "veth0123456", "veth0123456", "lsp-x")
            .await
            .unwrap();
        assert_eq!(host.bridge_port("br-int", "veth0123456").as_deref(), Some("lsp-x"));
        assert_eq!(host.mac("veth0123456_c").as_deref(), Some("02:30:31:32:33:34"));

        host.delete_link("veth0123456").await.unwrap();
        assert!(host.links().is_empty());
        assert!(host.bridge_ports("br-int").is_empty());

        let err = host.delete_link("veth0123456").await.unwrap_err();
        assert!(err.is_teardown_tolerable());
    }

    #[tokio::test]
    async fn test_fault_injection_is_recorded() {
        let host = FakeHost::new();
        host.fail(HostCall::SetLinkUp, "Operation not permitted");
        host.create_veth_pair("veth0123456", "veth0123456_c").await.unwrap();
        assert!(host.set_link_up("veth0123456").await.is_err());
        assert!(!host.is_up("veth0123456"));
        assert_eq!(host.call_count(HostCall::SetLinkUp), 1);

        host.clear_faults();
        host.set_link_up("veth0123456").await.unwrap();
        assert!(host.is_up("veth0123456"));
    }
}
