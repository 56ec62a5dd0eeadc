//! Network and endpoint lifecycle.
//!
//! Network:  absent -> created -> deleted
//! Endpoint: absent -> created (metadata) -> joined (port + veth) -> left -> deleted
//!
//! Check-then-write sequences run under a per-key lock: the subnet and the
//! switch name for `create_network`, the network for everything touching its
//! endpoints.
//!
//! Teardown calls never fail on an identifier this driver could not have
//! created; they log it and report success.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use ovn_driver_common::{DriverError, DriverResult, HostNetwork};
use ovn_nbdb::{
    named_uuid, LogicalSwitchPort, Mutator, NbApi, NbClient, Transaction, Uuid,
};

use crate::config::DriverConfig;
use crate::locks::{network_key, subnet_key, switch_key, KeyedLocks};
use crate::metadata::{EndpointMetadata, MetadataStore};
use crate::naming::{
    address_from_cidr, generate_mac, network_name, port_name, validate_id,
    CONTAINER_IFACE_PREFIX,
};
use crate::tables::{ENDPOINT_KEY, GATEWAY_KEY, NETWORK_KEY, SUBNET_KEY};
use crate::teardown::{Teardown, TeardownReport};
use crate::types::{
    AllocateNetworkRequest, AllocateNetworkResponse, CapabilitiesResponse,
    CreateEndpointRequest, CreateNetworkRequest, DiscoveryNotification, InfoResponse,
    InterfaceName, JoinResponse, ProgramExternalConnectivityRequest, GLOBAL_SCOPE, LOCAL_SCOPE,
};
use crate::veth::{VethPair, VethWiring};

/// Teardown step removing the logical port and its switch reference.
pub const DELETE_PORT_STEP: &str = "delete logical port";

/// Prefix of the named-uuid a new port is inserted under.
const PORT_UUID_PREFIX: &str = "lsp_named_";

/// The OVN network driver.
pub struct OvnDriver {
    config: DriverConfig,
    nb: NbApi,
    metadata: MetadataStore,
    wiring: VethWiring,
    locks: KeyedLocks,
}

impl OvnDriver {
    pub fn new(
        config: DriverConfig,
        client: Arc<dyn NbClient>,
        host: Arc<dyn HostNetwork>,
    ) -> Self {
        let nb = NbApi::new(client);
        let wiring = VethWiring::new(host, config.bridge.clone());
        Self {
            metadata: MetadataStore::new(nb.clone()),
            nb,
            wiring,
            locks: KeyedLocks::new(),
            config,
        }
    }

    pub fn capabilities(&self) -> CapabilitiesResponse {
        CapabilitiesResponse {
            scope: LOCAL_SCOPE.to_string(),
            connectivity_scope: GLOBAL_SCOPE.to_string(),
        }
    }

    /// Creates the logical switch backing a Docker network.
    ///
    /// The subnet comes from the last IPv4 pool and must not be claimed by
    /// another switch.
    #[instrument(skip(self, req), fields(network = %req.network_id))]
    pub async fn create_network(&self, req: &CreateNetworkRequest) -> DriverResult<()> {
        validate_id("NetworkID", &req.network_id)?;
        let pool = req
            .ipv4_data
            .last()
            .filter(|data| !data.pool.is_empty())
            .ok_or_else(|| DriverError::invalid_config("IPv4Data", "subnet not specified"))?;
        let subnet = pool.pool.as_str();
        let gateway = address_from_cidr("Gateway", &pool.gateway)?;

        let switch_name = network_name(&req.network_id);

        let _subnet_guard = self.locks.lock(subnet_key(subnet)).await;
        let _switch_guard = self.locks.lock(switch_key(&switch_name)).await;

        if let Some(existing) = self.nb.find_switch_by_other_config(SUBNET_KEY, subnet).await? {
            return Err(DriverError::conflict(format!(
                "subnet {} already in use by logical switch {}",
                subnet, existing.name
            )));
        }

        if let Some(existing) = self.nb.find_switch(&switch_name).await? {
            let owner = existing.other_config.get(NETWORK_KEY).map(String::as_str).unwrap_or("");
            return Err(DriverError::conflict(format!(
                "logical switch {} already exists for network {}",
                switch_name, owner
            )));
        }

        let other_config: BTreeMap<String, String> = [
            (NETWORK_KEY, req.network_id.as_str()),
            (SUBNET_KEY, subnet),
            (GATEWAY_KEY, gateway.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        self.nb
            .commit(Transaction::new().with(NbApi::create_switch_op(&switch_name, other_config)))
            .await?;

        info!(switch = %switch_name, subnet, gateway = %gateway, "Created network");
        Ok(())
    }

    /// Deletes a network's switch. Unknown networks succeed without writes.
    #[instrument(skip(self))]
    pub async fn delete_network(&self, network_id: &str) -> DriverResult<()> {
        if !teardown_ids_valid(&[("NetworkID", network_id)]) {
            return Ok(());
        }
        let switch_name = network_name(network_id);
        let _guard = self.locks.lock(network_key(network_id)).await;

        let Some(ls) = self.nb.find_switch(&switch_name).await? else {
            debug!(switch = %switch_name, "Network already absent");
            return Ok(());
        };

        self.nb
            .commit(Transaction::new().with(NbApi::delete_switch_op(&ls)?))
            .await?;
        info!(switch = %switch_name, ports = ls.ports.len(), "Deleted network");
        Ok(())
    }

    /// Records an endpoint's addressing on its switch and returns the MAC.
    #[instrument(skip(self, req), fields(network = %req.network_id, endpoint = %req.endpoint_id))]
    pub async fn create_endpoint(&self, req: &CreateEndpointRequest) -> DriverResult<String> {
        validate_id("NetworkID", &req.network_id)?;
        validate_id("EndpointID", &req.endpoint_id)?;
        let iface = req
            .interface
            .as_ref()
            .filter(|iface| !iface.address.is_empty())
            .ok_or_else(|| DriverError::invalid_config("Interface.Address", "address not specified"))?;

        let switch_name = network_name(&req.network_id);
        let _guard = self.locks.lock(network_key(&req.network_id)).await;

        if self.nb.find_switch(&switch_name).await?.is_none() {
            return Err(DriverError::not_found("network", &req.network_id));
        }

        let mac = if iface.mac_address.is_empty() {
            generate_mac(&req.endpoint_id)
        } else {
            iface.mac_address.clone()
        };
        let ip = address_from_cidr("Interface.Address", &iface.address)?;
        let metadata = EndpointMetadata::new(&req.endpoint_id, mac, ip);
        self.metadata.put(&switch_name, &metadata).await?;

        info!(switch = %switch_name, mac = %metadata.mac, ip = %metadata.ip, "Created endpoint");
        Ok(metadata.mac)
    }

    /// Drops an endpoint's metadata. Storage failures are logged only.
    #[instrument(skip(self))]
    pub async fn delete_endpoint(&self, endpoint_id: &str, network_id: &str) -> DriverResult<()> {
        if !teardown_ids_valid(&[("NetworkID", network_id), ("EndpointID", endpoint_id)]) {
            return Ok(());
        }
        let _guard = self.locks.lock(network_key(network_id)).await;
        self.metadata
            .delete(&network_name(network_id), endpoint_id)
            .await;
        Ok(())
    }

    /// Creates the logical port and wires its veth pair to the bridge.
    #[instrument(skip(self))]
    pub async fn join(&self, endpoint_id: &str, network_id: &str) -> DriverResult<JoinResponse> {
        validate_id("NetworkID", network_id)?;
        validate_id("EndpointID", endpoint_id)?;
        let switch_name = network_name(network_id);
        let port = port_name(endpoint_id, network_id);
        let _guard = self.locks.lock(network_key(network_id)).await;

        let stored = self.metadata.get(&switch_name, endpoint_id).await?;
        let metadata = &stored.metadata;

        if let Some(existing) = self.nb.find_port_by_ip(&switch_name, &metadata.ip).await? {
            return Err(DriverError::conflict(format!(
                "IP address {} already in use on logical switch {} by port {}",
                metadata.ip, switch_name, existing.name
            )));
        }

        let ls = self
            .nb
            .find_switch(&switch_name)
            .await?
            .ok_or_else(|| DriverError::not_found("logical switch", &switch_name))?;

        if self.nb.find_port(&port).await?.is_some() {
            return Err(DriverError::conflict(format!(
                "logical switch port {} already exists",
                port
            )));
        }

        let lsp = endpoint_port(&port, metadata, network_id);
        let uuid_name = named_uuid(&format!("{}{}", PORT_UUID_PREFIX, port));
        let txn = Transaction::new()
            .with(NbApi::create_port_op(&lsp, &uuid_name))
            .with(NbApi::mutate_switch_ports_op(
                &ls,
                Mutator::Insert,
                vec![Uuid::named(&uuid_name)],
            )?);
        self.nb.commit(txn).await?;
        info!(port = %port, addresses = ?lsp.addresses, "Created logical switch port");

        let pair = VethPair::for_endpoint(endpoint_id);
        if let Err(e) = self.wiring.wire(&pair, &metadata.mac, &port).await {
            if self.config.revoke_port_on_wiring_failure {
                self.revoke_port(&switch_name, &port).await;
            } else {
                warn!(port = %port, "Host wiring failed; logical port stays committed until leave");
            }
            return Err(e);
        }

        info!(port = %port, iface = %pair.container, gateway = %stored.gateway, "Join complete");
        Ok(JoinResponse {
            interface_name: InterfaceName {
                src_name: pair.container,
                dst_prefix: CONTAINER_IFACE_PREFIX.to_string(),
            },
            gateway: stored.gateway,
        })
    }

    /// Deletes the logical port, then the host wiring. Every step runs;
    /// failures come back as warnings in the report.
    #[instrument(skip(self))]
    pub async fn leave(&self, endpoint_id: &str, network_id: &str) -> DriverResult<TeardownReport> {
        if !teardown_ids_valid(&[("NetworkID", network_id), ("EndpointID", endpoint_id)]) {
            return Ok(TeardownReport::default());
        }
        let switch_name = network_name(network_id);
        let port = port_name(endpoint_id, network_id);
        let _guard = self.locks.lock(network_key(network_id)).await;

        let mut teardown = Teardown::new(format!("endpoint {}", endpoint_id));
        teardown.record(DELETE_PORT_STEP, self.delete_port(&switch_name, &port).await);
        self.wiring
            .unwire(&VethPair::for_endpoint(endpoint_id), &mut teardown)
            .await;

        let report = teardown.finish();
        info!(port = %port, warnings = report.warnings().len(), "Leave complete");
        Ok(report)
    }

    /// Deletes a port and drops it from its switch in one batch. Returns
    /// false when the port does not exist.
    async fn delete_port(&self, switch_name: &str, port: &str) -> DriverResult<bool> {
        let Some(lsp) = self.nb.find_port(port).await? else {
            debug!(port, "Logical switch port already absent");
            return Ok(false);
        };

        let mut txn = Transaction::new();
        match self.nb.find_switch(switch_name).await {
            Ok(Some(ls)) => {
                txn.push(NbApi::mutate_switch_ports_op(
                    &ls,
                    Mutator::Delete,
                    vec![lsp.require_uuid()?.clone()],
                )?);
            }
            Ok(None) => debug!(switch = switch_name, "Switch absent, deleting port only"),
            Err(e) => warn!(switch = switch_name, error = %e, "Switch lookup failed, deleting port only"),
        }
        txn.push(NbApi::delete_port_op(&lsp)?);

        self.nb.commit(txn).await?;
        info!(port, "Deleted logical switch port");
        Ok(true)
    }

    async fn revoke_port(&self, switch_name: &str, port: &str) {
        match self.delete_port(switch_name, port).await {
            Ok(_) => info!(port, "Revoked logical port after wiring failure"),
            Err(e) => warn!(port, error = %e, "Failed to revoke logical port after wiring failure"),
        }
    }

    pub fn allocate_network(&self, req: &AllocateNetworkRequest) -> AllocateNetworkResponse {
        debug!(network = %req.network_id, "AllocateNetwork ignored");
        AllocateNetworkResponse::default()
    }

    pub fn free_network(&self, network_id: &str) {
        debug!(network = network_id, "FreeNetwork ignored");
    }

    pub fn endpoint_oper_info(&self, endpoint_id: &str, network_id: &str) -> InfoResponse {
        debug!(endpoint = endpoint_id, network = network_id, "EndpointOperInfo");
        InfoResponse::default()
    }

    pub fn program_external_connectivity(&self, req: &ProgramExternalConnectivityRequest) {
        debug!(endpoint = %req.endpoint_id, "ProgramExternalConnectivity ignored");
    }

    pub fn revoke_external_connectivity(&self, endpoint_id: &str, network_id: &str) {
        debug!(endpoint = endpoint_id, network = network_id, "RevokeExternalConnectivity ignored");
    }

    pub fn discover_new(&self, notification: &DiscoveryNotification) {
        debug!(kind = notification.discovery_type, "DiscoverNew ignored");
    }

    pub fn discover_delete(&self, notification: &DiscoveryNotification) {
        debug!(kind = notification.discovery_type, "DiscoverDelete ignored");
    }
}

/// False, with a warning, when any id is malformed. Nothing this driver
/// created can be named after such an id.
fn teardown_ids_valid(ids: &[(&str, &str)]) -> bool {
    for (field, id) in ids {
        if let Err(e) = validate_id(field, id) {
            warn!(error = %e, "Nothing to tear down for malformed identifier");
            return false;
        }
    }
    true
}

/// Logical port row for a joined endpoint.
fn endpoint_port(port: &str, metadata: &EndpointMetadata, network_id: &str) -> LogicalSwitchPort {
    let address = format!("{} {}", metadata.mac, metadata.ip);
    LogicalSwitchPort {
        name: port.to_string(),
        addresses: vec![address.clone()],
        port_security: vec![address],
        enabled: Some(true),
        external_ids: [
            (ENDPOINT_KEY.to_string(), metadata.endpoint_id.clone()),
            (NETWORK_KEY.to_string(), network_id.to_string()),
        ]
        .into_iter()
        .collect(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EndpointInterface, IpamData};
    use ovn_driver_common::ErrorKind;
    use ovn_driver_test::FakeHost;
    use ovn_nbdb::MemoryNb;
    use pretty_assertions::assert_eq;

    const NET: &str = "5f3c8a91d2e4b7a06c1f";
    const EP: &str = "0123456789abcdef0123";

    fn driver() -> (Arc<MemoryNb>, Arc<FakeHost>, OvnDriver) {
        let nb = Arc::new(MemoryNb::new());
        let host = Arc::new(FakeHost::new());
        let driver = OvnDriver::new(DriverConfig::default(), nb.clone(), host.clone());
        (nb, host, driver)
    }

    fn network(id: &str, pools: &[(&str, &str)]) -> CreateNetworkRequest {
        CreateNetworkRequest {
            network_id: id.to_string(),
            ipv4_data: pools
                .iter()
                .map(|(pool, gateway)| IpamData {
                    pool: pool.to_string(),
                    gateway: gateway.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn endpoint(address: &str, mac: &str) -> CreateEndpointRequest {
        CreateEndpointRequest {
            network_id: NET.to_string(),
            endpoint_id: EP.to_string(),
            interface: Some(EndpointInterface {
                address: address.to_string(),
                mac_address: mac.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_network_uses_last_pool() {
        let (nb, _, driver) = driver();
        driver
            .create_network(&network(
                NET,
                &[("10.0.0.0/24", "10.0.0.1"), ("172.16.0.0/16", "172.16.0.1/16")],
            ))
            .await
            .unwrap();

        let switches = nb.switches();
        assert_eq!(switches.len(), 1);
        let ls = &switches[0];
        assert_eq!(ls.name, "ls-5f3c8a91d2e4");
        assert_eq!(ls.other_config[SUBNET_KEY], "172.16.0.0/16");
        assert_eq!(ls.other_config[GATEWAY_KEY], "172.16.0.1");
        assert_eq!(ls.other_config[NETWORK_KEY], NET);
    }

    #[tokio::test]
    async fn test_create_network_without_pool_is_invalid() {
        let (nb, _, driver) = driver();
        let err = driver.create_network(&network(NET, &[])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(nb.write_count(), 0);
    }

    #[tokio::test]
    async fn test_short_network_id_is_invalid() {
        let (_, _, driver) = driver();
        let err = driver
            .create_network(&network("abc", &[("10.0.0.0/24", "")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_short_ids_on_teardown_succeed_without_writes() {
        let (nb, host, driver) = driver();
        driver.delete_network("net1").await.unwrap();
        driver.delete_endpoint("ep1", "net1").await.unwrap();
        driver.delete_endpoint("ep1", NET).await.unwrap();
        assert!(driver.leave("ep1", "net1").await.unwrap().is_clean());
        assert!(driver.leave(EP, "net1").await.unwrap().is_clean());
        assert_eq!(nb.write_count(), 0);
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_endpoint_generates_mac_and_strips_prefix() {
        let (nb, _, driver) = driver();
        driver
            .create_network(&network(NET, &[("172.16.0.0/16", "172.16.0.1")]))
            .await
            .unwrap();

        let mac = driver.create_endpoint(&endpoint("172.16.0.5/16", "")).await.unwrap();
        assert_eq!(mac, generate_mac(EP));

        let ls = &nb.switches()[0];
        let stored = EndpointMetadata::from_other_config(EP, &ls.other_config).unwrap();
        assert_eq!(stored.ip, "172.16.0.5");
        assert_eq!(stored.mac, mac);
    }

    #[tokio::test]
    async fn test_create_endpoint_keeps_given_mac() {
        let (_, _, driver) = driver();
        driver
            .create_network(&network(NET, &[("172.16.0.0/16", "172.16.0.1")]))
            .await
            .unwrap();
        let mac = driver
            .create_endpoint(&endpoint("172.16.0.5", "02:42:ac:10:00:05"))
            .await
            .unwrap();
        assert_eq!(mac, "02:42:ac:10:00:05");
    }

    #[tokio::test]
    async fn test_create_endpoint_on_unknown_network() {
        let (_, _, driver) = driver();
        let err = driver
            .create_endpoint(&endpoint("172.16.0.5/16", ""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_create_endpoint_without_address_is_invalid() {
        let (_, _, driver) = driver();
        let err = driver.create_endpoint(&endpoint("", "")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_join_without_metadata() {
        let (_, host, driver) = driver();
        driver
            .create_network(&network(NET, &[("172.16.0.0/16", "172.16.0.1")]))
            .await
            .unwrap();
        let err = driver.join(EP, NET).await.unwrap_err();
        assert!(matches!(err, DriverError::MetadataNotFound { .. }));
        assert!(host.links().is_empty());
    }

    #[tokio::test]
    async fn test_join_writes_port_and_switch_reference_in_one_batch() {
        let (nb, host, driver) = driver();
        driver
            .create_network(&network(NET, &[("172.16.0.0/16", "172.16.0.1/16")]))
            .await
            .unwrap();
        driver.create_endpoint(&endpoint("172.16.0.5/16", "")).await.unwrap();
        let writes = nb.write_count();

        let resp = driver.join(EP, NET).await.unwrap();
        assert_eq!(nb.write_count(), writes + 1);
        assert_eq!(resp.interface_name.src_name, "veth0123456_c");
        assert_eq!(resp.interface_name.dst_prefix, "eth");
        assert_eq!(resp.gateway, "172.16.0.1");

        let ports = nb.ports();
        assert_eq!(ports.len(), 1);
        let lsp = &ports[0];
        let address = format!("{} 172.16.0.5", generate_mac(EP));
        assert_eq!(lsp.name, "lsp-0123456789ab-ls-5f3c8a91d2e4");
        assert_eq!(lsp.addresses, vec![address.clone()]);
        assert_eq!(lsp.port_security, vec![address]);
        assert_eq!(lsp.enabled, Some(true));
        assert_eq!(lsp.external_ids[ENDPOINT_KEY], EP);
        assert_eq!(nb.switches()[0].ports, vec![lsp.uuid.clone().unwrap()]);

        assert_eq!(
            host.bridge_port("br-int", "veth0123456").as_deref(),
            Some("lsp-0123456789ab-ls-5f3c8a91d2e4")
        );
    }

    #[tokio::test]
    async fn test_leave_without_join_is_clean() {
        let (_, _, driver) = driver();
        let report = driver.leave(EP, NET).await.unwrap();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_inert_hooks() {
        let (_, _, driver) = driver();
        assert_eq!(driver.capabilities().scope, "local");
        assert_eq!(driver.capabilities().connectivity_scope, "global");
        assert!(driver.endpoint_oper_info(EP, NET).value.is_empty());
        assert!(driver
            .allocate_network(&AllocateNetworkRequest::default())
            .options
            .is_empty());
    }
}
