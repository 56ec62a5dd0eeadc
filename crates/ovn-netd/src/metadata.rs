//! Per-endpoint MAC/IP kept in the logical switch's `other_config`.
//!
//! Endpoints are created before their logical port exists, so their
//! addressing is parked on the switch under `docker:endpoint:<id>:mac` and
//! `docker:endpoint:<id>:ip` until join.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use ovn_driver_common::{DriverError, DriverResult};
use ovn_nbdb::{LogicalSwitch, NbApi, Transaction};

use crate::tables::{endpoint_metadata_key, metadata_fields, GATEWAY_KEY};

/// Addressing recorded for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMetadata {
    pub endpoint_id: String,
    pub mac: String,
    pub ip: String,
}

impl EndpointMetadata {
    pub fn new(
        endpoint_id: impl Into<String>,
        mac: impl Into<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            mac: mac.into(),
            ip: ip.into(),
        }
    }

    /// The `other_config` keys owned by an endpoint.
    pub fn keys(endpoint_id: &str) -> Vec<String> {
        vec![
            endpoint_metadata_key(endpoint_id, metadata_fields::MAC),
            endpoint_metadata_key(endpoint_id, metadata_fields::IP),
        ]
    }

    pub fn to_other_config(&self) -> BTreeMap<String, String> {
        [
            (
                endpoint_metadata_key(&self.endpoint_id, metadata_fields::MAC),
                self.mac.clone(),
            ),
            (
                endpoint_metadata_key(&self.endpoint_id, metadata_fields::IP),
                self.ip.clone(),
            ),
        ]
        .into_iter()
        .collect()
    }

    /// Reads an endpoint back; both keys must be present and non-empty.
    pub fn from_other_config(endpoint_id: &str, config: &BTreeMap<String, String>) -> Option<Self> {
        let field = |name: &str| {
            config
                .get(&endpoint_metadata_key(endpoint_id, name))
                .filter(|v| !v.is_empty())
                .cloned()
        };
        Some(Self::new(
            endpoint_id,
            field(metadata_fields::MAC)?,
            field(metadata_fields::IP)?,
        ))
    }
}

/// Endpoint metadata bound to a switch, plus the switch gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEndpoint {
    pub metadata: EndpointMetadata,
    pub gateway: String,
}

/// Reads and writes endpoint metadata through the Northbound database.
#[derive(Clone)]
pub struct MetadataStore {
    nb: NbApi,
}

impl MetadataStore {
    pub fn new(nb: NbApi) -> Self {
        Self { nb }
    }

    async fn require_switch(&self, switch_name: &str) -> DriverResult<LogicalSwitch> {
        self.nb
            .find_switch(switch_name)
            .await?
            .ok_or_else(|| DriverError::not_found("logical switch", switch_name))
    }

    /// Stores an endpoint's MAC and IP in one transaction, replacing any
    /// values left behind under the same keys.
    pub async fn put(&self, switch_name: &str, metadata: &EndpointMetadata) -> DriverResult<()> {
        let ls = self.require_switch(switch_name).await?;
        let keys = EndpointMetadata::keys(&metadata.endpoint_id);
        let txn = Transaction::new()
            .with(NbApi::delete_switch_other_config_op(&ls, &keys)?)
            .with(NbApi::insert_switch_other_config_op(
                &ls,
                metadata.to_other_config(),
            )?);
        self.nb.commit(txn).await?;
        debug!(
            switch = switch_name,
            endpoint = %metadata.endpoint_id,
            mac = %metadata.mac,
            ip = %metadata.ip,
            "Stored endpoint metadata"
        );
        Ok(())
    }

    /// Loads an endpoint's metadata and the switch gateway.
    pub async fn get(&self, switch_name: &str, endpoint_id: &str) -> DriverResult<StoredEndpoint> {
        let ls = self.require_switch(switch_name).await?;
        let metadata = EndpointMetadata::from_other_config(endpoint_id, &ls.other_config)
            .ok_or_else(|| DriverError::MetadataNotFound {
                switch: switch_name.to_string(),
            })?;
        Ok(StoredEndpoint {
            metadata,
            gateway: ls.other_config.get(GATEWAY_KEY).cloned().unwrap_or_default(),
        })
    }

    /// Removes an endpoint's metadata. Failures are logged and dropped.
    pub async fn delete(&self, switch_name: &str, endpoint_id: &str) {
        if let Err(e) = self.try_delete(switch_name, endpoint_id).await {
            if e.is_teardown_tolerable() {
                debug!(switch = switch_name, endpoint = endpoint_id, "No metadata to delete: {}", e);
            } else {
                warn!(switch = switch_name, endpoint = endpoint_id, error = %e, "Failed to delete endpoint metadata");
            }
        }
    }

    async fn try_delete(&self, switch_name: &str, endpoint_id: &str) -> DriverResult<()> {
        let ls = self.require_switch(switch_name).await?;
        let keys = EndpointMetadata::keys(endpoint_id);
        let txn = Transaction::new().with(NbApi::delete_switch_other_config_op(&ls, &keys)?);
        self.nb.commit(txn).await?;
        debug!(switch = switch_name, endpoint = endpoint_id, "Deleted endpoint metadata");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovn_driver_common::ErrorKind;
    use ovn_nbdb::{Fault, MemoryNb};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const EP: &str = "0123456789abcdef0123";

    async fn store_with_switch() -> (Arc<MemoryNb>, MetadataStore) {
        let nb = Arc::new(MemoryNb::new());
        let api = NbApi::new(nb.clone());
        let config = [(GATEWAY_KEY.to_string(), "10.0.0.1".to_string())]
            .into_iter()
            .collect();
        api.commit(Transaction::new().with(NbApi::create_switch_op("ls-a", config)))
            .await
            .unwrap();
        (nb, MetadataStore::new(api))
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (nb, store) = store_with_switch().await;
        let metadata = EndpointMetadata::new(EP, "02:30:31:32:33:34", "10.0.0.5");
        store.put("ls-a", &metadata).await.unwrap();

        let stored = store.get("ls-a", EP).await.unwrap();
        assert_eq!(stored.metadata, metadata);
        assert_eq!(stored.gateway, "10.0.0.1");

        store.delete("ls-a", EP).await;
        let err = store.get("ls-a", EP).await.unwrap_err();
        assert!(matches!(err, DriverError::MetadataNotFound { .. }));
        assert_eq!(nb.switches()[0].other_config.len(), 1);
    }

    #[tokio::test]
    async fn test_put_replaces_stale_values() {
        let (_, store) = store_with_switch().await;
        store
            .put("ls-a", &EndpointMetadata::new(EP, "02:00:00:00:00:01", "10.0.0.5"))
            .await
            .unwrap();
        store
            .put("ls-a", &EndpointMetadata::new(EP, "02:00:00:00:00:02", "10.0.0.6"))
            .await
            .unwrap();
        let stored = store.get("ls-a", EP).await.unwrap();
        assert_eq!(stored.metadata.ip, "10.0.0.6");
    }

    #[tokio::test]
    async fn test_missing_switch() {
        let (_, store) = store_with_switch().await;
        let err = store
            .put("ls-missing", &EndpointMetadata::new(EP, "m", "i"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(matches!(
            store.get("ls-missing", EP).await.unwrap_err(),
            DriverError::NotFound { .. }
        ));
        // Teardown never fails.
        store.delete("ls-missing", EP).await;
    }

    #[tokio::test]
    async fn test_delete_swallows_transaction_failure() {
        let (nb, store) = store_with_switch().await;
        store
            .put("ls-a", &EndpointMetadata::new(EP, "02:00:00:00:00:01", "10.0.0.5"))
            .await
            .unwrap();
        nb.inject(Fault::any_write());
        store.delete("ls-a", EP).await;
        nb.clear_faults();
        assert!(store.get("ls-a", EP).await.is_ok());
    }

    #[test]
    fn test_empty_value_is_missing() {
        let mut config = EndpointMetadata::new(EP, "02:00:00:00:00:01", "").to_other_config();
        assert!(EndpointMetadata::from_other_config(EP, &config).is_none());
        config.insert(endpoint_metadata_key(EP, metadata_fields::IP), "10.0.0.5".into());
        assert!(EndpointMetadata::from_other_config(EP, &config).is_some());
    }
}
