//! Docker remote network driver messages.
//!
//! Field names follow libnetwork's JSON (PascalCase, with `ID` and `IPv4`
//! spelled as Docker spells them). Unknown fields are ignored and missing
//! ones default, so newer Docker versions keep working.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Driver scope reported to Docker.
pub const LOCAL_SCOPE: &str = "local";

/// Connectivity scope reported to Docker.
pub const GLOBAL_SCOPE: &str = "global";

/// Plugin type announced on activation.
pub const NETWORK_DRIVER_IMPLEMENTS: &str = "NetworkDriver";

/// Content type of every plugin response.
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.2+json";

/// Docker sends `null` for empty maps and lists.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    pub implements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    pub scope: String,
    pub connectivity_scope: String,
}

/// One IPAM pool handed over by Docker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IpamData {
    pub address_space: String,
    /// Subnet CIDR
    pub pool: String,
    /// Gateway, bare or in CIDR form
    pub gateway: String,
    #[serde(deserialize_with = "null_as_default")]
    pub aux_addresses: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateNetworkRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub options: HashMap<String, Value>,
    #[serde(rename = "IPv4Data", deserialize_with = "null_as_default")]
    pub ipv4_data: Vec<IpamData>,
    #[serde(rename = "IPv6Data", deserialize_with = "null_as_default")]
    pub ipv6_data: Vec<IpamData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
}

pub type DeleteNetworkRequest = NetworkRequest;
pub type FreeNetworkRequest = NetworkRequest;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AllocateNetworkRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub options: HashMap<String, String>,
    #[serde(rename = "IPv4Data", deserialize_with = "null_as_default")]
    pub ipv4_data: Vec<IpamData>,
    #[serde(rename = "IPv6Data", deserialize_with = "null_as_default")]
    pub ipv6_data: Vec<IpamData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocateNetworkResponse {
    pub options: HashMap<String, String>,
}

/// Endpoint addressing as Docker sends and receives it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EndpointInterface {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(rename = "AddressIPv6", skip_serializing_if = "String::is_empty")]
    pub address_ipv6: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mac_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateEndpointRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
    pub interface: Option<EndpointInterface>,
    #[serde(deserialize_with = "null_as_default")]
    pub options: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateEndpointResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<EndpointInterface>,
}

/// Any request naming one endpoint on one network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
}

pub type DeleteEndpointRequest = EndpointRequest;
pub type InfoRequest = EndpointRequest;
pub type LeaveRequest = EndpointRequest;
pub type RevokeExternalConnectivityRequest = EndpointRequest;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InfoResponse {
    pub value: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JoinRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
    pub sandbox_key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub options: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceName {
    pub src_name: String,
    pub dst_prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JoinResponse {
    pub interface_name: InterfaceName,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub gateway: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProgramExternalConnectivityRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub options: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DiscoveryNotification {
    pub discovery_type: i64,
    pub discovery_data: Value,
}

/// Empty success body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResponse {}

/// Failure body; Docker surfaces `Err` to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Err")]
    pub err: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_create_network_request_from_docker() {
        let body = json!({
            "NetworkID": "5f3c8a91d2e4b7a06c1f",
            "Options": {"com.docker.network.generic": {}},
            "IPv4Data": [{
                "AddressSpace": "LocalDefault",
                "Pool": "172.16.0.0/16",
                "Gateway": "172.16.0.1/16",
                "AuxAddresses": null
            }],
            "IPv6Data": null
        });
        let req: CreateNetworkRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.network_id, "5f3c8a91d2e4b7a06c1f");
        assert_eq!(req.ipv4_data[0].pool, "172.16.0.0/16");
        assert_eq!(req.ipv4_data[0].gateway, "172.16.0.1/16");
        assert!(req.ipv4_data[0].aux_addresses.is_empty());
        assert!(req.ipv6_data.is_empty());
    }

    #[test]
    fn test_create_endpoint_request_without_mac() {
        let req: CreateEndpointRequest = serde_json::from_value(json!({
            "NetworkID": "n",
            "EndpointID": "e",
            "Interface": {"Address": "172.16.0.5/16", "AddressIPv6": "", "MacAddress": ""}
        }))
        .unwrap();
        let iface = req.interface.unwrap();
        assert_eq!(iface.address, "172.16.0.5/16");
        assert!(iface.mac_address.is_empty());
    }

    #[test]
    fn test_responses_serialize_as_docker_expects() {
        let join = JoinResponse {
            interface_name: InterfaceName {
                src_name: "veth0123456_c".to_string(),
                dst_prefix: "eth".to_string(),
            },
            gateway: "172.16.0.1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&join).unwrap(),
            json!({
                "InterfaceName": {"SrcName": "veth0123456_c", "DstPrefix": "eth"},
                "Gateway": "172.16.0.1"
            })
        );

        let created = CreateEndpointResponse {
            interface: Some(EndpointInterface {
                mac_address: "02:30:31:32:33:34".to_string(),
                ..Default::default()
            }),
        };
        assert_eq!(
            serde_json::to_value(&created).unwrap(),
            json!({"Interface": {"MacAddress": "02:30:31:32:33:34"}})
        );

        let caps = CapabilitiesResponse {
            scope: LOCAL_SCOPE.to_string(),
            connectivity_scope: GLOBAL_SCOPE.to_string(),
        };
        assert_eq!(
            serde_json::to_value(&caps).unwrap(),
            json!({"Scope": "local", "ConnectivityScope": "global"})
        );
        assert_eq!(
            serde_json::to_value(ErrorResponse { err: "boom".into() }).unwrap(),
            json!({"Err": "boom"})
        );
    }
}
