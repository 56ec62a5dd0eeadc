//! Docker request fixtures
//!
//! Bodies are built as JSON the way libnetwork sends them, so the same
//! fixture drives both the HTTP handlers and the driver API (after
//! `serde_json::from_value`).

use serde_json::{json, Value};

/// A 64 hex character network id, as Docker generates them.
pub const NETWORK_ID: &str = "5f3c8a91d2e4b7a06c1f9e8d7c6b5a4938271605f4e3d2c1b0a9f8e7d6c5b4a3";

/// A second network with a distinct 12-char prefix.
pub const OTHER_NETWORK_ID: &str =
    "9a8b7c6d5e4f30211203f4e5d6c7b8a99a8b7c6d5e4f30211203f4e5d6c7b8a9";

pub const ENDPOINT_ID: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

pub const OTHER_ENDPOINT_ID: &str =
    "fedcba9876543210fedcba9876543210fedcba9876543210fedcba9876543210";

pub const SUBNET: &str = "172.16.0.0/16";
pub const GATEWAY_CIDR: &str = "172.16.0.1/16";
pub const GATEWAY: &str = "172.16.0.1";

/// `NetworkDriver.CreateNetwork` with one IPv4 pool.
pub fn create_network_body(network_id: &str, pool: &str, gateway: &str) -> Value {
    json!({
        "NetworkID": network_id,
        "Options": {
            "com.docker.network.enable_ipv6": false,
            "com.docker.network.generic": {}
        },
        "IPv4Data": [{
            "AddressSpace": "LocalDefault",
            "Pool": pool,
            "Gateway": gateway,
            "AuxAddresses": null
        }],
        "IPv6Data": []
    })
}

/// `NetworkDriver.CreateEndpoint`; an empty `mac` leaves the MAC to the driver.
pub fn create_endpoint_body(network_id: &str, endpoint_id: &str, address: &str, mac: &str) -> Value {
    json!({
        "NetworkID": network_id,
        "EndpointID": endpoint_id,
        "Interface": {
            "Address": address,
            "AddressIPv6": "",
            "MacAddress": mac
        },
        "Options": null
    })
}

/// `NetworkDriver.Join`
pub fn join_body(network_id: &str, endpoint_id: &str) -> Value {
    json!({
        "NetworkID": network_id,
        "EndpointID": endpoint_id,
        "SandboxKey": format!("/var/run/docker/netns/{}", &endpoint_id[..12]),
        "Options": null
    })
}

/// Any request naming an endpoint on a network.
pub fn endpoint_body(network_id: &str, endpoint_id: &str) -> Value {
    json!({
        "NetworkID": network_id,
        "EndpointID": endpoint_id
    })
}

pub fn network_body(network_id: &str) -> Value {
    json!({ "NetworkID": network_id })
}
