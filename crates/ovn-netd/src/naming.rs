//! Derived names for Northbound rows, host links and MAC addresses.
//!
//! Every name is a pure function of the Docker network and endpoint
//! identifiers truncated to a fixed prefix. Two identifiers sharing the
//! prefix map to the same name.

use std::net::IpAddr;

use ovn_driver_common::{DriverError, DriverResult};

/// Identifier prefix length used in switch and port names.
pub const ID_PREFIX_LEN: usize = 12;

/// Endpoint prefix length used in veth names (`veth` + 7 + `_c` fits IFNAMSIZ).
pub const VETH_ID_PREFIX_LEN: usize = 7;

pub const SWITCH_PREFIX: &str = "ls-";
pub const PORT_PREFIX: &str = "lsp-";
pub const VETH_PREFIX: &str = "veth";
pub const CONTAINER_VETH_SUFFIX: &str = "_c";

/// Interface name prefix Docker uses inside the container.
pub const CONTAINER_IFACE_PREFIX: &str = "eth";

fn prefix(id: &str, len: usize) -> &str {
    id.get(..len).unwrap_or(id)
}

/// Rejects identifiers too short to name anything.
pub fn validate_id(kind: &str, id: &str) -> DriverResult<()> {
    if id.len() < ID_PREFIX_LEN || !id.is_ascii() {
        return Err(DriverError::invalid_config(
            kind,
            format!(
                "identifier '{}' must be at least {} ASCII characters",
                id, ID_PREFIX_LEN
            ),
        ));
    }
    Ok(())
}

/// `ls-<network[..12]>`
pub fn network_name(network_id: &str) -> String {
    format!("{}{}", SWITCH_PREFIX, prefix(network_id, ID_PREFIX_LEN))
}

/// `lsp-<endpoint[..12]>-ls-<network[..12]>`
pub fn port_name(endpoint_id: &str, network_id: &str) -> String {
    format!(
        "{}{}-{}",
        PORT_PREFIX,
        prefix(endpoint_id, ID_PREFIX_LEN),
        network_name(network_id)
    )
}

/// Host side of the veth pair, also used as the bridge port name.
pub fn host_veth_name(endpoint_id: &str) -> String {
    format!("{}{}", VETH_PREFIX, prefix(endpoint_id, VETH_ID_PREFIX_LEN))
}

/// Container side of the veth pair.
pub fn container_veth_name(endpoint_id: &str) -> String {
    format!("{}{}", host_veth_name(endpoint_id), CONTAINER_VETH_SUFFIX)
}

/// Locally administered MAC built from the first five bytes of the
/// endpoint identifier.
pub fn generate_mac(endpoint_id: &str) -> String {
    let mut mac = [0x02u8, 0, 0, 0, 0, 0];
    for (slot, byte) in mac[1..].iter_mut().zip(endpoint_id.bytes()) {
        *slot = byte;
    }
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Reduces `addr/len` to `addr`. Bare addresses pass through unchanged.
pub fn address_from_cidr(field: &str, address: &str) -> DriverResult<String> {
    let Some((ip, len)) = address.split_once('/') else {
        return Ok(address.to_string());
    };
    let invalid = || DriverError::invalid_config(field, format!("invalid CIDR address '{}'", address));
    let ip: IpAddr = ip.parse().map_err(|_| invalid())?;
    let len: u8 = len.parse().map_err(|_| invalid())?;
    let max = if ip.is_ipv4() { 32 } else { 128 };
    if len > max {
        return Err(invalid());
    }
    Ok(ip.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NET: &str = "5f3c8a91d2e4b7a06c1f";
    const EP: &str = "0123456789abcdef0123";

    #[test]
    fn test_names() {
        assert_eq!(network_name(NET), "ls-5f3c8a91d2e4");
        assert_eq!(port_name(EP, NET), "lsp-0123456789ab-ls-5f3c8a91d2e4");
        assert_eq!(host_veth_name(EP), "veth0123456");
        assert_eq!(container_veth_name(EP), "veth0123456_c");
        assert!(container_veth_name(EP).len() <= 15);
    }

    #[test]
    fn test_port_name_is_deterministic() {
        assert_eq!(port_name(EP, NET), port_name(EP, NET));
    }

    #[test]
    fn test_shared_prefix_collides() {
        let other = "0123456789abffffffff";
        assert_ne!(EP, other);
        assert_eq!(port_name(EP, NET), port_name(other, NET));
        assert_eq!(host_veth_name(EP), host_veth_name(other));
    }

    #[test]
    fn test_short_ids_do_not_panic() {
        assert_eq!(network_name("abc"), "ls-abc");
        assert_eq!(host_veth_name(""), "veth");
        assert!(validate_id("network", "abc").is_err());
        assert!(validate_id("network", NET).is_ok());
    }

    #[test]
    fn test_generate_mac() {
        // "01234" in ASCII
        assert_eq!(generate_mac(EP), "02:30:31:32:33:34");
        assert_eq!(generate_mac("ab"), "02:61:62:00:00:00");
    }

    #[test]
    fn test_address_from_cidr() {
        assert_eq!(address_from_cidr("gateway", "172.16.0.1/16").unwrap(), "172.16.0.1");
        assert_eq!(address_from_cidr("gateway", "172.16.0.1").unwrap(), "172.16.0.1");
        assert!(address_from_cidr("gateway", "172.16.0/16").is_err());
        assert!(address_from_cidr("gateway", "172.16.0.1/40").is_err());
    }
}
