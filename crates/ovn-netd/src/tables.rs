//! Key names used in Northbound `other_config` and `external_ids` columns.

/// Switch `other_config`: owning Docker network id
pub const NETWORK_KEY: &str = "docker:network";

/// Switch `other_config`: subnet CIDR
pub const SUBNET_KEY: &str = "docker:subnet";

/// Switch `other_config`: gateway address (no prefix length)
pub const GATEWAY_KEY: &str = "docker:gateway";

/// Port `external_ids`: owning Docker endpoint id
pub const ENDPOINT_KEY: &str = "docker:endpoint";

/// Prefix of per-endpoint metadata keys in switch `other_config`
pub const ENDPOINT_METADATA_PREFIX: &str = "docker:endpoint:";

/// Metadata key suffixes
pub mod metadata_fields {
    pub const MAC: &str = "mac";
    pub const IP: &str = "ip";
}

/// `docker:endpoint:<endpoint_id>:<field>`
pub fn endpoint_metadata_key(endpoint_id: &str, field: &str) -> String {
    format!("{}{}:{}", ENDPOINT_METADATA_PREFIX, endpoint_id, field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metadata_key() {
        assert_eq!(
            endpoint_metadata_key("0123456789abcdef", metadata_fields::MAC),
            "docker:endpoint:0123456789abcdef:mac"
        );
    }
}
