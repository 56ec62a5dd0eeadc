//! Daemon configuration.
//!
//! Every option can be given as a flag or through the environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use ovn_driver_common::{DriverError, DriverResult};

/// Integration bridge host veths are attached to.
pub const DEFAULT_BRIDGE: &str = "br-int";

/// Local Open vSwitch database.
pub const DEFAULT_OVS_SOCKET: &str = "unix:/var/run/openvswitch/db.sock";

/// Socket Docker discovers the plugin on.
pub const DEFAULT_PLUGIN_SOCKET: &str = "/run/docker/plugins/ovn.sock";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Seconds a Northbound request may take.
pub const DEFAULT_NB_TIMEOUT_SECS: u64 = 30;

/// OVN network driver for Docker
#[derive(Parser, Debug, Clone)]
#[command(name = "ovn-netd")]
#[command(author, version, about, long_about = None)]
pub struct DaemonArgs {
    /// OVS integration bridge
    #[arg(long, env = "OVN_BRIDGE", default_value = DEFAULT_BRIDGE)]
    pub bridge: String,

    /// Local OVS database endpoint
    #[arg(long, env = "OVS_SOCKET", default_value = DEFAULT_OVS_SOCKET)]
    pub ovs_socket: String,

    /// OVN Northbound endpoint(s); read from the local OVS database when unset.
    /// `memory:` runs against an in-process database.
    #[arg(long, env = "OVN_NB_CONNECTION")]
    pub nb_connection: Option<String>,

    /// Northbound request timeout in seconds
    #[arg(long, env = "OVN_NB_TIMEOUT_SECS", default_value_t = DEFAULT_NB_TIMEOUT_SECS)]
    pub nb_timeout_secs: u64,

    /// Unix socket the plugin API listens on
    #[arg(long, env = "OVN_PLUGIN_SOCKET", default_value = DEFAULT_PLUGIN_SOCKET)]
    pub plugin_socket: PathBuf,

    /// Delete the logical port again when host wiring fails after it was committed
    #[arg(long, env = "OVN_REVOKE_PORT_ON_WIRING_FAILURE")]
    pub revoke_port_on_wiring_failure: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(short = 'l', long, env = "OVN_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "OVN_LOG_JSON")]
    pub log_json: bool,
}

/// Settings the lifecycle driver runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub bridge: String,
    pub revoke_port_on_wiring_failure: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            bridge: DEFAULT_BRIDGE.to_string(),
            revoke_port_on_wiring_failure: false,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> DriverResult<()> {
        if self.bridge.trim().is_empty() {
            return Err(DriverError::invalid_config("bridge", "must not be empty"));
        }
        Ok(())
    }
}

impl DaemonArgs {
    /// Northbound request timeout; zero is rejected.
    pub fn nb_timeout(&self) -> DriverResult<Duration> {
        if self.nb_timeout_secs == 0 {
            return Err(DriverError::invalid_config("nb-timeout-secs", "must be positive"));
        }
        Ok(Duration::from_secs(self.nb_timeout_secs))
    }

    /// Builds and checks the driver settings.
    pub fn driver_config(&self) -> DriverResult<DriverConfig> {
        let config = DriverConfig {
            bridge: self.bridge.clone(),
            revoke_port_on_wiring_failure: self.revoke_port_on_wiring_failure,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let args = DaemonArgs::try_parse_from(["ovn-netd"]).unwrap();
        assert_eq!(args.ovs_socket, DEFAULT_OVS_SOCKET);
        assert_eq!(args.plugin_socket, PathBuf::from(DEFAULT_PLUGIN_SOCKET));
        assert_eq!(args.driver_config().unwrap(), DriverConfig::default());
        assert_eq!(args.nb_timeout().unwrap(), Duration::from_secs(DEFAULT_NB_TIMEOUT_SECS));
    }

    #[test]
    fn test_flags() {
        let args = DaemonArgs::try_parse_from([
            "ovn-netd",
            "--bridge",
            "br-test",
            "--nb-connection",
            "memory:",
            "--revoke-port-on-wiring-failure",
            "--nb-timeout-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(args.nb_connection.as_deref(), Some("memory:"));
        assert_eq!(args.nb_timeout().unwrap(), Duration::from_secs(5));
        let config = args.driver_config().unwrap();
        assert_eq!(config.bridge, "br-test");
        assert!(config.revoke_port_on_wiring_failure);
    }

    #[test]
    fn test_empty_bridge_rejected() {
        let args = DaemonArgs::try_parse_from(["ovn-netd", "--bridge", " "]).unwrap();
        assert!(args.driver_config().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = DaemonArgs::try_parse_from(["ovn-netd", "--nb-timeout-secs", "0"]).unwrap();
        assert!(args.nb_timeout().is_err());
    }
}
