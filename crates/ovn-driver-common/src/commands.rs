//! Shell command builders for host interface primitives

use crate::shell::{self, shellquote};

/// Key in `Interface.external_ids` that binds an OVS interface to a logical port.
pub const IFACE_ID_KEY: &str = "iface-id";

/// Key in `Open_vSwitch.external_ids` holding the Northbound connection.
pub const OVN_NB_KEY: &str = "ovn-nb";

/// Build create veth pair command
pub fn build_create_veth_pair_cmd(host_name: &str, peer_name: &str) -> String {
    format!(
        "{} link add {} type veth peer name {}",
        shell::IP_CMD,
        shellquote(host_name),
        shellquote(peer_name)
    )
}

/// Build set link MAC address command
pub fn build_set_mac_cmd(name: &str, mac: &str) -> String {
    format!(
        "{} link set {} address {}",
        shell::IP_CMD,
        shellquote(name),
        shellquote(mac)
    )
}

/// Build set link up command
pub fn build_link_up_cmd(name: &str) -> String {
    format!("{} link set {} up", shell::IP_CMD, shellquote(name))
}

/// Build delete link command
///
/// Deleting either end of a veth pair removes both ends.
pub fn build_delete_link_cmd(name: &str) -> String {
    format!("{} link del {}", shell::IP_CMD, shellquote(name))
}

/// Build attach port to bridge command
///
/// `ovs-vsctl add-port` creates an interface named after the port, so
/// `iface_name` normally equals `port_name`.
pub fn build_attach_port_cmd(
    ovs_db: &str,
    bridge: &str,
    port_name: &str,
    iface_name: &str,
    iface_id: &str,
) -> String {
    format!(
        "{} --db={} --may-exist add-port {} {} -- set Interface {} external_ids:{}={}",
        shell::OVS_VSCTL_CMD,
        shellquote(ovs_db),
        shellquote(bridge),
        shellquote(port_name),
        shellquote(iface_name),
        IFACE_ID_KEY,
        shellquote(iface_id)
    )
}

/// Build detach port from bridge command
pub fn build_detach_port_cmd(ovs_db: &str, bridge: &str, port_name: &str) -> String {
    format!(
        "{} --db={} --if-exists del-port {} {}",
        shell::OVS_VSCTL_CMD,
        shellquote(ovs_db),
        shellquote(bridge),
        shellquote(port_name)
    )
}

/// Build disable tx checksum offload command
pub fn build_disable_tx_offload_cmd(name: &str) -> String {
    format!("{} -K {} tx off", shell::ETHTOOL_CMD, shellquote(name))
}

/// Build read Northbound connection command
pub fn build_get_ovn_nb_cmd(ovs_db: &str) -> String {
    format!(
        "{} --db={} --if-exists get Open_vSwitch . external_ids:{}",
        shell::OVS_VSCTL_CMD,
        shellquote(ovs_db),
        OVN_NB_KEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_create_veth_pair_cmd() {
        let cmd = build_create_veth_pair_cmd("veth0123456", "veth0123456_c");
        assert_eq!(
            cmd,
            "/sbin/ip link add \"veth0123456\" type veth peer name \"veth0123456_c\""
        );
    }

    #[test]
    fn test_build_set_mac_cmd() {
        let cmd = build_set_mac_cmd("veth0123456_c", "02:65:70:31:61:62");
        assert!(cmd.contains("link set \"veth0123456_c\" address"));
        assert!(cmd.contains("02:65:70:31:61:62"));
    }

    #[test]
    fn test_build_attach_port_cmd() {
        let cmd = build_attach_port_cmd(
            "unix:/var/run/openvswitch/db.sock",
            "br-int",
            "veth0123456",
            "veth0123456",
            "lsp-0123456789ab-ls-ba9876543210",
        );
        assert!(cmd.starts_with("/usr/bin/ovs-vsctl"));
        assert!(cmd.contains("--may-exist add-port \"br-int\" \"veth0123456\""));
        assert!(cmd.contains("external_ids:iface-id=\"lsp-0123456789ab-ls-ba9876543210\""));
    }

    #[test]
    fn test_build_detach_port_cmd() {
        let cmd = build_detach_port_cmd("unix:/tmp/db.sock", "br-int", "veth0123456");
        assert!(cmd.contains("--if-exists del-port \"br-int\" \"veth0123456\""));
    }

    #[test]
    fn test_build_disable_tx_offload_cmd() {
        assert_eq!(
            build_disable_tx_offload_cmd("veth0123456"),
            "/sbin/ethtool -K \"veth0123456\" tx off"
        );
    }

    #[test]
    fn test_build_get_ovn_nb_cmd() {
        let cmd = build_get_ovn_nb_cmd("unix:/var/run/openvswitch/db.sock");
        assert!(cmd.ends_with("get Open_vSwitch . external_ids:ovn-nb"));
    }

    #[test]
    fn test_shellquote_safety() {
        let cmd = build_delete_link_cmd("veth; rm -rf /");
        assert!(cmd.contains("\"veth; rm -rf /\""));
    }
}
