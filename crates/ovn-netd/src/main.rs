//! ovn-netd entry point.
//!
//! Resolves the Northbound connection, builds the driver and serves the
//! Docker plugin API until SIGINT.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use ovn_driver_common::ShellHost;
use ovn_nbdb::{
    normalize, parse_endpoints, MemoryNb, NbClient, OvsdbClient, DEFAULT_NB_CONNECTION,
    MEMORY_CONNECTION, NB_DATABASE,
};
use ovn_netd::{init_logging, plugin, DaemonArgs, OvnDriver};

/// Connection string from the flag, else from the local OVS database, else
/// the local default.
async fn nb_connection(args: &DaemonArgs, host: &ShellHost) -> String {
    if let Some(conn) = &args.nb_connection {
        return normalize(conn);
    }
    match host.ovn_nb_connection().await {
        Ok(Some(conn)) => normalize(&conn),
        Ok(None) => DEFAULT_NB_CONNECTION.to_string(),
        Err(e) => {
            warn!(error = %e, "Could not read ovn-nb from local OVS database, using default");
            DEFAULT_NB_CONNECTION.to_string()
        }
    }
}

async fn nb_client(connection: &str, timeout: Duration) -> Result<Arc<dyn NbClient>> {
    if connection == MEMORY_CONNECTION {
        warn!("Using in-memory Northbound database; nothing is persisted");
        return Ok(Arc::new(MemoryNb::new()));
    }
    let endpoints = parse_endpoints(connection)
        .with_context(|| format!("invalid Northbound connection '{}'", connection))?;
    let client = OvsdbClient::new(endpoints, NB_DATABASE)?.with_timeout(timeout);
    if let Err(e) = client.connect().await {
        // Requests reconnect on their own; the database may come up later.
        warn!(connection, error = %e, "Northbound database not reachable yet");
    }
    Ok(Arc::new(client))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = DaemonArgs::parse();
    init_logging(&args.log_level, args.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting ovn-netd");
    let config = args.driver_config()?;
    let nb_timeout = args.nb_timeout()?;

    let host = ShellHost::new(&args.ovs_socket);
    let connection = nb_connection(&args, &host).await;
    info!(
        nb = %connection,
        nb_timeout_secs = nb_timeout.as_secs(),
        bridge = %config.bridge,
        ovs = %args.ovs_socket,
        revoke_port_on_wiring_failure = config.revoke_port_on_wiring_failure,
        "Driver configuration"
    );

    let client = nb_client(&connection, nb_timeout).await?;
    let driver = Arc::new(OvnDriver::new(config, client, Arc::new(host)));

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => warn!("Received SIGINT, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for ctrl-c"),
        }
    };

    plugin::serve(driver, &args.plugin_socket, shutdown)
        .await
        .with_context(|| format!("plugin API on {}", args.plugin_socket.display()))?;

    info!("ovn-netd stopped");
    Ok(())
}
