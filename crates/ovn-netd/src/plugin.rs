//! Docker remote network driver endpoint.
//!
//! libnetwork POSTs JSON to `/Plugin.Activate` and `/NetworkDriver.*` over a
//! unix socket. Failures are answered with HTTP 500 and `{"Err": "..."}`.

use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::UnixListener;
use tracing::{debug, info, warn};

use ovn_driver_common::DriverError;

use crate::driver::OvnDriver;
use crate::types::{
    ActivateResponse, AllocateNetworkRequest, CreateEndpointRequest, CreateEndpointResponse,
    CreateNetworkRequest, DiscoveryNotification, EmptyResponse, EndpointInterface,
    EndpointRequest, ErrorResponse, JoinRequest, NetworkRequest,
    ProgramExternalConnectivityRequest, NETWORK_DRIVER_IMPLEMENTS, PLUGIN_CONTENT_TYPE,
};

type Driver = Arc<OvnDriver>;

/// Error answered to Docker.
#[derive(Debug)]
pub struct PluginError(String);

impl From<DriverError> for PluginError {
    fn from(err: DriverError) -> Self {
        PluginError(err.to_string())
    }
}

impl IntoResponse for PluginError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, PLUGIN_CONTENT_TYPE)],
            Json(ErrorResponse { err: self.0 }),
        )
            .into_response()
    }
}

type PluginResult = Result<Response, PluginError>;

fn reply<T: Serialize>(body: T) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PLUGIN_CONTENT_TYPE)],
        Json(body),
    )
        .into_response()
}

fn empty() -> PluginResult {
    Ok(reply(EmptyResponse {}))
}

/// Decodes a request body. Docker sends no body for some calls.
fn parse<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, PluginError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| PluginError(format!("invalid request body: {}", e)))
}

/// Logs a failed call before it is answered.
fn logged<T>(call: &str, result: Result<T, DriverError>) -> Result<T, PluginError> {
    result.map_err(|e| {
        warn!(call, kind = ?e.kind(), error = %e, "Driver call failed");
        e.into()
    })
}

/// Routes for every plugin call.
pub fn router(driver: Driver) -> Router {
    Router::new()
        .route("/Plugin.Activate", post(activate))
        .route("/NetworkDriver.GetCapabilities", post(get_capabilities))
        .route("/NetworkDriver.CreateNetwork", post(create_network))
        .route("/NetworkDriver.DeleteNetwork", post(delete_network))
        .route("/NetworkDriver.AllocateNetwork", post(allocate_network))
        .route("/NetworkDriver.FreeNetwork", post(free_network))
        .route("/NetworkDriver.CreateEndpoint", post(create_endpoint))
        .route("/NetworkDriver.DeleteEndpoint", post(delete_endpoint))
        .route("/NetworkDriver.EndpointOperInfo", post(endpoint_oper_info))
        .route("/NetworkDriver.Join", post(join))
        .route("/NetworkDriver.Leave", post(leave))
        .route("/NetworkDriver.DiscoverNew", post(discover_new))
        .route("/NetworkDriver.DiscoverDelete", post(discover_delete))
        .route(
            "/NetworkDriver.ProgramExternalConnectivity",
            post(program_external_connectivity),
        )
        .route(
            "/NetworkDriver.RevokeExternalConnectivity",
            post(revoke_external_connectivity),
        )
        .with_state(driver)
}

async fn activate() -> Response {
    info!("Plugin activated");
    reply(ActivateResponse {
        implements: vec![NETWORK_DRIVER_IMPLEMENTS.to_string()],
    })
}

async fn get_capabilities(State(driver): State<Driver>) -> Response {
    reply(driver.capabilities())
}

async fn create_network(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: CreateNetworkRequest = parse(&body)?;
    logged("CreateNetwork", driver.create_network(&req).await)?;
    empty()
}

async fn delete_network(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: NetworkRequest = parse(&body)?;
    logged("DeleteNetwork", driver.delete_network(&req.network_id).await)?;
    empty()
}

async fn allocate_network(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: AllocateNetworkRequest = parse(&body)?;
    Ok(reply(driver.allocate_network(&req)))
}

async fn free_network(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: NetworkRequest = parse(&body)?;
    driver.free_network(&req.network_id);
    empty()
}

async fn create_endpoint(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: CreateEndpointRequest = parse(&body)?;
    let mac = logged("CreateEndpoint", driver.create_endpoint(&req).await)?;

    // libnetwork refuses a MAC from the driver when it assigned one itself.
    let assigned = req
        .interface
        .as_ref()
        .is_some_and(|iface| !iface.mac_address.is_empty());
    let interface = (!assigned).then(|| EndpointInterface {
        mac_address: mac,
        ..Default::default()
    });
    Ok(reply(CreateEndpointResponse { interface }))
}

async fn delete_endpoint(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: EndpointRequest = parse(&body)?;
    logged(
        "DeleteEndpoint",
        driver.delete_endpoint(&req.endpoint_id, &req.network_id).await,
    )?;
    empty()
}

async fn endpoint_oper_info(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: EndpointRequest = parse(&body)?;
    Ok(reply(driver.endpoint_oper_info(&req.endpoint_id, &req.network_id)))
}

async fn join(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: JoinRequest = parse(&body)?;
    debug!(sandbox = %req.sandbox_key, "Join requested");
    let resp = logged("Join", driver.join(&req.endpoint_id, &req.network_id).await)?;
    Ok(reply(resp))
}

async fn leave(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: EndpointRequest = parse(&body)?;
    let report = logged("Leave", driver.leave(&req.endpoint_id, &req.network_id).await)?;
    for warning in report.warnings() {
        debug!(endpoint = %req.endpoint_id, %warning, "Leave finished with warning");
    }
    empty()
}

async fn discover_new(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: DiscoveryNotification = parse(&body)?;
    driver.discover_new(&req);
    empty()
}

async fn discover_delete(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: DiscoveryNotification = parse(&body)?;
    driver.discover_delete(&req);
    empty()
}

async fn program_external_connectivity(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: ProgramExternalConnectivityRequest = parse(&body)?;
    driver.program_external_connectivity(&req);
    empty()
}

async fn revoke_external_connectivity(State(driver): State<Driver>, body: Bytes) -> PluginResult {
    let req: EndpointRequest = parse(&body)?;
    driver.revoke_external_connectivity(&req.endpoint_id, &req.network_id);
    empty()
}

/// Binds the plugin socket, creating its directory and replacing a stale
/// socket file left by a previous run.
pub fn bind(socket_path: &Path) -> io::Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::remove_file(socket_path) {
        Ok(()) => debug!(socket = %socket_path.display(), "Removed stale plugin socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    UnixListener::bind(socket_path)
}

/// Serves the plugin API until `shutdown` resolves, then removes the socket.
pub async fn serve<F>(driver: Driver, socket_path: &Path, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = bind(socket_path)?;
    info!(socket = %socket_path.display(), "Plugin API listening");

    let result = axum::serve(listener, router(driver))
        .with_graceful_shutdown(shutdown)
        .await;

    if let Err(e) = std::fs::remove_file(socket_path) {
        debug!(socket = %socket_path.display(), error = %e, "Could not remove plugin socket");
    }
    result
}
