//! OVSDB JSON-RPC client (RFC 7047) over unix or TCP sockets.
//!
//! Requests are serialized: one `transact` is in flight at a time. Server
//! `echo` requests received while waiting are answered inline. After an I/O
//! failure the connection is dropped and the next request reconnects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::client::NbClient;
use crate::connection::Endpoint;
use crate::error::{NbError, NbResult};
use crate::ops::{OpResult, Transaction};

/// Default time allowed for one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const READ_CHUNK: usize = 64 * 1024;

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

struct Connection {
    stream: Box<dyn Io>,
    buffer: Vec<u8>,
    endpoint: String,
}

impl Connection {
    async fn send(&mut self, message: &Value) -> NbResult<()> {
        let bytes = serde_json::to_vec(message)?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Sends a request and waits for the response carrying its id.
    async fn request(&mut self, id: u64, method: &str, params: Value) -> NbResult<Value> {
        self.send(&json!({"id": id, "method": method, "params": params}))
            .await?;

        loop {
            let message = read_message(&mut self.stream, &mut self.buffer).await?;

            if message.get("method").and_then(Value::as_str) == Some("echo") {
                let reply = json!({
                    "id": message.get("id").cloned().unwrap_or(Value::Null),
                    "result": message.get("params").cloned().unwrap_or_else(|| json!([])),
                    "error": Value::Null,
                });
                self.send(&reply).await?;
                continue;
            }

            match message.get("id").and_then(Value::as_u64) {
                Some(reply_id) if reply_id == id => {}
                Some(other) => {
                    return Err(NbError::Protocol(format!(
                        "response id {} does not match request {}",
                        other, id
                    )))
                }
                // Notifications carry a null id.
                None => continue,
            }

            match message.get("error") {
                Some(Value::Null) | None => {}
                Some(error) => return Err(NbError::Protocol(format!("{} failed: {}", method, error))),
            }
            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }
}

/// Reads one complete JSON value from a stream, buffering partial input.
pub async fn read_message<R>(reader: &mut R, buffer: &mut Vec<u8>) -> NbResult<Value>
where
    R: AsyncRead + Unpin + ?Sized,
{
    loop {
        let mut values = serde_json::Deserializer::from_slice(buffer).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                let consumed = values.byte_offset();
                buffer.drain(..consumed);
                return Ok(value);
            }
            Some(Err(e)) if e.is_eof() => {}
            Some(Err(e)) => return Err(e.into()),
            None => buffer.clear(),
        }

        let mut chunk = vec![0u8; READ_CHUNK];
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(NbError::Connection("connection closed by peer".to_string()));
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

/// JSON-RPC client bound to one database.
pub struct OvsdbClient {
    endpoints: Vec<Endpoint>,
    database: String,
    timeout: Duration,
    next_id: AtomicU64,
    connection: Mutex<Option<Connection>>,
}

impl OvsdbClient {
    /// Creates a client; the first request connects.
    pub fn new(endpoints: Vec<Endpoint>, database: impl Into<String>) -> NbResult<Self> {
        if endpoints.is_empty() {
            return Err(NbError::UnsupportedEndpoint("no endpoints".to_string()));
        }
        if let Some(memory) = endpoints.iter().find(|e| matches!(e, Endpoint::Memory)) {
            return Err(NbError::UnsupportedEndpoint(memory.to_string()));
        }
        Ok(Self {
            endpoints,
            database: database.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            next_id: AtomicU64::new(1),
            connection: Mutex::new(None),
        })
    }

    /// Bounds each request, including the wait for its reply.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connects now instead of on the first request.
    pub async fn connect(&self) -> NbResult<()> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        Ok(())
    }

    async fn open(&self) -> NbResult<Connection> {
        let mut last_error = None;
        for endpoint in &self.endpoints {
            let stream: NbResult<Box<dyn Io>> = match endpoint {
                Endpoint::Unix(path) => UnixStream::connect(path)
                    .await
                    .map(|s| Box::new(s) as Box<dyn Io>)
                    .map_err(NbError::from),
                Endpoint::Tcp(addr) => TcpStream::connect(addr.as_str())
                    .await
                    .map(|s| {
                        let _ = s.set_nodelay(true);
                        Box::new(s) as Box<dyn Io>
                    })
                    .map_err(NbError::from),
                Endpoint::Memory => Err(NbError::UnsupportedEndpoint(endpoint.to_string())),
            };
            match stream {
                Ok(stream) => {
                    info!(endpoint = %endpoint, database = %self.database, "Connected to OVSDB server");
                    return Ok(Connection {
                        stream,
                        buffer: Vec::new(),
                        endpoint: endpoint.to_string(),
                    });
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Cannot connect to OVSDB endpoint");
                    last_error = Some(e);
                }
            }
        }
        Err(NbError::Connection(match last_error {
            Some(e) => format!("no reachable endpoint: {}", e),
            None => "no reachable endpoint".to_string(),
        }))
    }

    /// Issues one JSON-RPC request and returns its `result`.
    #[instrument(skip(self, params), fields(database = %self.database))]
    pub async fn call(&self, method: &str, params: Value) -> NbResult<Value> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(NbError::Connection("not connected".to_string()));
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, endpoint = %connection.endpoint, "Sending OVSDB request");
        let outcome = tokio::time::timeout(self.timeout, connection.request(id, method, params)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(NbError::Connection(format!(
                "{} timed out after {:?}",
                method, self.timeout
            ))),
        };

        // A failed exchange leaves the stream in an unknown state.
        if let Err(e) = &result {
            if e.is_connection_error() || matches!(e, NbError::Json(_)) {
                warn!(error = %e, "Dropping OVSDB connection");
                *guard = None;
            }
        }
        result
    }
}

#[async_trait]
impl NbClient for OvsdbClient {
    async fn transact(&self, txn: Transaction) -> NbResult<Vec<OpResult>> {
        if txn.is_empty() {
            return Ok(Vec::new());
        }
        let result = self.call("transact", txn.to_params(&self.database)).await?;
        match result {
            Value::Array(items) => items.iter().map(OpResult::from_json).collect(),
            other => Err(NbError::Protocol(format!(
                "transact returned {} instead of an array",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Uuid;
    use crate::model::NB_DATABASE;
    use crate::ops::Operation;
    use pretty_assertions::assert_eq;
    use tokio::net::UnixListener;

    fn select_txn() -> Transaction {
        Transaction::new().with(Operation::Select {
            table: "Logical_Switch".to_string(),
            conditions: vec![],
        })
    }

    #[tokio::test]
    async fn test_read_message_handles_split_and_batched_input() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            server.write_all(b"{\"id\": 1, \"res").await.unwrap();
            server.write_all(b"ult\": []}{\"id\": 2}").await.unwrap();
        });

        let mut buffer = Vec::new();
        let first = read_message(&mut client, &mut buffer).await.unwrap();
        assert_eq!(first, json!({"id": 1, "result": []}));
        let second = read_message(&mut client, &mut buffer).await.unwrap();
        assert_eq!(second, json!({"id": 2}));
    }

    #[tokio::test]
    async fn test_transact_answers_echo_and_decodes_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nb.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buffer = Vec::new();
            let request = read_message(&mut stream, &mut buffer).await.unwrap();
            assert_eq!(request["method"], "transact");
            assert_eq!(request["params"][0], NB_DATABASE);

            stream
                .write_all(br#"{"id": "echo", "method": "echo", "params": []}"#)
                .await
                .unwrap();
            let echo = read_message(&mut stream, &mut buffer).await.unwrap();
            assert_eq!(echo["id"], "echo");

            let reply = json!({
                "id": request["id"],
                "result": [{"rows": [{"_uuid": ["uuid", "ls-1"], "name": "ls-a"}]}],
                "error": null,
            });
            stream.write_all(reply.to_string().as_bytes()).await.unwrap();
        });

        let client = OvsdbClient::new(vec![Endpoint::Unix(path)], NB_DATABASE).unwrap();
        let results = client.transact(select_txn()).await.unwrap();
        server.await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(
            crate::datum::row_uuid(&results[0].rows[0]),
            Some(Uuid::real("ls-1"))
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = OvsdbClient::new(
            vec![Endpoint::Unix(dir.path().join("missing.sock"))],
            NB_DATABASE,
        )
        .unwrap();
        let err = client.transact(select_txn()).await.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_silent_server_times_out_and_drops_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nb.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buffer = Vec::new();
            let request = read_message(&mut stream, &mut buffer).await.unwrap();
            assert_eq!(request["method"], "transact");
            // Hold the stream open without replying.
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let client = OvsdbClient::new(vec![Endpoint::Unix(path)], NB_DATABASE)
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let err = client.transact(select_txn()).await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(err.to_string().contains("timed out"));
        assert!(client.connection.lock().await.is_none());
        server.abort();
    }

    #[test]
    fn test_memory_endpoint_rejected() {
        assert!(OvsdbClient::new(vec![Endpoint::Memory], NB_DATABASE).is_err());
    }
}
