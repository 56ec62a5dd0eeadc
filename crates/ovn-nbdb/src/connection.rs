//! OVSDB connection strings.
//!
//! Accepted forms are `unix:<path>`, `tcp:<host>:<port>` and `memory:`; a
//! comma separated list names fallback endpoints tried in order.

use std::fmt;
use std::path::PathBuf;

use crate::error::{NbError, NbResult};

/// Northbound endpoint used when Open vSwitch does not advertise one.
pub const DEFAULT_NB_CONNECTION: &str = "unix:/var/run/ovn/ovnnb_db.sock";

/// Connection string selecting the in-process database.
pub const MEMORY_CONNECTION: &str = "memory:";

const KNOWN_SCHEMES: [&str; 6] = ["unix:", "tcp:", "ssl:", "ptcp:", "pssl:", "memory:"];

/// One parsed endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
    Memory,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp:{}", addr),
            Endpoint::Memory => f.write_str(MEMORY_CONNECTION),
        }
    }
}

/// Adds the scheme a bare connection string implies.
///
/// `/path` becomes `unix:/path`, `host:port` becomes `tcp:host:port`, and
/// anything else is taken as a unix socket path.
pub fn normalize(conn: &str) -> String {
    let conn = conn.trim();
    if KNOWN_SCHEMES.iter().any(|scheme| conn.starts_with(scheme)) {
        conn.to_string()
    } else if conn.starts_with('/') {
        format!("unix:{}", conn)
    } else if conn.contains(':') {
        format!("tcp:{}", conn)
    } else {
        format!("unix:{}", conn)
    }
}

/// Parses a comma separated endpoint list. Each entry is normalized first.
pub fn parse_endpoints(conn: &str) -> NbResult<Vec<Endpoint>> {
    let endpoints = conn
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| parse_endpoint(&normalize(entry)))
        .collect::<NbResult<Vec<_>>>()?;

    if endpoints.is_empty() {
        return Err(NbError::UnsupportedEndpoint(conn.to_string()));
    }
    Ok(endpoints)
}

fn parse_endpoint(conn: &str) -> NbResult<Endpoint> {
    if let Some(path) = conn.strip_prefix("unix:") {
        if path.is_empty() {
            return Err(NbError::UnsupportedEndpoint(conn.to_string()));
        }
        return Ok(Endpoint::Unix(PathBuf::from(path)));
    }
    if let Some(addr) = conn.strip_prefix("tcp:") {
        return match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Endpoint::Tcp(addr.to_string()))
            }
            _ => Err(NbError::UnsupportedEndpoint(conn.to_string())),
        };
    }
    if conn == MEMORY_CONNECTION {
        return Ok(Endpoint::Memory);
    }
    // ssl and the passive forms need certificates or a listener.
    Err(NbError::UnsupportedEndpoint(conn.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/var/run/ovn/ovnnb_db.sock"), "unix:/var/run/ovn/ovnnb_db.sock");
        assert_eq!(normalize("10.0.0.5:6641"), "tcp:10.0.0.5:6641");
        assert_eq!(normalize("ovnnb_db.sock"), "unix:ovnnb_db.sock");
        assert_eq!(normalize("tcp:10.0.0.5:6641"), "tcp:10.0.0.5:6641");
        assert_eq!(normalize("ssl:10.0.0.5:6641"), "ssl:10.0.0.5:6641");
    }

    #[test]
    fn test_parse_endpoints() {
        let endpoints = parse_endpoints("tcp:10.0.0.5:6641,/run/ovn/nb.sock").unwrap();
        assert_eq!(
            endpoints,
            vec![
                Endpoint::Tcp("10.0.0.5:6641".to_string()),
                Endpoint::Unix(PathBuf::from("/run/ovn/nb.sock")),
            ]
        );
        assert_eq!(parse_endpoints("memory:").unwrap(), vec![Endpoint::Memory]);
        assert_eq!(endpoints[0].to_string(), "tcp:10.0.0.5:6641");
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        assert!(parse_endpoints("ssl:10.0.0.5:6641").is_err());
        assert!(parse_endpoints("tcp:10.0.0.5").is_err());
        assert!(parse_endpoints("").is_err());
    }
}
