//! Endpoint addressing: `scheme://address[:port]`.
//!
//! Parsing is transport-agnostic. Whether a scheme can actually be bound or
//! connected depends on which transports the context has registered.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Transport endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP: `tcp://host:port`, where host may be `*` to mean every interface
    Tcp { host: String, port: u16 },
    /// IPC (Unix domain socket path): `ipc:///path/to/socket`
    Ipc(PathBuf),
    /// In-process: `inproc://name`
    Inproc(String),
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Supported formats:
    /// - `tcp://127.0.0.1:5555`, `tcp://localhost:5555`, `tcp://*:5555`
    /// - `tcp://[::1]:5555` (IPv6)
    /// - `ipc:///tmp/socket.sock`
    /// - `inproc://name`
    ///
    /// # Examples
    ///
    /// ```
    /// use switchyard_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("tcp://*:5555").unwrap();
    /// assert_eq!(endpoint.scheme(), "tcp");
    ///
    /// let endpoint = Endpoint::parse("inproc://my-endpoint").unwrap();
    /// assert!(endpoint.is_inproc());
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Scheme name used to select a transport.
    pub fn scheme(&self) -> &'static str {
        match self {
            Endpoint::Tcp { .. } => "tcp",
            Endpoint::Ipc(_) => "ipc",
            Endpoint::Inproc(_) => "inproc",
        }
    }

    /// Returns true if this is a TCP endpoint.
    pub fn is_tcp(&self) -> bool {
        matches!(self, Endpoint::Tcp { .. })
    }

    /// Returns true if this is an inproc endpoint.
    pub fn is_inproc(&self) -> bool {
        matches!(self, Endpoint::Inproc(_))
    }
}

fn parse_tcp(addr: &str) -> Result<Endpoint, EndpointError> {
    let invalid = || EndpointError::InvalidTcpAddress(addr.to_string());
    let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok(Endpoint::Tcp {
        host: host.to_string(),
        port,
    })
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            parse_tcp(addr)
        } else if let Some(path) = s.strip_prefix("ipc://") {
            if path.is_empty() {
                Err(EndpointError::InvalidIpcPath(s.to_string()))
            } else {
                Ok(Endpoint::Ipc(PathBuf::from(path)))
            }
        } else if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                Err(EndpointError::InvalidInprocName(
                    "inproc name cannot be empty".to_string(),
                ))
            } else {
                Ok(Endpoint::Inproc(name.to_string()))
            }
        } else {
            Err(EndpointError::InvalidScheme(s.to_string()))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp://[{}]:{}", host, port)
            }
            Endpoint::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Endpoint::Inproc(name) => write!(f, "inproc://{}", name),
        }
    }
}

/// Errors that can occur when parsing endpoints.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid scheme in endpoint: {0} (expected tcp://, ipc://, or inproc://)")]
    InvalidScheme(String),

    #[error("Invalid TCP address: {0}")]
    InvalidTcpAddress(String),

    #[error("Invalid IPC path: {0}")]
    InvalidIpcPath(String),

    #[error("Invalid inproc name: {0}")]
    InvalidInprocName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_wildcard() {
        let endpoint = Endpoint::parse("tcp://*:5555").unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Tcp {
                host: "*".into(),
                port: 5555
            }
        );
        assert_eq!(endpoint.to_string(), "tcp://*:5555");
    }

    #[test]
    fn test_parse_tcp_hostname_and_ipv6() {
        let endpoint = Endpoint::parse("tcp://localhost:5555").unwrap();
        assert!(endpoint.is_tcp());

        let endpoint = Endpoint::parse("tcp://[::1]:5555").unwrap();
        assert_eq!(endpoint.to_string(), "tcp://[::1]:5555");
    }

    #[test]
    fn test_invalid_tcp_address() {
        assert!(matches!(
            Endpoint::parse("tcp://localhost"),
            Err(EndpointError::InvalidTcpAddress(_))
        ));
        assert!(matches!(
            Endpoint::parse("tcp://host:port"),
            Err(EndpointError::InvalidTcpAddress(_))
        ));
    }

    #[test]
    fn test_parse_ipc() {
        let endpoint = Endpoint::parse("ipc:///tmp/test.sock").unwrap();
        assert_eq!(endpoint.scheme(), "ipc");
        assert_eq!(endpoint.to_string(), "ipc:///tmp/test.sock");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = Endpoint::parse("http://127.0.0.1:5555");
        assert!(matches!(result, Err(EndpointError::InvalidScheme(_))));
    }

    #[test]
    fn test_parse_inproc() {
        let endpoint = Endpoint::parse("inproc://my-endpoint").unwrap();
        assert!(endpoint.is_inproc());
        assert_eq!(endpoint.to_string(), "inproc://my-endpoint");
        assert!(matches!(
            Endpoint::parse("inproc://"),
            Err(EndpointError::InvalidInprocName(_))
        ));
    }
}
