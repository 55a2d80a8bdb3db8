// src/connection/connector.rs

//! Establishes the transport for the outbound link.

use crate::core::errors::BridgeError;
use async_trait::async_trait;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, lookup_host};
use tracing::debug;

/// The host and port of the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The split halves of an established connection.
pub struct Transport {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// A printable name of the remote end.
    pub peer: String,
}

impl Transport {
    /// Splits any bidirectional stream into a transport.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer: peer.into(),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").field("peer", &self.peer).finish()
    }
}

/// Opens transports to a target. The manager bounds every call with its
/// connect timeout, so implementations need not time out on their own.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, target: &Target) -> Result<Transport, BridgeError>;
}

/// Connects over TCP with `TCP_NODELAY` and keepalive enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, target: &Target) -> Result<Transport, BridgeError> {
        let failure = |reason: String| BridgeError::ConnectFailure {
            target: target.to_string(),
            reason,
        };

        let addrs = lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(|e| failure(format!("address resolution failed: {e}")))?;

        let mut last_error = None;
        for addr in addrs {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()
            } else {
                TcpSocket::new_v6()
            }?;
            socket.set_keepalive(true)?;

            match socket.connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    let peer = stream
                        .peer_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| target.to_string());
                    debug!("TCP connection to {} established.", peer);
                    let (reader, writer) = stream.into_split();
                    return Ok(Transport {
                        reader: Box::new(reader),
                        writer: Box::new(writer),
                        peer,
                    });
                }
                Err(e) => {
                    debug!("Connection attempt to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(failure(match last_error {
            Some(e) => e.to_string(),
            None => "no addresses resolved".to_string(),
        }))
    }
}
