//! TCP connect probe transport
//!
//! Measures how long each endpoint takes to accept a TCP connection.
//! Useful on its own for reachability checks, and as the reference
//! transport for the `fanout-probe` binary.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::{Endpoint, Transport, TransportError};

/// Result of one successful probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TcpProbe {
    /// Address the connection was accepted on
    pub peer: SocketAddr,

    /// Time spent in connect
    pub connect_time: Duration,
}

/// Transport that opens and immediately closes a TCP connection
#[derive(Debug, Clone, Default)]
pub struct TcpProbeTransport {
    nodelay: bool,
}

impl TcpProbeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set TCP_NODELAY on probe connections
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

#[async_trait]
impl Transport for TcpProbeTransport {
    type Request = ();
    type Response = TcpProbe;

    fn name(&self) -> &str {
        "tcp-probe"
    }

    #[instrument(skip(self, endpoint, _request), fields(transport = "tcp-probe", endpoint = %endpoint))]
    async fn send(&self, endpoint: &Endpoint, _request: &()) -> Result<TcpProbe, TransportError> {
        let started = Instant::now();
        let stream = TcpStream::connect(endpoint.address.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        let connect_time = started.elapsed();

        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        let peer = stream.peer_addr()?;

        debug!(%peer, connect_ms = connect_time.as_millis() as u64, "Probe connected");
        Ok(TcpProbe { peer, connect_time })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.map(|(_, peer)| peer) });

        let transport = TcpProbeTransport::new().nodelay(true);
        let probe = transport
            .send(&Endpoint::new("local", addr.to_string()), &())
            .await
            .unwrap();

        assert_eq!(probe.peer, addr);
        assert!(accept.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_probe_closed_port() {
        // Bind then drop to find a port with nothing listening
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let result = TcpProbeTransport::new()
            .send(&Endpoint::new("closed", addr.to_string()), &())
            .await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_probe_unresolvable_address() {
        let result = TcpProbeTransport::new()
            .send(&Endpoint::new("bad", "not-an-address"), &())
            .await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
