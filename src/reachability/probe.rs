//! Local port probing.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::trace;

/// Default timeout for a single probe connection.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Checks whether something is listening on `host:port`.
pub trait PortProbe: Send + Sync {
    /// Check if `host:port` accepts connections.
    fn is_port_bound(&self, host: &str, port: u16) -> bool;
}

/// Probes by opening a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    /// Create a probe with the given connect timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Get the connect timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl PortProbe for TcpProbe {
    fn is_port_bound(&self, host: &str, port: u16) -> bool {
        let addrs = match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                trace!(host, port, error = %e, "could not resolve probe target");
                return false;
            }
        };

        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}
