//! Reachability verification before connecting.
//!
//! This module provides:
//! - [`ReachabilityChecker`], which validates host/port pairing and checks
//!   that a service answers, locally or through a tunnel
//! - [`PortProbe`] and the TCP based [`TcpProbe`]
//! - Load balancers for picking one host out of several candidates

mod balancer;
mod probe;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::collaborators::Tunnel;
use crate::error::{DuctError, Result};

pub use balancer::{AvailabilityBalancer, LoadBalancer, RoundRobinBalancer};
pub use probe::{DEFAULT_PROBE_TIMEOUT, PortProbe, TcpProbe};

static HOST_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^:]+):([0-9]{1,5})$").expect("host:port pattern is valid")
});

/// Split `host:port` into its parts. The port is returned unparsed.
pub fn split_host_port(value: &str) -> Option<(&str, &str)> {
    let captures = HOST_PORT.captures(value)?;
    let host = captures.get(1)?.as_str();
    let port = captures.get(2)?.as_str();
    Some((host, port))
}

/// Outcome of a successful reachability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// Neither host nor port configured; nothing to verify.
    Unconfigured,
    /// The endpoint answers locally.
    Local,
    /// The endpoint is not bound locally, but the tunnel can reach it.
    ViaTunnel,
}

/// The remote side of a tunnelled endpoint.
#[derive(Clone, Copy)]
pub struct TunnelRoute<'a> {
    /// Tunnel carrying the connection.
    pub tunnel: &'a dyn Tunnel,
    /// Host as seen from the tunnel.
    pub remote_host: &'a str,
    /// Port as seen from the tunnel.
    pub remote_port: u16,
}

/// Validates and probes service endpoints.
#[derive(Clone)]
pub struct ReachabilityChecker {
    probe: Arc<dyn PortProbe>,
}

impl ReachabilityChecker {
    /// Create a checker using `probe` for local checks.
    pub fn new(probe: Arc<dyn PortProbe>) -> Self {
        Self { probe }
    }

    /// The local probe.
    pub fn probe(&self) -> &Arc<dyn PortProbe> {
        &self.probe
    }

    /// Check that `host:port` is reachable.
    ///
    /// `host` and `port` are the effective (local) endpoint; `route` describes
    /// the remote endpoint when a tunnel is attached.
    pub fn check(
        &self,
        host: Option<&str>,
        port: Option<u16>,
        route: Option<TunnelRoute<'_>>,
    ) -> Result<Reachability> {
        let (host, port) = match (host, port) {
            (None, None) => return Ok(Reachability::Unconfigured),
            (Some(host), None) => return Err(DuctError::HostWithoutPort(host.to_string())),
            (None, Some(port)) => return Err(DuctError::PortWithoutHost(port)),
            (Some(host), Some(port)) => (host, port),
        };

        if self.probe.is_port_bound(host, port) {
            return Ok(Reachability::Local);
        }

        match route {
            Some(route) => {
                if route
                    .tunnel
                    .is_port_bound(route.remote_host, route.remote_port)
                {
                    debug!(
                        host = route.remote_host,
                        port = route.remote_port,
                        tunnel = route.tunnel.name(),
                        "endpoint reachable through tunnel"
                    );
                    Ok(Reachability::ViaTunnel)
                } else {
                    Err(DuctError::RemoteUnreachable {
                        tunnel: route.tunnel.name().to_string(),
                        host: route.remote_host.to_string(),
                        port: route.remote_port,
                    })
                }
            }
            None => Err(DuctError::LocalUnreachable {
                host: host.to_string(),
                port,
            }),
        }
    }
}

impl std::fmt::Debug for ReachabilityChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReachabilityChecker").finish_non_exhaustive()
    }
}
