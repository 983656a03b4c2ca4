//! Selection of one host out of a list of candidates.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;
use tracing::debug;

use super::probe::PortProbe;
use super::split_host_port;
use crate::error::{DuctError, Result};

/// Picks one host from a candidate list.
pub trait LoadBalancer: Send + Sync {
    /// Choose a candidate. `port` is the intended port for candidates that
    /// carry no `:port` suffix of their own.
    fn select(&self, candidates: &[String], port: Option<u16>) -> Result<String>;
}

/// Cycles through the candidates in order.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    next: AtomicUsize,
}

impl RoundRobinBalancer {
    /// Create a balancer starting at the first candidate.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select(&self, candidates: &[String], _port: Option<u16>) -> Result<String> {
        if candidates.is_empty() {
            return Err(DuctError::NoAvailableHost(Vec::new()));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Ok(candidates[index].clone())
    }
}

/// Shuffles the candidates and returns the first one that is listening.
pub struct AvailabilityBalancer {
    probe: Arc<dyn PortProbe>,
}

impl AvailabilityBalancer {
    /// Create a balancer probing with `probe`.
    pub fn new(probe: Arc<dyn PortProbe>) -> Self {
        Self { probe }
    }
}

impl LoadBalancer for AvailabilityBalancer {
    fn select(&self, candidates: &[String], port: Option<u16>) -> Result<String> {
        let mut shuffled = candidates.to_vec();
        shuffled.shuffle(&mut rand::rng());

        for candidate in &shuffled {
            let (host, candidate_port) = match split_host_port(candidate) {
                Some((host, p)) => (host, p.parse::<u16>().ok()),
                None => (candidate.as_str(), None),
            };
            let Some(probe_port) = candidate_port.or(port) else {
                // Nothing to probe against; take it as is.
                return Ok(candidate.clone());
            };
            if self.probe.is_port_bound(host, probe_port) {
                return Ok(candidate.clone());
            }
            debug!(host, port = probe_port, "candidate host not available");
        }

        Err(DuctError::NoAvailableHost(candidates.to_vec()))
    }
}

impl std::fmt::Debug for AvailabilityBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityBalancer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OnlyPort(u16);

    impl PortProbe for OnlyPort {
        fn is_port_bound(&self, _host: &str, port: u16) -> bool {
            port == self.0
        }
    }

    fn hosts(list: &[&str]) -> Vec<String> {
        list.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn test_round_robin_cycles() {
        let balancer = RoundRobinBalancer::new();
        let candidates = hosts(&["a", "b", "c"]);
        let picked: Vec<_> = (0..4)
            .map(|_| balancer.select(&candidates, None).unwrap())
            .collect();
        assert_eq!(picked, ["a", "b", "c", "a"]);
    }

    #[test]
    fn test_round_robin_empty() {
        let err = RoundRobinBalancer::new().select(&[], None).unwrap_err();
        assert!(matches!(err, DuctError::NoAvailableHost(_)));
    }

    #[test]
    fn test_availability_picks_bound_candidate() {
        let balancer = AvailabilityBalancer::new(Arc::new(OnlyPort(7000)));
        let candidates = hosts(&["a:6000", "b:7000", "c:8000"]);
        for _ in 0..10 {
            assert_eq!(balancer.select(&candidates, None).unwrap(), "b:7000");
        }
    }

    #[test]
    fn test_availability_uses_intended_port() {
        let balancer = AvailabilityBalancer::new(Arc::new(OnlyPort(5432)));
        let candidates = hosts(&["a:1", "b"]);
        assert_eq!(balancer.select(&candidates, Some(5432)).unwrap(), "b");
    }

    #[test]
    fn test_availability_none_bound() {
        let balancer = AvailabilityBalancer::new(Arc::new(OnlyPort(1)));
        let err = balancer
            .select(&hosts(&["a", "b"]), Some(2))
            .unwrap_err();
        match err {
            DuctError::NoAvailableHost(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
