//! Collaborator capabilities: tunnels, caches and registry lookup.
//!
//! A client references its collaborators but never owns them. Tunnels and
//! caches can be given directly or by name, in which case they are looked up
//! in a [`ServiceRegistry`] when the client is prepared.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{DuctError, Result};
use crate::protocol::Service;
use crate::types::ServiceKind;

/// A remote host able to forward ports to the local machine.
///
/// Implementations manage their own state, so all methods take `&self`.
pub trait Tunnel: Send + Sync {
    /// Name used in error messages.
    fn name(&self) -> &str;

    /// Host of the tunnel endpoint itself.
    fn host(&self) -> &str;

    /// Check whether `host:port` is reachable from the tunnel's side.
    fn is_port_bound(&self, host: &str, port: u16) -> bool;

    /// Check whether a forward for `host:port` is active.
    fn has_forward(&self, host: &str, port: u16) -> bool;

    /// Forward `host:port` to a local port.
    ///
    /// Returns the existing local port if the forward is already active.
    /// Failures are reported as [`DuctError::Tunnel`].
    fn forward(&self, host: &str, port: u16) -> Result<u16>;

    /// Stop forwarding the given local port.
    fn stop_forward(&self, local_port: u16) -> Result<()>;
}

/// A cache client. Opaque to the lifecycle core.
pub trait Cache: Send + Sync {
    /// Name of this cache.
    fn name(&self) -> &str;
}

/// A service shared between clients through a registry.
pub type SharedService = Arc<Mutex<Box<dyn Service>>>;

/// Something a registry can hand out.
#[derive(Clone)]
pub enum Collaborator {
    /// A port-forwarding tunnel.
    Tunnel(Arc<dyn Tunnel>),
    /// A cache client.
    Cache(Arc<dyn Cache>),
    /// Any other service client.
    Service {
        kind: ServiceKind,
        service: SharedService,
    },
}

impl Collaborator {
    /// The kind of service this collaborator provides.
    pub fn kind(&self) -> ServiceKind {
        match self {
            Collaborator::Tunnel(_) => ServiceKind::RemoteTunnel,
            Collaborator::Cache(_) => ServiceKind::Cache,
            Collaborator::Service { kind, .. } => *kind,
        }
    }
}

impl fmt::Debug for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collaborator::Tunnel(t) => f.debug_tuple("Tunnel").field(&t.name()).finish(),
            Collaborator::Cache(c) => f.debug_tuple("Cache").field(&c.name()).finish(),
            Collaborator::Service { kind, .. } => {
                f.debug_struct("Service").field("kind", kind).finish()
            }
        }
    }
}

/// Runtime lookup of collaborators by name.
pub trait ServiceRegistry: Send + Sync {
    /// Find the collaborator called `name` of the given kind.
    ///
    /// Fails when nothing matches or the match is ambiguous.
    fn lookup(&self, name: &str, kind: ServiceKind) -> Result<Collaborator>;
}

/// How a collaborator is attached to a client.
pub enum Attachment<T: ?Sized> {
    /// Nothing attached.
    None,
    /// Attached by name, to be resolved through the registry.
    Named(String),
    /// Attached directly.
    Attached(Arc<T>),
}

impl<T: ?Sized> Attachment<T> {
    /// Check if nothing is attached.
    pub fn is_none(&self) -> bool {
        matches!(self, Attachment::None)
    }

    /// Get the attached collaborator, if resolved.
    pub fn get(&self) -> Option<&Arc<T>> {
        match self {
            Attachment::Attached(c) => Some(c),
            _ => None,
        }
    }

    /// Get the pending name, if unresolved.
    pub fn pending_name(&self) -> Option<&str> {
        match self {
            Attachment::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl<T: ?Sized> Default for Attachment<T> {
    fn default() -> Self {
        Attachment::None
    }
}

impl<T: ?Sized> Clone for Attachment<T> {
    fn clone(&self) -> Self {
        match self {
            Attachment::None => Attachment::None,
            Attachment::Named(name) => Attachment::Named(name.clone()),
            Attachment::Attached(c) => Attachment::Attached(Arc::clone(c)),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Attachment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attachment::None => f.write_str("None"),
            Attachment::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Attachment::Attached(_) => f.write_str("Attached(..)"),
        }
    }
}

impl<T: ?Sized> PartialEq for Attachment<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Attachment::None, Attachment::None) => true,
            (Attachment::Named(a), Attachment::Named(b)) => a == b,
            (Attachment::Attached(a), Attachment::Attached(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Arc<dyn Tunnel>> for Attachment<dyn Tunnel> {
    fn from(tunnel: Arc<dyn Tunnel>) -> Self {
        Attachment::Attached(tunnel)
    }
}

impl<T: Tunnel + 'static> From<Arc<T>> for Attachment<dyn Tunnel> {
    fn from(tunnel: Arc<T>) -> Self {
        Attachment::Attached(tunnel)
    }
}

impl From<Arc<dyn Cache>> for Attachment<dyn Cache> {
    fn from(cache: Arc<dyn Cache>) -> Self {
        Attachment::Attached(cache)
    }
}

impl<T: Cache + 'static> From<Arc<T>> for Attachment<dyn Cache> {
    fn from(cache: Arc<T>) -> Self {
        Attachment::Attached(cache)
    }
}

impl<T: ?Sized> From<&str> for Attachment<T> {
    fn from(name: &str) -> Self {
        Attachment::Named(name.to_string())
    }
}

/// In-memory registry of named collaborators.
#[derive(Default)]
pub struct CollaboratorRegistry {
    entries: Vec<(String, Collaborator)>,
}

impl CollaboratorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collaborator under `name`.
    pub fn register(&mut self, name: impl Into<String>, collaborator: Collaborator) {
        self.entries.push((name.into(), collaborator));
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, collaborator: Collaborator) -> Self {
        self.register(name, collaborator);
        self
    }

    /// Number of registered collaborators.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ServiceRegistry for CollaboratorRegistry {
    fn lookup(&self, name: &str, kind: ServiceKind) -> Result<Collaborator> {
        let mut matches = self
            .entries
            .iter()
            .filter(|(n, c)| n == name && c.kind() == kind)
            .map(|(_, c)| c);

        match (matches.next(), matches.count()) {
            (Some(found), 0) => Ok(found.clone()),
            (Some(_), extra) => Err(DuctError::AmbiguousLookup {
                name: name.to_string(),
                kind,
                count: extra + 1,
            }),
            (None, _) => Err(DuctError::LookupFailed {
                name: name.to_string(),
                kind,
            }),
        }
    }
}

impl fmt::Debug for CollaboratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(n, c)| (n, c.kind())))
            .finish()
    }
}
