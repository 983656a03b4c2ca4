//! Protocol registry: maps protocol keys to client implementations.
//!
//! Implementations register explicitly at startup:
//!
//! ```no_run
//! # use ductwork::connection::{ClientConfig, ClientCore};
//! # use ductwork::{Protocol, ProtocolRegistry, Result, ServiceKind};
//! #[derive(Default)]
//! struct Sftp;
//!
//! impl Protocol for Sftp {
//!     const PROTOCOLS: &'static [&'static str] = &["sftp", "ssh+files"];
//!     const KIND: ServiceKind = ServiceKind::Filesystem;
//!     const DEFAULT_PORT: Option<u16> = Some(22);
//! #   fn connect(&mut self, _: &mut ClientCore) -> Result<()> { Ok(()) }
//! #   fn is_connected(&mut self, _: &ClientCore) -> bool { false }
//! #   fn disconnect(&mut self, _: &mut ClientCore) -> Result<()> { Ok(()) }
//! }
//!
//! let mut registry = ProtocolRegistry::new();
//! registry.register_protocol::<Sftp>();
//!
//! let client = registry
//!     .resolve("sftp")?
//!     .create(ClientConfig::default().with_host("files.example"));
//! assert_eq!(client.protocol(), Some("sftp"));
//! # Ok::<(), ductwork::DuctError>(())
//! ```

use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::connection::{ClientConfig, ServiceClient, short_type_name};
use crate::error::{DuctError, Result};
use crate::protocol::{Protocol, Service};

type Factory = Arc<dyn Fn(ClientConfig) -> Box<dyn Service> + Send + Sync>;

/// A named way of building clients.
#[derive(Clone)]
pub struct Implementation {
    name: String,
    /// Protocol type for implementations built with [`of`](Self::of).
    type_id: Option<TypeId>,
    factory: Factory,
}

impl Implementation {
    /// Create an implementation from a factory function.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(ClientConfig) -> Box<dyn Service> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            type_id: None,
            factory: Arc::new(factory),
        }
    }

    /// Implementation building `ServiceClient<P>` from a default `P`.
    pub fn of<P>() -> Self
    where
        P: Protocol + Default + 'static,
    {
        let mut implementation = Self::new(short_type_name::<P>(), |config| {
            Box::new(ServiceClient::<P>::from_config(config))
        });
        implementation.type_id = Some(TypeId::of::<P>());
        implementation
    }

    /// Name identifying this implementation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if both build clients the same way.
    ///
    /// Names are for display only; two protocol types sharing a name are
    /// still different implementations.
    pub fn is_same_as(&self, other: &Implementation) -> bool {
        match (self.type_id, other.type_id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => Arc::ptr_eq(&self.factory, &other.factory),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Implementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Implementation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Factory for one protocol key, returned by [`ProtocolRegistry::resolve`].
#[derive(Debug, Clone)]
pub struct ProtocolFactory {
    key: String,
    implementation: Implementation,
}

impl ProtocolFactory {
    /// The protocol key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The implementation bound to the key.
    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    /// Build a client with its protocol set to this factory's key.
    pub fn create(&self, config: ClientConfig) -> Box<dyn Service> {
        (self.implementation.factory)(config.with_protocol(self.key.clone()))
    }
}

/// Maps protocol keys to implementations. The first registrant of a key
/// keeps it.
#[derive(Debug, Default, Clone)]
pub struct ProtocolRegistry {
    bindings: BTreeMap<String, Implementation>,
}

impl ProtocolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind each key to `implementation`, unless another implementation
    /// already holds it.
    pub fn register<I, K>(&mut self, keys: I, implementation: Implementation)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in keys {
            let key = key.as_ref();
            match self.bindings.get(key) {
                Some(existing) if !existing.is_same_as(&implementation) => {
                    warn!(
                        "Ignoring attempt by `{}` to register key '{}', which is already registered for `{}`.",
                        implementation.name, key, existing.name
                    );
                }
                Some(_) => {}
                None => {
                    info!(key, implementation = %implementation.name, "registered protocol");
                    self.bindings.insert(key.to_string(), implementation.clone());
                }
            }
        }
    }

    /// Register `ServiceClient<P>` for every key in `P::PROTOCOLS`.
    pub fn register_protocol<P>(&mut self)
    where
        P: Protocol + Default + 'static,
    {
        self.register(P::PROTOCOLS, Implementation::of::<P>());
    }

    /// Look up the factory for `key`.
    pub fn resolve(&self, key: &str) -> Result<ProtocolFactory> {
        let implementation = self
            .bindings
            .get(key)
            .ok_or_else(|| DuctError::UnknownProtocol(key.to_string()))?;
        Ok(ProtocolFactory {
            key: key.to_string(),
            implementation: implementation.clone(),
        })
    }

    /// Check if `key` is bound.
    pub fn contains(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    /// All bound keys, in order.
    pub fn protocols(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}
