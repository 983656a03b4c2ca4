//! Lazy, self-healing service clients built on std::net.
//!
//! This crate provides the connection lifecycle shared by clients of remote
//! services such as databases, filesystems, REST endpoints and tunnels. A
//! client declares its configuration up front and defers everything else:
//!
//! - Configuration is resolved (prepared) on first access to a connection
//!   field, exactly once per cycle
//! - Connecting verifies that the service is reachable, directly or through
//!   a port-forwarding tunnel
//! - Changing a connection field while connected disconnects first
//! - Resetting restores the configuration exactly as it was given
//!
//! The crate implements no wire protocol. Protocol drivers plug in through
//! the [`Protocol`] trait and are looked up by key in a [`ProtocolRegistry`].
//!
//! # Example
//!
//! ```no_run
//! use ductwork::connection::{ClientConfig, ClientCore};
//! use ductwork::{Protocol, ProtocolRegistry, Result, ServiceKind};
//!
//! #[derive(Default)]
//! struct Warehouse {
//!     session: Option<String>,
//! }
//!
//! impl Protocol for Warehouse {
//!     const PROTOCOLS: &'static [&'static str] = &["warehouse"];
//!     const KIND: ServiceKind = ServiceKind::Database;
//!
//!     fn connect(&mut self, core: &mut ClientCore) -> Result<()> {
//!         let user = core.username()?.unwrap_or_default();
//!         self.session = Some(format!("{user}@{}", core.host().unwrap_or("-")));
//!         Ok(())
//!     }
//!
//!     fn is_connected(&mut self, _core: &ClientCore) -> bool {
//!         self.session.is_some()
//!     }
//!
//!     fn disconnect(&mut self, _core: &mut ClientCore) -> Result<()> {
//!         self.session = None;
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = ProtocolRegistry::new();
//! registry.register_protocol::<Warehouse>();
//!
//! let mut client = registry.resolve("warehouse")?.create(
//!     ClientConfig::default()
//!         .with_host("warehouse.example:5439")
//!         .with_username(true)
//!         .with_password(true),
//! );
//! client.connect()?;
//! # Ok::<(), ductwork::DuctError>(())
//! ```
//!
//! # Lifecycle
//!
//! ```text
//!   Unprepared --prepare()--> Prepared --connect()--> Connected
//!       ^                        ^   <--disconnect()--   |
//!       |                        |                       |
//!       +-------- reset() -------+---- field change -----+
//! ```

pub mod collaborators;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod protocol;
pub mod reachability;
pub mod registry;
pub mod types;

// Re-export commonly used types at the crate root
pub use collaborators::{
    Attachment, Cache, Collaborator, CollaboratorRegistry, ServiceRegistry, Tunnel,
};
pub use connection::{ClientConfig, ClientCore, LifecycleState, ServiceClient};
pub use credentials::{CredentialPrompt, TerminalPrompt};
pub use error::{DuctError, Result};
pub use protocol::{Protocol, Service};
pub use reachability::{PortProbe, ReachabilityChecker, TcpProbe};
pub use registry::{Implementation, ProtocolFactory, ProtocolRegistry};
pub use types::{Credential, Field, HostSpec, ServiceKind, Setting};
