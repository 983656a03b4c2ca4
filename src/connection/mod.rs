//! The connection lifecycle of lazy service clients.
//!
//! This module provides:
//! - [`ServiceClient`], the lifecycle state machine around a protocol
//! - [`ClientCore`], the protocol-independent state handed to protocol hooks
//! - [`ClientConfig`] for building clients
//!
//! # Example
//!
//! ```no_run
//! use ductwork::connection::{ClientConfig, ClientCore, ServiceClient};
//! use ductwork::{Protocol, Result};
//!
//! #[derive(Default)]
//! struct Echo {
//!     open: bool,
//! }
//!
//! impl Protocol for Echo {
//!     fn connect(&mut self, core: &mut ClientCore) -> Result<()> {
//!         println!("opening {:?}:{:?}", core.host(), core.port()?);
//!         self.open = true;
//!         Ok(())
//!     }
//!
//!     fn is_connected(&mut self, _core: &ClientCore) -> bool {
//!         self.open
//!     }
//!
//!     fn disconnect(&mut self, _core: &mut ClientCore) -> Result<()> {
//!         self.open = false;
//!         Ok(())
//!     }
//! }
//!
//! // Nothing is resolved or contacted yet.
//! let config = ClientConfig::default().with_host("echo.example:7");
//! let mut client: ServiceClient<Echo> = ServiceClient::from_config(config);
//!
//! // Preparation happens on first access; connecting checks reachability.
//! assert_eq!(client.port().unwrap(), Some(7));
//! client.connect().unwrap();
//! ```

mod client;
mod config;
mod shared;
mod state;

pub use client::ServiceClient;
pub(crate) use client::short_type_name;
pub use config::{ClientConfig, DEFAULT_LOOPBACK_HOST};
pub use shared::ClientCore;
pub use state::{LifecycleState, LifecycleStats};
