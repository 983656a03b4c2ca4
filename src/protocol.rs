//! Protocol implementation hooks and the type-erased service interface.

use crate::connection::ClientCore;
use crate::error::Result;
use crate::types::ServiceKind;

/// Protocol-specific behaviour plugged into a [`ServiceClient`].
///
/// The client owns the lifecycle and calls these hooks at the right moments;
/// implementations only deal with their own driver.
///
/// [`ServiceClient`]: crate::ServiceClient
pub trait Protocol: Send {
    /// Protocol keys served by this implementation.
    const PROTOCOLS: &'static [&'static str] = &[];

    /// The kind of service this implementation provides.
    const KIND: ServiceKind = ServiceKind::Other;

    /// Port used when a host is configured without one.
    const DEFAULT_PORT: Option<u16> = None;

    /// Prepare the client before first use.
    ///
    /// Overrides must call [`ClientCore::prepare_fields`].
    fn prepare(&mut self, core: &mut ClientCore) -> Result<()> {
        core.prepare_fields()
    }

    /// Establish the underlying connection.
    fn connect(&mut self, core: &mut ClientCore) -> Result<()>;

    /// Check if the underlying connection is alive.
    fn is_connected(&mut self, core: &ClientCore) -> bool;

    /// Tear down the underlying connection. Must be idempotent.
    fn disconnect(&mut self, core: &mut ClientCore) -> Result<()>;
}

/// Object-safe view of a client, independent of its protocol.
pub trait Service: Send {
    /// Name of this client.
    fn name(&self) -> &str;

    /// Protocol key this client was created for.
    fn protocol(&self) -> Option<&str>;

    /// Kind of service.
    fn kind(&self) -> ServiceKind;

    /// Shared client state.
    fn core(&self) -> &ClientCore;

    /// Check if the client has been prepared.
    fn is_prepared(&self) -> bool {
        self.core().is_prepared()
    }

    /// Prepare the client.
    fn prepare(&mut self) -> Result<()>;

    /// Connect, if not connected.
    fn connect(&mut self) -> Result<()>;

    /// Check if the client is connected.
    fn is_connected(&mut self) -> Result<bool>;

    /// Disconnect.
    fn disconnect(&mut self) -> Result<()>;

    /// Disconnect and connect again.
    fn reconnect(&mut self) -> Result<()>;

    /// Return to the unprepared configuration.
    fn reset(&mut self) -> Result<()>;
}
