//! The lazy service client.

use std::cell::Cell;
use std::sync::Arc;

use tracing::{info, info_span, warn};

use crate::collaborators::{Attachment, Cache, Tunnel};
use crate::error::Result;
use crate::protocol::{Protocol, Service};
use crate::reachability::{Reachability, TunnelRoute};
use crate::types::{Credential, Field, HostSpec, ServiceKind, Setting};

use super::config::ClientConfig;
use super::shared::ClientCore;
use super::state::{LifecycleState, LifecycleStats};

/// Raises a flag for the lifetime of the guard and restores it on drop,
/// including during unwinding.
struct FlagGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

/// Re-entrancy guards.
#[derive(Debug, Default)]
struct Guards {
    /// Preparation in progress; nested auto-prepare is suppressed.
    resolving: Cell<bool>,
    /// Disconnect in progress; the field-change monitor is suppressed.
    disconnecting: Cell<bool>,
}

/// A client that connects lazily and reconnects on configuration change.
///
/// This client wraps a [`Protocol`] implementation and provides:
/// - Deferred preparation on first access to a connection field
/// - Reachability checks before connecting, directly or through a tunnel
/// - Automatic disconnect when a connection field changes while connected
/// - [`reset`](Self::reset) back to the pristine configuration
///
/// The client disconnects when dropped.
pub struct ServiceClient<P: Protocol> {
    core: ClientCore,
    protocol: P,
    guards: Guards,
    stats: LifecycleStats,
}

impl<P: Protocol> ServiceClient<P> {
    /// Create a client around `protocol`. Nothing is contacted yet.
    pub fn new(protocol: P, config: ClientConfig) -> Self {
        let core = ClientCore::new(config, short_type_name::<P>(), P::KIND, P::DEFAULT_PORT);
        Self {
            core,
            protocol,
            guards: Guards::default(),
            stats: LifecycleStats::default(),
        }
    }

    /// Create a client around a default-constructed protocol.
    pub fn from_config(config: ClientConfig) -> Self
    where
        P: Default,
    {
        Self::new(P::default(), config)
    }

    /// Name of this client.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Protocol key this client was created for.
    pub fn protocol(&self) -> Option<&str> {
        self.core.protocol()
    }

    /// Kind of service.
    pub fn kind(&self) -> ServiceKind {
        P::KIND
    }

    /// Shared client state.
    pub fn core(&self) -> &ClientCore {
        &self.core
    }

    /// The protocol implementation.
    pub fn driver(&self) -> &P {
        &self.protocol
    }

    /// The protocol implementation, mutably.
    pub fn driver_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    /// Lifecycle statistics.
    pub fn stats(&self) -> &LifecycleStats {
        &self.stats
    }

    /// Current lifecycle state.
    pub fn state(&mut self) -> Result<LifecycleState> {
        if !self.core.prepared {
            return Ok(LifecycleState::Unprepared);
        }
        if self.is_connected()? {
            Ok(LifecycleState::Connected)
        } else {
            Ok(LifecycleState::Prepared)
        }
    }

    /// Check if the client has been prepared.
    pub fn is_prepared(&self) -> bool {
        self.core.prepared
    }

    /// Resolve the configuration, if not already done.
    ///
    /// A no-op when already prepared or when called while a preparation is
    /// in progress.
    pub fn prepare(&mut self) -> Result<()> {
        if self.core.prepared || self.guards.resolving.get() {
            return Ok(());
        }

        let _resolving = FlagGuard::raise(&self.guards.resolving);
        self.protocol.prepare(&mut self.core)?;
        self.core.prepared = true;
        Ok(())
    }

    fn touch(&mut self, field: Field) -> Result<()> {
        if self.guards.disconnecting.get() || !self.core.triggers_prepare(field) {
            return Ok(());
        }
        self.prepare()
    }

    /// Effective host, preparing first.
    ///
    /// This is the loopback host when a tunnel is attached; see
    /// [`raw_host`](Self::raw_host) for the service's own host.
    pub fn host(&mut self) -> Result<Option<String>> {
        self.touch(Field::Host)?;
        Ok(self.core.host().map(str::to_string))
    }

    /// Effective port, preparing first.
    ///
    /// This is the forwarded local port when a tunnel is attached.
    pub fn port(&mut self) -> Result<Option<u16>> {
        self.touch(Field::Port)?;
        self.core.port()
    }

    /// Host of the service itself. Does not prepare.
    pub fn raw_host(&self) -> Option<&str> {
        self.core.raw_host()
    }

    /// Port of the service itself. Does not prepare.
    pub fn raw_port(&self) -> Option<u16> {
        self.core.raw_port()
    }

    /// Resolved username, preparing first.
    pub fn username(&mut self) -> Result<Option<String>> {
        self.touch(Field::Username)?;
        self.core.username()
    }

    /// Resolved password, preparing first.
    pub fn password(&mut self) -> Result<Option<String>> {
        self.touch(Field::Password)?;
        self.core.password()
    }

    /// Attached tunnel, preparing first.
    pub fn tunnel(&mut self) -> Result<Option<Arc<dyn Tunnel>>> {
        self.touch(Field::Tunnel)?;
        Ok(self.core.tunnel().cloned())
    }

    /// Attached cache, preparing first.
    pub fn cache(&mut self) -> Result<Option<Arc<dyn Cache>>> {
        self.touch(Field::Cache)?;
        Ok(self.core.cache().cloned())
    }

    /// Fields whose change forces a disconnect.
    pub fn connection_fields(&self) -> &[Field] {
        self.core.connection_fields()
    }

    /// Replace the fields whose change forces a disconnect.
    pub fn set_connection_fields(&mut self, fields: impl IntoIterator<Item = Field>) {
        self.core.set_connection_fields(fields);
    }

    /// Fields resolved at preparation.
    pub fn prepared_fields(&self) -> &[Field] {
        self.core.prepared_fields()
    }

    /// Replace the fields resolved at preparation.
    pub fn set_prepared_fields(&mut self, fields: impl IntoIterator<Item = Field>) {
        self.core.set_prepared_fields(fields);
    }

    /// Change the host.
    pub fn set_host(&mut self, host: impl Into<Setting<HostSpec>>) -> Result<()> {
        self.before_change(Field::Host)?;
        self.core.host = host.into();
        Ok(())
    }

    /// Change the port.
    pub fn set_port(&mut self, port: impl Into<Setting<u16>>) -> Result<()> {
        self.before_change(Field::Port)?;
        self.core.port = port.into();
        Ok(())
    }

    /// Change the username.
    pub fn set_username(&mut self, username: impl Into<Setting<Credential>>) -> Result<()> {
        self.before_change(Field::Username)?;
        self.core.username = username.into();
        Ok(())
    }

    /// Change the password.
    pub fn set_password(&mut self, password: impl Into<Setting<Credential>>) -> Result<()> {
        self.before_change(Field::Password)?;
        self.core.password = password.into();
        Ok(())
    }

    /// Change the tunnel.
    pub fn set_tunnel(&mut self, tunnel: impl Into<Attachment<dyn Tunnel>>) -> Result<()> {
        self.before_change(Field::Tunnel)?;
        self.core.tunnel = tunnel.into();
        Ok(())
    }

    /// Change the cache.
    pub fn set_cache(&mut self, cache: impl Into<Attachment<dyn Cache>>) -> Result<()> {
        self.before_change(Field::Cache)?;
        self.core.cache = cache.into();
        Ok(())
    }

    /// Disconnect before a connection field changes under a live connection.
    fn before_change(&mut self, field: Field) -> Result<()> {
        if self.guards.disconnecting.get()
            || !self.core.prepared
            || !self.core.connection_fields().contains(&field)
        {
            return Ok(());
        }

        if self.is_connected()? {
            warn!(
                service = %self.core.name(),
                field = %field,
                "Disconnecting prior to changing field that connection is based on"
            );
            self.disconnect()?;
            self.core.prepared = false;
            self.stats.record_invalidation();
        }
        Ok(())
    }

    /// Connect to the service, if not already connected.
    ///
    /// If the connect hook fails the client is [`reset`](Self::reset) and
    /// the hook's error is returned unchanged.
    pub fn connect(&mut self) -> Result<&mut Self> {
        self.prepare()?;

        let span = info_span!("connect", service = %self.core.name());
        let _entered = span.enter();

        let announce = self.core.host().is_some();
        if announce {
            info!("Connecting to {}.", self.core.describe_target());
        }

        self.assert_reachable()?;

        if !self.is_connected()? {
            if let Err(err) = self.protocol.connect(&mut self.core) {
                self.stats.record_failure();
                if let Err(reset_err) = self.reset() {
                    warn!(error = %reset_err, "reset after failed connect did not complete");
                }
                return Err(err);
            }
            self.stats.record_connect();
        }

        if announce {
            info!("Connected to {}.", self.core.describe_target());
        }
        Ok(self)
    }

    fn assert_reachable(&mut self) -> Result<Reachability> {
        let host = self.core.host().map(str::to_string);
        let port = self.core.port()?;

        let route = match (self.core.tunnel(), self.core.raw_host(), self.core.raw_port()) {
            (Some(tunnel), Some(remote_host), Some(remote_port)) => Some(TunnelRoute {
                tunnel: tunnel.as_ref(),
                remote_host,
                remote_port,
            }),
            _ => None,
        };
        let verdict = self.core.reachability.check(host.as_deref(), port, route);

        match verdict {
            Err(err) if err.is_unreachable() => {
                self.disconnect()?;
                Err(err)
            }
            other => other,
        }
    }

    /// Check if the client is connected.
    ///
    /// With a tunnel attached, a forward that is no longer bound locally
    /// counts as dropped and the client disconnects.
    pub fn is_connected(&mut self) -> Result<bool> {
        if !self.core.prepared {
            return Ok(false);
        }

        if let Some(tunnel) = self.core.tunnel().cloned() {
            let (Some(host), Some(port)) = (self.core.raw_host(), self.core.raw_port()) else {
                return Ok(false);
            };
            if !tunnel.has_forward(host, port) {
                return Ok(false);
            }
            let local_port = tunnel.forward(host, port)?;
            let bound = self
                .core
                .reachability
                .probe()
                .is_port_bound(self.core.loopback_host(), local_port);
            if !bound {
                self.disconnect()?;
                return Ok(false);
            }
        }

        Ok(self.protocol.is_connected(&self.core))
    }

    /// Disconnect from the service.
    ///
    /// Any tunnel forward for this endpoint is released even if the
    /// disconnect hook fails; the hook's error is still returned.
    pub fn disconnect(&mut self) -> Result<&mut Self> {
        if !self.core.prepared {
            return Ok(self);
        }

        let outcome = {
            let _disconnecting = FlagGuard::raise(&self.guards.disconnecting);
            let hook = self.protocol.disconnect(&mut self.core);
            let released = self.core.release_forward();
            match (hook, released) {
                (Err(err), Err(release_err)) => {
                    warn!(error = %release_err, "failed to release port forward");
                    Err(err)
                }
                (hook, released) => hook.and(released),
            }
        };

        outcome?;
        self.stats.record_disconnect();
        Ok(self)
    }

    /// Disconnect and connect again.
    pub fn reconnect(&mut self) -> Result<&mut Self> {
        self.disconnect()?;
        self.connect()
    }

    /// Return to the configuration as it was before preparation.
    ///
    /// Disconnects, forgets interactive credentials and restores every value
    /// replaced during preparation. The client ends up unprepared even if the
    /// disconnect fails; that error is returned afterwards.
    pub fn reset(&mut self) -> Result<&mut Self> {
        let disconnected = self.disconnect().map(|_| ());
        self.core.restore();
        self.stats.record_reset();
        disconnected?;
        Ok(self)
    }
}

impl<P: Protocol> Drop for ServiceClient<P> {
    fn drop(&mut self) {
        if let Err(err) = self.disconnect() {
            warn!(service = %self.core.name(), error = %err, "disconnect on drop failed");
        }
    }
}

impl<P: Protocol> Service for ServiceClient<P> {
    fn name(&self) -> &str {
        ServiceClient::name(self)
    }

    fn protocol(&self) -> Option<&str> {
        ServiceClient::protocol(self)
    }

    fn kind(&self) -> ServiceKind {
        ServiceClient::kind(self)
    }

    fn core(&self) -> &ClientCore {
        ServiceClient::core(self)
    }

    fn prepare(&mut self) -> Result<()> {
        ServiceClient::prepare(self)
    }

    fn connect(&mut self) -> Result<()> {
        ServiceClient::connect(self).map(|_| ())
    }

    fn is_connected(&mut self) -> Result<bool> {
        ServiceClient::is_connected(self)
    }

    fn disconnect(&mut self) -> Result<()> {
        ServiceClient::disconnect(self).map(|_| ())
    }

    fn reconnect(&mut self) -> Result<()> {
        ServiceClient::reconnect(self).map(|_| ())
    }

    fn reset(&mut self) -> Result<()> {
        ServiceClient::reset(self).map(|_| ())
    }
}

impl<P: Protocol> std::fmt::Debug for ServiceClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("core", &self.core)
            .field("guards", &self.guards)
            .finish_non_exhaustive()
    }
}

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
