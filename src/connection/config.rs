//! Client configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::{Attachment, Cache, ServiceRegistry, Tunnel};
use crate::credentials::{CredentialPrompt, TerminalPrompt};
use crate::reachability::{LoadBalancer, PortProbe, TcpProbe};
use crate::types::{
    Credential, DEFAULT_CONNECTION_FIELDS, DEFAULT_PREPARED_FIELDS, Field, HostSpec, Setting,
};

/// Host reported for tunnelled services.
pub const DEFAULT_LOOPBACK_HOST: &str = "127.0.0.1";

/// Configuration for a [`ServiceClient`](crate::ServiceClient).
///
/// Nothing is resolved or contacted when a configuration is built; values may
/// be deferred and collaborators may be given by name.
pub struct ClientConfig {
    /// Name of the client. Defaults to the protocol type name.
    pub name: Option<String>,
    /// Protocol key the client was created for.
    pub protocol: Option<String>,
    /// Raw host.
    pub host: Setting<HostSpec>,
    /// Raw port.
    pub port: Setting<u16>,
    /// Username.
    pub username: Setting<Credential>,
    /// Password.
    pub password: Setting<Credential>,
    /// Registry for resolving named collaborators.
    pub registry: Option<Arc<dyn ServiceRegistry>>,
    /// Port-forwarding tunnel.
    pub tunnel: Attachment<dyn Tunnel>,
    /// Cache client.
    pub cache: Attachment<dyn Cache>,
    /// Fields whose change forces a disconnect.
    pub connection_fields: Vec<Field>,
    /// Fields resolved at preparation.
    pub prepared_fields: Vec<Field>,
    /// Host reported when a tunnel is attached.
    pub loopback_host: String,
    /// Local reachability probe.
    pub probe: Arc<dyn PortProbe>,
    /// Policy for host candidate lists. Defaults to probing availability.
    pub balancer: Option<Arc<dyn LoadBalancer>>,
    /// Source of interactive credentials.
    pub prompt: Box<dyn CredentialPrompt>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: None,
            protocol: None,
            host: Setting::Unset,
            port: Setting::Unset,
            username: Setting::Unset,
            password: Setting::Unset,
            registry: None,
            tunnel: Attachment::None,
            cache: Attachment::None,
            connection_fields: DEFAULT_CONNECTION_FIELDS.to_vec(),
            prepared_fields: DEFAULT_PREPARED_FIELDS.to_vec(),
            loopback_host: DEFAULT_LOOPBACK_HOST.to_string(),
            probe: Arc::new(TcpProbe::default()),
            balancer: None,
            prompt: Box::new(TerminalPrompt),
        }
    }
}

impl ClientConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the protocol key.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Set the host (a host, `host:port`, candidate list or resolver).
    pub fn with_host(mut self, host: impl Into<Setting<HostSpec>>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: impl Into<Setting<u16>>) -> Self {
        self.port = port.into();
        self
    }

    /// Set the username.
    pub fn with_username(mut self, username: impl Into<Setting<Credential>>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<Setting<Credential>>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the collaborator registry.
    pub fn with_registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Attach a tunnel, directly or by name.
    pub fn with_tunnel(mut self, tunnel: impl Into<Attachment<dyn Tunnel>>) -> Self {
        self.tunnel = tunnel.into();
        self
    }

    /// Attach a cache, directly or by name.
    pub fn with_cache(mut self, cache: impl Into<Attachment<dyn Cache>>) -> Self {
        self.cache = cache.into();
        self
    }

    /// Set the fields whose change forces a disconnect.
    pub fn with_connection_fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.connection_fields = fields.into_iter().collect();
        self
    }

    /// Set the fields resolved at preparation.
    pub fn with_prepared_fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.prepared_fields = fields.into_iter().collect();
        self
    }

    /// Set the host reported for tunnelled services.
    pub fn with_loopback_host(mut self, host: impl Into<String>) -> Self {
        self.loopback_host = host.into();
        self
    }

    /// Set the local reachability probe.
    pub fn with_probe(mut self, probe: Arc<dyn PortProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Use a TCP probe with the given timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe = Arc::new(TcpProbe::new(timeout));
        self
    }

    /// Set the load balancing policy for host candidates.
    pub fn with_balancer(mut self, balancer: Arc<dyn LoadBalancer>) -> Self {
        self.balancer = Some(balancer);
        self
    }

    /// Set the source of interactive credentials.
    pub fn with_prompt(mut self, prompt: impl CredentialPrompt + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password)
            .field("tunnel", &self.tunnel)
            .field("cache", &self.cache)
            .field("connection_fields", &self.connection_fields)
            .field("prepared_fields", &self.prepared_fields)
            .field("loopback_host", &self.loopback_host)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.host.is_unset());
        assert_eq!(config.connection_fields, DEFAULT_CONNECTION_FIELDS);
        assert_eq!(config.prepared_fields, DEFAULT_PREPARED_FIELDS);
        assert_eq!(config.loopback_host, "127.0.0.1");
        assert!(config.tunnel.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new()
            .with_name("warehouse")
            .with_host("db.example:5432")
            .with_username(true)
            .with_password(false)
            .with_tunnel("bastion")
            .with_loopback_host("::1")
            .with_connection_fields([Field::Host]);

        assert_eq!(config.name.as_deref(), Some("warehouse"));
        assert_eq!(
            config.host.value().and_then(HostSpec::as_single),
            Some("db.example:5432")
        );
        assert_eq!(config.username.value(), Some(&Credential::Prompt));
        assert_eq!(config.password.value(), Some(&Credential::Disabled));
        assert_eq!(config.tunnel.pending_name(), Some("bastion"));
        assert_eq!(config.loopback_host, "::1");
        assert_eq!(config.connection_fields, vec![Field::Host]);
    }

    #[test]
    fn test_probe_timeout_builds_tcp_probe() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = ClientConfig::new().with_probe_timeout(Duration::from_millis(200));
        assert!(config.probe.is_port_bound("127.0.0.1", port));
    }
}
