//! Protocol-independent client state and the base preparation contract.

use std::sync::Arc;

use tracing::{debug, info};

use crate::collaborators::{Attachment, Cache, Collaborator, ServiceRegistry, Tunnel};
use crate::credentials::CredentialResolver;
use crate::error::{DuctError, Result};
use crate::reachability::{AvailabilityBalancer, LoadBalancer, ReachabilityChecker, split_host_port};
use crate::types::{Credential, Field, HostSpec, ServiceKind, Setting, ordered_fields};

use super::config::ClientConfig;

/// Values as they were before preparation, recorded once per field.
#[derive(Default, Clone)]
struct Snapshot {
    host: Option<Setting<HostSpec>>,
    port: Option<Setting<u16>>,
    username: Option<Setting<Credential>>,
    password: Option<Setting<Credential>>,
    tunnel: Option<Attachment<dyn Tunnel>>,
    cache: Option<Attachment<dyn Cache>>,
}

impl Snapshot {
    fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        if self.host.is_some() {
            fields.push(Field::Host);
        }
        if self.port.is_some() {
            fields.push(Field::Port);
        }
        if self.tunnel.is_some() {
            fields.push(Field::Tunnel);
        }
        if self.cache.is_some() {
            fields.push(Field::Cache);
        }
        if self.username.is_some() {
            fields.push(Field::Username);
        }
        if self.password.is_some() {
            fields.push(Field::Password);
        }
        fields
    }
}

/// Keep the first recorded value.
fn record<T: Clone>(slot: &mut Option<T>, value: &T) {
    if slot.is_none() {
        *slot = Some(value.clone());
    }
}

/// Client state shared by every protocol implementation.
///
/// Protocol hooks receive this to read the effective endpoint and
/// credentials. Lifecycle transitions are driven by
/// [`ServiceClient`](crate::ServiceClient).
pub struct ClientCore {
    name: String,
    protocol: Option<String>,
    kind: ServiceKind,
    default_port: Option<u16>,

    pub(super) host: Setting<HostSpec>,
    pub(super) port: Setting<u16>,
    pub(super) username: Setting<Credential>,
    pub(super) password: Setting<Credential>,

    registry: Option<Arc<dyn ServiceRegistry>>,
    pub(super) tunnel: Attachment<dyn Tunnel>,
    pub(super) cache: Attachment<dyn Cache>,

    connection_fields: Vec<Field>,
    prepared_fields: Vec<Field>,
    loopback_host: String,

    pub(super) reachability: ReachabilityChecker,
    balancer: Arc<dyn LoadBalancer>,
    credentials: CredentialResolver,

    snapshot: Snapshot,
    pub(super) prepared: bool,
}

impl ClientCore {
    pub(super) fn new(
        config: ClientConfig,
        type_name: &str,
        kind: ServiceKind,
        default_port: Option<u16>,
    ) -> Self {
        let balancer = config
            .balancer
            .unwrap_or_else(|| Arc::new(AvailabilityBalancer::new(Arc::clone(&config.probe))));

        Self {
            name: config.name.unwrap_or_else(|| type_name.to_string()),
            protocol: config.protocol,
            kind,
            default_port,
            host: config.host,
            port: config.port,
            username: config.username,
            password: config.password,
            registry: config.registry,
            tunnel: config.tunnel,
            cache: config.cache,
            connection_fields: ordered_fields(config.connection_fields),
            prepared_fields: ordered_fields(config.prepared_fields),
            loopback_host: config.loopback_host,
            reachability: ReachabilityChecker::new(config.probe),
            balancer,
            credentials: CredentialResolver::new(config.prompt),
            snapshot: Snapshot::default(),
            prepared: false,
        }
    }

    /// Name of the client.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protocol key the client was created for.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Kind of service.
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    /// Check if the client has been prepared.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Fields whose change forces a disconnect.
    pub fn connection_fields(&self) -> &[Field] {
        &self.connection_fields
    }

    /// Fields resolved at preparation.
    pub fn prepared_fields(&self) -> &[Field] {
        &self.prepared_fields
    }

    pub(super) fn set_connection_fields(&mut self, fields: impl IntoIterator<Item = Field>) {
        self.connection_fields = ordered_fields(fields);
    }

    pub(super) fn set_prepared_fields(&mut self, fields: impl IntoIterator<Item = Field>) {
        self.prepared_fields = ordered_fields(fields);
    }

    /// Whether accessing `field` should prepare the client first.
    pub(super) fn triggers_prepare(&self, field: Field) -> bool {
        field == Field::Cache || self.connection_fields.contains(&field)
    }

    /// Fields currently recorded in the preparation snapshot.
    pub fn snapshot_fields(&self) -> Vec<Field> {
        self.snapshot.fields()
    }

    /// Raw host setting.
    pub fn host_setting(&self) -> &Setting<HostSpec> {
        &self.host
    }

    /// Raw port setting.
    pub fn port_setting(&self) -> &Setting<u16> {
        &self.port
    }

    /// Raw username setting.
    pub fn username_setting(&self) -> &Setting<Credential> {
        &self.username
    }

    /// Raw password setting.
    pub fn password_setting(&self) -> &Setting<Credential> {
        &self.password
    }

    /// Host of the service itself, bypassing any tunnel.
    pub fn raw_host(&self) -> Option<&str> {
        self.host.value().and_then(HostSpec::as_single)
    }

    /// Port of the service itself, bypassing any tunnel.
    pub fn raw_port(&self) -> Option<u16> {
        self.port.value().copied()
    }

    /// Host to connect to: the loopback host if tunnelled.
    pub fn host(&self) -> Option<&str> {
        if self.tunnel.is_none() {
            self.raw_host()
        } else {
            Some(&self.loopback_host)
        }
    }

    /// Port to connect to: the forwarded local port if tunnelled.
    ///
    /// With a tunnel attached this establishes the forward if needed.
    pub fn port(&self) -> Result<Option<u16>> {
        match &self.tunnel {
            Attachment::None => Ok(self.raw_port()),
            Attachment::Named(_) => Ok(None),
            Attachment::Attached(tunnel) => match (self.raw_host(), self.raw_port()) {
                (Some(host), Some(port)) => tunnel.forward(host, port).map(Some),
                _ => Ok(None),
            },
        }
    }

    /// Resolved username.
    pub fn username(&mut self) -> Result<Option<String>> {
        self.credentials.username(&self.username, &self.name)
    }

    /// Resolved password.
    pub fn password(&mut self) -> Result<Option<String>> {
        self.credentials.password(&self.password, &self.name)
    }

    /// Check if a credential has been entered interactively.
    pub fn has_cached_credential(&self, field: Field) -> bool {
        self.credentials.is_cached(field)
    }

    /// Attached tunnel, once resolved.
    pub fn tunnel(&self) -> Option<&Arc<dyn Tunnel>> {
        self.tunnel.get()
    }

    /// Attached cache, once resolved.
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.get()
    }

    /// Collaborator registry.
    pub fn registry(&self) -> Option<&Arc<dyn ServiceRegistry>> {
        self.registry.as_ref()
    }

    /// Host this client is reported as when tunnelled.
    pub fn loopback_host(&self) -> &str {
        &self.loopback_host
    }

    /// The base preparation contract.
    ///
    /// Resolves named collaborators, evaluates deferred fields, picks one
    /// host out of a candidate list, splits `host:port` and normalizes the
    /// port. Every replaced value is recorded so [`reset`] can restore it.
    ///
    /// [`reset`]: crate::ServiceClient::reset
    pub fn prepare_fields(&mut self) -> Result<()> {
        self.resolve_collaborators()?;

        for field in self.prepared_fields.clone() {
            self.resolve_deferred(field)?;
        }

        let chosen = match &self.host {
            Setting::Value(HostSpec::Candidates(candidates)) => {
                Some(self.balancer.select(candidates, self.raw_port())?)
            }
            _ => None,
        };
        if let Some(host) = chosen {
            debug!(host = %host, "selected host from candidates");
            record(&mut self.snapshot.host, &self.host);
            self.host = Setting::Value(HostSpec::Single(host));
        }

        let split = self
            .raw_host()
            .and_then(split_host_port)
            .map(|(host, port)| (host.to_string(), port.to_string()));
        if let Some((host, port)) = split {
            let port = port
                .parse::<u16>()
                .map_err(|_| DuctError::InvalidPort(port.clone()))?;
            record(&mut self.snapshot.host, &self.host);
            record(&mut self.snapshot.port, &self.port);
            self.host = Setting::Value(HostSpec::Single(host));
            self.port = Setting::Value(port);
        }

        if self.port.is_unset() && self.raw_host().is_some() {
            if let Some(port) = self.default_port {
                record(&mut self.snapshot.port, &self.port);
                self.port = Setting::Value(port);
            }
        }

        match self.port {
            Setting::Value(0) => {
                record(&mut self.snapshot.port, &self.port);
                self.port = Setting::Unset;
            }
            Setting::Deferred(_) => {
                return Err(DuctError::configuration(
                    "port is deferred but not listed in the prepared fields",
                ));
            }
            _ => {}
        }

        debug!(
            service = %self.name,
            host = ?self.raw_host(),
            port = ?self.raw_port(),
            "prepared"
        );
        Ok(())
    }

    fn resolve_collaborators(&mut self) -> Result<()> {
        if let Some(registry) = self.registry.clone() {
            if let Attachment::Named(name) = &self.tunnel {
                let resolved = match registry.lookup(name, ServiceKind::RemoteTunnel)? {
                    Collaborator::Tunnel(tunnel) => tunnel,
                    other => return Err(mismatch("tunnel", ServiceKind::RemoteTunnel, &other)),
                };
                record(&mut self.snapshot.tunnel, &self.tunnel);
                self.tunnel = Attachment::Attached(resolved);
            }
            if let Attachment::Named(name) = &self.cache {
                let resolved = match registry.lookup(name, ServiceKind::Cache)? {
                    Collaborator::Cache(cache) => cache,
                    other => return Err(mismatch("cache", ServiceKind::Cache, &other)),
                };
                record(&mut self.snapshot.cache, &self.cache);
                self.cache = Attachment::Attached(resolved);
            }
        }

        if let Some(name) = self.tunnel.pending_name() {
            return Err(DuctError::CollaboratorMismatch {
                field: "tunnel",
                expected: ServiceKind::RemoteTunnel,
                found: format!("unresolved name '{name}'"),
            });
        }
        if let Some(name) = self.cache.pending_name() {
            return Err(DuctError::CollaboratorMismatch {
                field: "cache",
                expected: ServiceKind::Cache,
                found: format!("unresolved name '{name}'"),
            });
        }
        Ok(())
    }

    fn resolve_deferred(&mut self, field: Field) -> Result<()> {
        match field {
            Field::Host => {
                if let Setting::Deferred(resolver) = &self.host {
                    let resolver = Arc::clone(resolver);
                    let value = resolver(self)?;
                    record(&mut self.snapshot.host, &self.host);
                    self.host = Setting::Value(value);
                }
            }
            Field::Port => {
                if let Setting::Deferred(resolver) = &self.port {
                    let resolver = Arc::clone(resolver);
                    let value = resolver(self)?;
                    record(&mut self.snapshot.port, &self.port);
                    self.port = Setting::Value(value);
                }
            }
            Field::Username => {
                if let Setting::Deferred(resolver) = &self.username {
                    let resolver = Arc::clone(resolver);
                    let value = resolver(self)?;
                    record(&mut self.snapshot.username, &self.username);
                    self.username = Setting::Value(value);
                }
            }
            Field::Password => {
                if let Setting::Deferred(resolver) = &self.password {
                    let resolver = Arc::clone(resolver);
                    let value = resolver(self)?;
                    record(&mut self.snapshot.password, &self.password);
                    self.password = Setting::Value(value);
                }
            }
            // Collaborators are resolved through the registry instead.
            Field::Tunnel | Field::Cache => {}
        }
        Ok(())
    }

    /// Stop the tunnel forward for this endpoint, if one is active.
    pub(super) fn release_forward(&self) -> Result<()> {
        let Some(tunnel) = self.tunnel.get() else {
            return Ok(());
        };
        let (Some(host), Some(port)) = (self.raw_host(), self.raw_port()) else {
            return Ok(());
        };
        if tunnel.has_forward(host, port) {
            let local_port = tunnel.forward(host, port)?;
            info!("Freeing up local port {local_port}...");
            tunnel.stop_forward(local_port)?;
        }
        Ok(())
    }

    /// Restore every snapshotted field and forget interactive credentials.
    pub(super) fn restore(&mut self) {
        self.credentials.clear();

        let snapshot = std::mem::take(&mut self.snapshot);
        if let Some(host) = snapshot.host {
            self.host = host;
        }
        if let Some(port) = snapshot.port {
            self.port = port;
        }
        if let Some(username) = snapshot.username {
            self.username = username;
        }
        if let Some(password) = snapshot.password {
            self.password = password;
        }
        if let Some(tunnel) = snapshot.tunnel {
            self.tunnel = tunnel;
        }
        if let Some(cache) = snapshot.cache {
            self.cache = cache;
        }
        self.prepared = false;
    }

    /// `host:port` followed by the tunnel host, for log output.
    pub(super) fn describe_target(&self) -> String {
        let host = self.raw_host().unwrap_or("-");
        let port = self
            .raw_port()
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        match self.tunnel.get() {
            Some(tunnel) => format!("{host}:{port} on {}", tunnel.host()),
            None => format!("{host}:{port}"),
        }
    }
}

fn mismatch(field: &'static str, expected: ServiceKind, found: &Collaborator) -> DuctError {
    DuctError::CollaboratorMismatch {
        field,
        expected,
        found: found.kind().to_string(),
    }
}

impl std::fmt::Debug for ClientCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCore")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tunnel", &self.tunnel)
            .field("prepared", &self.prepared)
            .finish_non_exhaustive()
    }
}
