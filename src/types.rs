//! Core value types shared by the lifecycle machinery.

use std::fmt;
use std::sync::Arc;

use crate::connection::ClientCore;
use crate::error::Result;

/// The category of service a client or collaborator provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Remote host offering port forwarding.
    RemoteTunnel,
    /// Filesystem client.
    Filesystem,
    /// Database client.
    Database,
    /// Cache client.
    Cache,
    /// REST client.
    RestClient,
    /// Anything else.
    Other,
}

impl ServiceKind {
    /// All kinds, in declaration order.
    pub const ALL: [ServiceKind; 6] = [
        ServiceKind::RemoteTunnel,
        ServiceKind::Filesystem,
        ServiceKind::Database,
        ServiceKind::Cache,
        ServiceKind::RestClient,
        ServiceKind::Other,
    ];

    /// Registry category name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteTunnel => "remotes",
            Self::Filesystem => "filesystems",
            Self::Database => "databases",
            Self::Cache => "caches",
            Self::RestClient => "rest_clients",
            Self::Other => "other",
        }
    }

    /// Parse a registry category name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of the client fields that take part in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Host,
    Port,
    Tunnel,
    Cache,
    Username,
    Password,
}

impl Field {
    /// Field name as used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Port => "port",
            Self::Tunnel => "tunnel",
            Self::Cache => "cache",
            Self::Username => "username",
            Self::Password => "password",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields monitored for changes by default.
pub const DEFAULT_CONNECTION_FIELDS: [Field; 5] = [
    Field::Host,
    Field::Port,
    Field::Tunnel,
    Field::Username,
    Field::Password,
];

/// Fields resolved at preparation time by default.
pub const DEFAULT_PREPARED_FIELDS: [Field; 4] =
    [Field::Host, Field::Port, Field::Username, Field::Password];

/// Collect fields into an ordered set, keeping the first occurrence of each.
pub fn ordered_fields(fields: impl IntoIterator<Item = Field>) -> Vec<Field> {
    let mut out = Vec::new();
    for field in fields {
        if !out.contains(&field) {
            out.push(field);
        }
    }
    out
}

/// A function computing a field value from the client's state.
pub type Resolver<T> = Arc<dyn Fn(&ClientCore) -> Result<T> + Send + Sync>;

/// A field that holds either a literal or a resolver evaluated at preparation.
pub enum Setting<T> {
    /// No value configured.
    Unset,
    /// A literal value.
    Value(T),
    /// A value computed from the client when it is prepared.
    Deferred(Resolver<T>),
}

impl<T> Setting<T> {
    /// Create a deferred setting from a resolver function.
    pub fn deferred<F>(resolver: F) -> Self
    where
        F: Fn(&ClientCore) -> Result<T> + Send + Sync + 'static,
    {
        Setting::Deferred(Arc::new(resolver))
    }

    /// Get the literal value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Setting::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Check if no value is configured.
    pub fn is_unset(&self) -> bool {
        matches!(self, Setting::Unset)
    }

    /// Check if the value is still waiting to be resolved.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Setting::Deferred(_))
    }
}

impl<T> Default for Setting<T> {
    fn default() -> Self {
        Setting::Unset
    }
}

impl<T: Clone> Clone for Setting<T> {
    fn clone(&self) -> Self {
        match self {
            Setting::Unset => Setting::Unset,
            Setting::Value(v) => Setting::Value(v.clone()),
            Setting::Deferred(r) => Setting::Deferred(Arc::clone(r)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Unset => f.write_str("Unset"),
            Setting::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Setting::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl<T: PartialEq> PartialEq for Setting<T> {
    /// Resolvers compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Setting::Unset, Setting::Unset) => true,
            (Setting::Value(a), Setting::Value(b)) => a == b,
            (Setting::Deferred(a), Setting::Deferred(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Raw host configuration: one host or a list of candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSpec {
    /// A single host, optionally with a `:port` suffix.
    Single(String),
    /// Candidates to choose from with a load balancer.
    Candidates(Vec<String>),
}

impl HostSpec {
    /// Get the host if this is a single host.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            HostSpec::Single(h) => Some(h),
            HostSpec::Candidates(_) => None,
        }
    }
}

impl From<&str> for HostSpec {
    fn from(host: &str) -> Self {
        HostSpec::Single(host.to_string())
    }
}

impl From<String> for HostSpec {
    fn from(host: String) -> Self {
        HostSpec::Single(host)
    }
}

impl From<Vec<String>> for HostSpec {
    fn from(hosts: Vec<String>) -> Self {
        HostSpec::Candidates(hosts)
    }
}

impl From<Vec<&str>> for HostSpec {
    fn from(hosts: Vec<&str>) -> Self {
        HostSpec::Candidates(hosts.into_iter().map(String::from).collect())
    }
}

impl From<HostSpec> for Setting<HostSpec> {
    fn from(spec: HostSpec) -> Self {
        Setting::Value(spec)
    }
}

impl From<&str> for Setting<HostSpec> {
    fn from(host: &str) -> Self {
        Setting::Value(host.into())
    }
}

impl From<String> for Setting<HostSpec> {
    fn from(host: String) -> Self {
        Setting::Value(host.into())
    }
}

impl From<Vec<&str>> for Setting<HostSpec> {
    fn from(hosts: Vec<&str>) -> Self {
        Setting::Value(hosts.into())
    }
}

impl From<Vec<String>> for Setting<HostSpec> {
    fn from(hosts: Vec<String>) -> Self {
        Setting::Value(hosts.into())
    }
}

impl From<u16> for Setting<u16> {
    fn from(port: u16) -> Self {
        Setting::Value(port)
    }
}

impl From<Option<u16>> for Setting<u16> {
    fn from(port: Option<u16>) -> Self {
        port.map_or(Setting::Unset, Setting::Value)
    }
}

/// A username or password setting.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Use this value verbatim.
    Value(String),
    /// Ask the user on first use and remember the answer.
    Prompt,
    /// No credential.
    Disabled,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Never print secrets.
            Credential::Value(_) => f.write_str("Value(***)"),
            Credential::Prompt => f.write_str("Prompt"),
            Credential::Disabled => f.write_str("Disabled"),
        }
    }
}

impl From<bool> for Credential {
    /// `true` prompts, `false` disables.
    fn from(prompt: bool) -> Self {
        if prompt {
            Credential::Prompt
        } else {
            Credential::Disabled
        }
    }
}

impl From<Credential> for Setting<Credential> {
    fn from(credential: Credential) -> Self {
        Setting::Value(credential)
    }
}

impl From<&str> for Setting<Credential> {
    fn from(value: &str) -> Self {
        Setting::Value(Credential::Value(value.to_string()))
    }
}

impl From<String> for Setting<Credential> {
    fn from(value: String) -> Self {
        Setting::Value(Credential::Value(value))
    }
}

impl From<bool> for Setting<Credential> {
    fn from(prompt: bool) -> Self {
        Setting::Value(prompt.into())
    }
}
