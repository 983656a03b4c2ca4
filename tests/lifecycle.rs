//! Lifecycle behaviour of `ServiceClient` without any real network.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{FixedPrompt, ScriptedProbe, ScriptedProtocol, init_tracing};
use ductwork::reachability::RoundRobinBalancer;
use ductwork::{ClientConfig, DuctError, Field, HostSpec, LifecycleState, ServiceClient, Setting};

fn client_with(
    config: ClientConfig,
    probe: &Arc<ScriptedProbe>,
) -> (ServiceClient<ScriptedProtocol>, Arc<common::Counters>) {
    let (protocol, counters) = ScriptedProtocol::new();
    let client = ServiceClient::new(protocol, config.with_probe(probe.clone()));
    (client, counters)
}

#[test]
fn test_connect_is_idempotent() {
    init_tracing();
    let probe = ScriptedProbe::new();
    probe.bind("db.example", 5432);
    let (mut client, counters) = client_with(
        ClientConfig::new()
            .with_host("db.example:5432")
            .with_username("bob"),
        &probe,
    );

    client.connect().unwrap();
    client.connect().unwrap();

    assert_eq!(counters.connects(), 1);
    assert_eq!(client.state().unwrap(), LifecycleState::Connected);
    assert_eq!(
        client.driver().last_endpoint.as_deref(),
        Some("bob@db.example:5432")
    );
}

#[test]
fn test_host_port_split_on_prepare() {
    init_tracing();
    let probe = ScriptedProbe::new();
    let (mut client, _) = client_with(ClientConfig::new().with_host("svc.example:4321"), &probe);

    assert_eq!(client.host().unwrap().as_deref(), Some("svc.example"));
    assert_eq!(client.port().unwrap(), Some(4321));

    client.reset().unwrap();
    assert_eq!(
        client.core().host_setting().value().and_then(HostSpec::as_single),
        Some("svc.example:4321")
    );
    assert!(client.core().port_setting().is_unset());
}

#[test]
fn test_reset_restores_deferred_host_list() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let resolver_calls = Arc::clone(&calls);
    let host = Setting::<HostSpec>::deferred(move |_| {
        resolver_calls.fetch_add(1, Ordering::SeqCst);
        Ok(HostSpec::from(vec!["a.example:7000", "b.example:7000"]))
    });

    let probe = ScriptedProbe::new();
    let (mut client, _) = client_with(
        ClientConfig::new()
            .with_host(host)
            .with_balancer(Arc::new(RoundRobinBalancer::new())),
        &probe,
    );

    assert_eq!(client.host().unwrap().as_deref(), Some("a.example"));
    assert_eq!(client.port().unwrap(), Some(7000));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    client.reset().unwrap();
    assert!(!client.is_prepared());
    assert!(client.core().host_setting().is_deferred());
    assert!(client.core().port_setting().is_unset());
    assert!(client.core().snapshot_fields().is_empty());

    // The resolver runs again and the balancer moves on.
    assert_eq!(client.host().unwrap().as_deref(), Some("b.example"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_repeated_reset_keeps_original_configuration() {
    init_tracing();
    let probe = ScriptedProbe::new();
    let (mut client, _) = client_with(
        ClientConfig::new()
            .with_host(vec!["a.example:1", "b.example:1"])
            .with_balancer(Arc::new(RoundRobinBalancer::new())),
        &probe,
    );

    for _ in 0..3 {
        client.prepare().unwrap();
        assert!(client.raw_host().is_some());
        client.reset().unwrap();
        assert_eq!(
            client.core().host_setting(),
            &Setting::Value(HostSpec::from(vec!["a.example:1", "b.example:1"]))
        );
    }
}

#[test]
fn test_field_change_disconnects_once() {
    init_tracing();
    let probe = ScriptedProbe::new();
    probe.bind("old.example", 80);
    probe.bind("new.example", 80);
    let (mut client, counters) =
        client_with(ClientConfig::new().with_host("old.example:80"), &probe);

    client.connect().unwrap();
    client.set_host("new.example:80").unwrap();

    assert_eq!(counters.disconnects(), 1);
    assert!(!client.is_prepared());
    assert_eq!(client.stats().invalidation_count, 1);

    client.connect().unwrap();
    assert_eq!(client.raw_host(), Some("new.example"));
    assert_eq!(counters.connects(), 2);
}

#[test]
fn test_field_change_while_disconnected_keeps_preparation() {
    init_tracing();
    let probe = ScriptedProbe::new();
    let (mut client, counters) = client_with(ClientConfig::new().with_host("db.example:1"), &probe);

    client.prepare().unwrap();
    client.set_port(2u16).unwrap();

    assert!(client.is_prepared());
    assert_eq!(counters.disconnects(), 0);
    assert_eq!(client.raw_port(), Some(2));
}

#[test]
fn test_interactive_username_prompted_once() {
    init_tracing();
    let (prompt, asked) = FixedPrompt::new("alice", "hunter2");
    let probe = ScriptedProbe::new();
    let (mut client, _) = client_with(
        ClientConfig::new()
            .with_username(true)
            .with_password(true)
            .with_prompt(prompt),
        &probe,
    );

    assert_eq!(client.username().unwrap().as_deref(), Some("alice"));
    assert_eq!(client.username().unwrap().as_deref(), Some("alice"));
    assert_eq!(asked.load(Ordering::SeqCst), 1);

    assert_eq!(client.password().unwrap().as_deref(), Some("hunter2"));
    assert_eq!(client.password().unwrap().as_deref(), Some("hunter2"));
    assert_eq!(asked.load(Ordering::SeqCst), 2);
    assert!(client.core().has_cached_credential(Field::Password));

    // Reset forgets what was typed.
    client.reset().unwrap();
    assert!(!client.core().has_cached_credential(Field::Username));
    client.username().unwrap();
    assert_eq!(asked.load(Ordering::SeqCst), 3);
}

#[test]
fn test_empty_username_falls_back_to_login_name() {
    init_tracing();
    let (prompt, asked) = FixedPrompt::new("unused", "unused");
    let probe = ScriptedProbe::new();
    let (mut client, _) = client_with(
        ClientConfig::new().with_username("").with_prompt(prompt),
        &probe,
    );

    assert_eq!(client.username().unwrap().as_deref(), Some("login-user"));
    assert_eq!(asked.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unconfigured_endpoint_skips_reachability() {
    init_tracing();
    let probe = ScriptedProbe::new();
    let (mut client, counters) = client_with(ClientConfig::new().with_username("bob"), &probe);

    client.connect().unwrap();

    assert_eq!(probe.calls(), 0);
    assert_eq!(counters.connects(), 1);
    assert_eq!(client.driver().last_endpoint.as_deref(), Some("bob@-:-"));
}

#[test]
fn test_unreachable_endpoint_fails_before_connect() {
    init_tracing();
    let probe = ScriptedProbe::new();
    let (mut client, counters) =
        client_with(ClientConfig::new().with_host("10.0.0.5:9999"), &probe);

    let err = client.connect().unwrap_err();

    assert!(matches!(
        err,
        DuctError::LocalUnreachable { ref host, port: 9999 } if host == "10.0.0.5"
    ));
    assert!(err.to_string().contains("10.0.0.5:9999"));
    assert_eq!(counters.connects(), 0);
    assert_eq!(counters.disconnects(), 1);
}

#[test]
fn test_failed_connect_resets_and_returns_hook_error() {
    init_tracing();
    let probe = ScriptedProbe::new();
    probe.bind("db.example", 5432);
    let (protocol, counters) = ScriptedProtocol::failing("authentication rejected");
    let mut client = ServiceClient::new(
        protocol,
        ClientConfig::new()
            .with_host("db.example:5432")
            .with_probe(probe.clone()),
    );

    let err = client.connect().unwrap_err();

    assert!(matches!(err, DuctError::Protocol(_)));
    assert_eq!(err.to_string(), "authentication rejected");
    assert_eq!(counters.connects(), 1);
    assert!(!client.is_prepared());
    assert_eq!(client.stats().failure_count, 1);
    assert_eq!(client.stats().reset_count, 1);
    assert_eq!(
        client.core().host_setting().value().and_then(HostSpec::as_single),
        Some("db.example:5432")
    );
}

#[test]
fn test_reset_restores_even_when_disconnect_fails() {
    init_tracing();
    let probe = ScriptedProbe::new();
    let (mut client, _) = client_with(ClientConfig::new().with_host("db.example:1"), &probe);
    let counters = Arc::clone(&client.driver().counters);

    client.prepare().unwrap();
    client.driver_mut().fail_disconnect = true;

    assert!(client.reset().is_err());
    assert!(!client.is_prepared());
    assert_eq!(client.raw_host(), Some("db.example:1"));
    assert_eq!(counters.disconnects(), 1);

    client.driver_mut().fail_disconnect = false;
}

#[test]
fn test_drop_disconnects() {
    init_tracing();
    let probe = ScriptedProbe::new();
    let (mut client, counters) = client_with(ClientConfig::new(), &probe);

    client.connect().unwrap();
    drop(client);

    assert_eq!(counters.disconnects(), 1);
}

#[test]
fn test_drop_unprepared_is_silent() {
    init_tracing();
    let probe = ScriptedProbe::new();
    let (client, counters) = client_with(ClientConfig::new(), &probe);
    drop(client);
    assert_eq!(counters.disconnects(), 0);
}
