//! Shared fakes for the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use ductwork::connection::ClientCore;
use ductwork::{CredentialPrompt, DuctError, PortProbe, Protocol, Result, ServiceKind, Tunnel};

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "ductwork=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// Call counters shared between a test and the protocol it moved into a client.
#[derive(Debug, Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub liveness: AtomicUsize,
}

impl Counters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

/// A protocol whose hooks only record what happened.
#[derive(Default)]
pub struct ScriptedProtocol {
    pub live: bool,
    pub fail_connect: Option<String>,
    pub fail_disconnect: bool,
    pub counters: Arc<Counters>,
    /// `host:port` and username seen by the last connect.
    pub last_endpoint: Option<String>,
}

impl ScriptedProtocol {
    pub fn new() -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let protocol = Self {
            counters: Arc::clone(&counters),
            ..Default::default()
        };
        (protocol, counters)
    }

    pub fn failing(message: &str) -> (Self, Arc<Counters>) {
        let (mut protocol, counters) = Self::new();
        protocol.fail_connect = Some(message.to_string());
        (protocol, counters)
    }
}

impl Protocol for ScriptedProtocol {
    const PROTOCOLS: &'static [&'static str] = &["scripted", "fake"];
    const KIND: ServiceKind = ServiceKind::Database;

    fn connect(&mut self, core: &mut ClientCore) -> Result<()> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_connect {
            return Err(DuctError::protocol(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                message.clone(),
            )));
        }
        let user = core.username()?.unwrap_or_default();
        self.last_endpoint = Some(format!(
            "{user}@{}:{}",
            core.host().unwrap_or("-"),
            core.port()?.map_or_else(|| "-".to_string(), |p| p.to_string())
        ));
        self.live = true;
        Ok(())
    }

    fn is_connected(&mut self, _core: &ClientCore) -> bool {
        self.counters.liveness.fetch_add(1, Ordering::SeqCst);
        self.live
    }

    fn disconnect(&mut self, _core: &mut ClientCore) -> Result<()> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        self.live = false;
        if self.fail_disconnect {
            return Err(DuctError::configuration("driver refused to close"));
        }
        Ok(())
    }
}

/// A local probe that reports exactly the endpoints it was told about.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    bound: Mutex<HashSet<(String, u16)>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn bind(&self, host: &str, port: u16) {
        self.bound.lock().unwrap().insert((host.to_string(), port));
    }

    pub fn unbind(&self, host: &str, port: u16) {
        self.bound.lock().unwrap().remove(&(host.to_string(), port));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PortProbe for ScriptedProbe {
    fn is_port_bound(&self, host: &str, port: u16) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bound.lock().unwrap().contains(&(host.to_string(), port))
    }
}

/// A tunnel keeping its forwards in memory.
#[derive(Debug)]
pub struct FakeTunnel {
    name: String,
    next_port: AtomicU16,
    forwards: Mutex<HashMap<(String, u16), u16>>,
    reachable: Mutex<HashSet<(String, u16)>>,
    stopped: Mutex<Vec<u16>>,
    fail_forward: AtomicBool,
    fail_stop: AtomicBool,
}

impl FakeTunnel {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            next_port: AtomicU16::new(40001),
            forwards: Mutex::new(HashMap::new()),
            reachable: Mutex::new(HashSet::new()),
            stopped: Mutex::new(Vec::new()),
            fail_forward: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
        })
    }

    /// Make `forward` fail while set.
    pub fn fail_forward(&self, fail: bool) {
        self.fail_forward.store(fail, Ordering::SeqCst);
    }

    /// Make `stop_forward` fail while set.
    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Make `host:port` reachable from the tunnel's side.
    pub fn expose(&self, host: &str, port: u16) {
        self.reachable.lock().unwrap().insert((host.to_string(), port));
    }

    pub fn active_forwards(&self) -> usize {
        self.forwards.lock().unwrap().len()
    }

    pub fn stopped(&self) -> Vec<u16> {
        self.stopped.lock().unwrap().clone()
    }
}

impl Tunnel for FakeTunnel {
    fn name(&self) -> &str {
        &self.name
    }

    fn host(&self) -> &str {
        "bastion.example"
    }

    fn is_port_bound(&self, host: &str, port: u16) -> bool {
        self.reachable.lock().unwrap().contains(&(host.to_string(), port))
    }

    fn has_forward(&self, host: &str, port: u16) -> bool {
        self.forwards.lock().unwrap().contains_key(&(host.to_string(), port))
    }

    fn forward(&self, host: &str, port: u16) -> Result<u16> {
        if self.fail_forward.load(Ordering::SeqCst) {
            return Err(DuctError::tunnel(&self.name, "forward refused"));
        }
        let mut forwards = self.forwards.lock().unwrap();
        let local = forwards
            .entry((host.to_string(), port))
            .or_insert_with(|| self.next_port.fetch_add(1, Ordering::SeqCst));
        Ok(*local)
    }

    fn stop_forward(&self, local_port: u16) -> Result<()> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(DuctError::tunnel(&self.name, "forward still in use"));
        }
        self.forwards.lock().unwrap().retain(|_, local| *local != local_port);
        self.stopped.lock().unwrap().push(local_port);
        Ok(())
    }
}

/// A prompt with fixed answers that counts how often it was asked.
#[derive(Debug, Clone)]
pub struct FixedPrompt {
    pub username: String,
    pub password: String,
    pub asked: Arc<AtomicUsize>,
}

impl FixedPrompt {
    pub fn new(username: &str, password: &str) -> (Self, Arc<AtomicUsize>) {
        let asked = Arc::new(AtomicUsize::new(0));
        let prompt = Self {
            username: username.to_string(),
            password: password.to_string(),
            asked: Arc::clone(&asked),
        };
        (prompt, asked)
    }
}

impl CredentialPrompt for FixedPrompt {
    fn username(&mut self, _service: &str) -> Result<String> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.username.clone())
    }

    fn password(&mut self, _service: &str) -> Result<String> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.password.clone())
    }

    fn login_name(&self) -> Option<String> {
        Some("login-user".to_string())
    }
}
