//! Lazy client example.
//!
//! This example registers a tiny line-based protocol, starts a local
//! listener for it and walks a client through its lifecycle: lazy
//! preparation, connect, reconnect on configuration change and reset.
//!
//! Run: cargo run --example lazy_client

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use ductwork::connection::ClientCore;
use ductwork::{
    ClientConfig, DuctError, Protocol, ProtocolRegistry, Result, ServiceClient, ServiceKind,
};

/// Speaks "one line in, one line out" over TCP.
#[derive(Default)]
struct LineProtocol {
    stream: Option<TcpStream>,
}

impl LineProtocol {
    fn call(&mut self, line: &str) -> Result<String> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DuctError::configuration("not connected"))?;
        writeln!(stream, "{line}")?;

        let mut reply = String::new();
        BufReader::new(stream.try_clone()?).read_line(&mut reply)?;
        Ok(reply.trim_end().to_string())
    }
}

impl Protocol for LineProtocol {
    const PROTOCOLS: &'static [&'static str] = &["line"];
    const KIND: ServiceKind = ServiceKind::RestClient;

    fn connect(&mut self, core: &mut ClientCore) -> Result<()> {
        let host = core.host().unwrap_or("127.0.0.1").to_string();
        let port = core
            .port()?
            .ok_or_else(|| DuctError::configuration("no port configured"))?;
        self.stream = Some(TcpStream::connect((host.as_str(), port))?);
        Ok(())
    }

    fn is_connected(&mut self, _core: &ClientCore) -> bool {
        self.stream.is_some()
    }

    fn disconnect(&mut self, _core: &mut ClientCore) -> Result<()> {
        self.stream = None;
        Ok(())
    }
}

/// Echo server answering every line in upper case.
fn spawn_server() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();

    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || {
                let Ok(mut writer) = stream.try_clone() else {
                    return;
                };
                for line in BufReader::new(stream).lines().map_while(|l| l.ok()) {
                    if writeln!(writer, "{}", line.to_uppercase()).is_err() {
                        break;
                    }
                }
            });
        }
    });

    Ok(port)
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("ductwork=debug,lazy_client=debug")
        .init();

    let first = spawn_server()?;
    let second = spawn_server()?;
    println!("Echo servers listening on ports {first} and {second}");

    let mut registry = ProtocolRegistry::new();
    registry.register_protocol::<LineProtocol>();
    let factory = registry.resolve("line")?;
    println!("Protocol 'line' is served by `{}`", factory.implementation().name());

    let mut client = ServiceClient::<LineProtocol>::from_config(
        ClientConfig::new()
            .with_name("echo")
            .with_protocol(factory.key())
            .with_host(format!("127.0.0.1:{first}"))
            .with_username("demo"),
    );
    println!("\n--- Lazy preparation ---");
    println!("prepared before access: {}", client.is_prepared());
    println!("port: {:?}", client.port()?);
    println!("prepared after access: {}", client.is_prepared());

    println!("\n--- Connect ---");
    client.connect()?;
    println!("state: {:?}", client.state()?);
    println!("reply: {}", client.driver_mut().call("hello")?);

    println!("\n--- Change port while connected ---");
    client.set_port(second)?;
    println!("state after change: {:?}", client.state()?);
    client.connect()?;
    println!("reply: {}", client.driver_mut().call("hello again")?);

    println!("\n--- Unreachable endpoint ---");
    client.set_host("127.0.0.1:1")?;
    match client.connect() {
        Ok(_) => println!("unexpectedly connected"),
        Err(err) => println!("connect failed: {err}"),
    }

    println!("\n--- Reset ---");
    client.reset()?;
    println!("host after reset: {:?}", client.raw_host());
    println!("stats: {:?}", client.stats());

    Ok(())
}
