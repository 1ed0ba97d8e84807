//! Test utilities for Ssrelay
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use ssrelay::config::{CipherConfig, Config, LocalConfig, RemoteConfig, TunnelConfig};
use ssrelay::crypto::CipherKind;
use ssrelay::transport::Shadow;
use ssrelay::udp::{LocalRelay, RemoteRelay, SocksLocalRelay};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Password shared by relays in tests
pub const TEST_PASSWORD: &str = "test-password";

/// Create a UDP socket on an available loopback port
pub async fn create_test_socket() -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    (socket, addr)
}

/// Spawn a UDP server that sends every datagram back to its sender
pub async fn spawn_echo_server() -> SocketAddr {
    let (socket, _) = create_test_socket().await;
    spawn_echo_on(socket)
}

/// Spawn an echo server on IPv6 loopback, `None` on hosts without IPv6
pub async fn spawn_echo_server_v6() -> Option<SocketAddr> {
    let socket = UdpSocket::bind("[::1]:0").await.ok()?;
    Some(spawn_echo_on(socket))
}

fn spawn_echo_on(socket: UdpSocket) -> SocketAddr {
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65536];
        while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&buf[..n], peer).await;
        }
    });
    addr
}

/// Receive one datagram or fail after `wait`
pub async fn recv_within(socket: &UdpSocket, wait: Duration) -> Option<(Vec<u8>, SocketAddr)> {
    let mut buf = vec![0u8; 65536];
    match tokio::time::timeout(wait, socket.recv_from(&mut buf)).await {
        Ok(Ok((n, from))) => Some((buf[..n].to_vec(), from)),
        _ => None,
    }
}

/// Shadow for an AEAD method with the test password
pub fn aead_shadow(kind: CipherKind) -> Shadow {
    Shadow::new(kind, TEST_PASSWORD).unwrap()
}

/// A relay running on its own task, stopped through `shutdown`
pub struct Running<R> {
    pub relay: Arc<R>,
    pub addr: SocketAddr,
    pub shutdown: broadcast::Sender<bool>,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

macro_rules! spawn_relay {
    ($relay:expr) => {{
        let relay = Arc::new($relay);
        let addr = relay.local_addr().unwrap();
        let (shutdown, rx) = broadcast::channel(1);
        let task_relay = relay.clone();
        let handle = tokio::spawn(async move { task_relay.run(rx).await });
        Running {
            relay,
            addr,
            shutdown,
            handle,
        }
    }};
}

/// Start a remote relay on loopback
pub async fn start_remote(shadow: Shadow, timeout: Duration) -> Running<RemoteRelay> {
    let relay = RemoteRelay::bind("127.0.0.1:0", shadow, timeout)
        .await
        .unwrap();
    spawn_relay!(relay)
}

/// Start a fixed-target local relay on loopback
pub async fn start_local(
    server: SocketAddr,
    target: SocketAddr,
    shadow: Shadow,
    timeout: Duration,
) -> Running<LocalRelay> {
    let relay = LocalRelay::bind(
        "127.0.0.1:0",
        &server.to_string(),
        &target.to_string(),
        shadow,
        timeout,
    )
    .await
    .unwrap();
    spawn_relay!(relay)
}

/// Start a SOCKS5 UDP local relay on loopback
pub async fn start_socks_local(
    server: SocketAddr,
    shadow: Shadow,
    timeout: Duration,
) -> Running<SocksLocalRelay> {
    let relay = SocksLocalRelay::bind("127.0.0.1:0", &server.to_string(), shadow, timeout)
        .await
        .unwrap();
    spawn_relay!(relay)
}

/// Test configuration builder
pub struct TestConfigBuilder {
    method: String,
    password: String,
    udp_timeout: u64,
    remote: Option<String>,
    server: Option<String>,
    socks: Option<String>,
    tunnels: Vec<(String, String)>,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            method: "aes-256-gcm".to_string(),
            password: TEST_PASSWORD.to_string(),
            udp_timeout: 300,
            remote: None,
            server: None,
            socks: None,
            tunnels: Vec::new(),
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cipher method
    pub fn method(mut self, method: &str) -> Self {
        self.method = method.to_string();
        self
    }

    /// Set the idle timeout in seconds
    pub fn udp_timeout(mut self, secs: u64) -> Self {
        self.udp_timeout = secs;
        self
    }

    /// Run a remote relay on `listen`
    pub fn remote(mut self, listen: &str) -> Self {
        self.remote = Some(listen.to_string());
        self
    }

    /// Relay local traffic through `server`
    pub fn server(mut self, server: &str) -> Self {
        self.server = Some(server.to_string());
        self
    }

    /// Run a SOCKS5 UDP relay on `listen`
    pub fn socks(mut self, listen: &str) -> Self {
        self.socks = Some(listen.to_string());
        self
    }

    /// Add a fixed-target tunnel
    pub fn tunnel(mut self, listen: &str, target: &str) -> Self {
        self.tunnels.push((listen.to_string(), target.to_string()));
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        let local = self.server.map(|server| LocalConfig {
            server,
            socks: self.socks,
            tunnels: self
                .tunnels
                .into_iter()
                .map(|(listen, target)| TunnelConfig { listen, target })
                .collect(),
        });

        Config {
            udp_timeout: self.udp_timeout,
            cipher: CipherConfig {
                method: self.method,
                password: self.password,
            },
            remote: self.remote.map(|listen| RemoteConfig { listen }),
            local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_server() {
        let echo = spawn_echo_server().await;
        let (client, _) = create_test_socket().await;

        client.send_to(b"hello", echo).await.unwrap();
        let (data, from) = recv_within(&client, Duration::from_secs(2)).await.unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(from, echo);
    }

    #[test]
    fn test_config_builder() {
        let config = TestConfigBuilder::new()
            .server("127.0.0.1:8488")
            .socks("127.0.0.1:1080")
            .tunnel("127.0.0.1:5353", "8.8.8.8:53")
            .build();

        assert!(config.validate().is_ok());
        assert!(config.remote.is_none());
        let local = config.local.unwrap();
        assert_eq!(local.server, "127.0.0.1:8488");
        assert_eq!(local.tunnels.len(), 1);
    }
}
