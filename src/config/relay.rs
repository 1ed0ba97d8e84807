//! Relay configuration types
//!
//! Defines the configuration structures for the local and remote relays.

use crate::crypto::CipherKind;
use crate::helper::{duration_from_secs, DEFAULT_UDP_TIMEOUT_SECS};
use crate::socks::TargetAddr;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default idle timeout for UDP sessions in seconds
fn default_udp_timeout() -> u64 {
    DEFAULT_UDP_TIMEOUT_SECS
}

/// Default cipher method
fn default_method() -> String {
    "chacha20-ietf-poly1305".to_string()
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Idle timeout shared by every UDP session, in seconds
    #[serde(default = "default_udp_timeout")]
    pub udp_timeout: u64,

    /// Tunnel encryption
    #[serde(default)]
    pub cipher: CipherConfig,

    /// Remote (server side) relay
    #[serde(default)]
    pub remote: Option<RemoteConfig>,

    /// Local (client side) relays
    #[serde(default)]
    pub local: Option<LocalConfig>,
}

/// Tunnel encryption configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CipherConfig {
    /// Cipher method name
    #[serde(default = "default_method")]
    pub method: String,

    /// Shared password
    #[serde(default)]
    pub password: String,
}

impl Default for CipherConfig {
    fn default() -> Self {
        CipherConfig {
            method: default_method(),
            password: String::new(),
        }
    }
}

/// Remote relay configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RemoteConfig {
    /// Address to receive encrypted packets on
    pub listen: String,
}

/// Local relay configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LocalConfig {
    /// Remote relay address (e.g., "server.example.com:8488")
    pub server: String,

    /// Listen address of the SOCKS5 UDP relay
    #[serde(default)]
    pub socks: Option<String>,

    /// Fixed-target UDP tunnels
    #[serde(default, rename = "tunnel")]
    pub tunnels: Vec<TunnelConfig>,
}

/// One fixed-target UDP tunnel
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TunnelConfig {
    /// Address local applications send to
    pub listen: String,

    /// Target every datagram is tunnelled to (e.g., "8.8.8.8:53")
    pub target: String,
}

impl Config {
    /// Idle timeout as a Duration
    pub fn udp_timeout(&self) -> Duration {
        duration_from_secs(self.udp_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.udp_timeout == 0 {
            return Err("udp_timeout must be greater than zero".to_string());
        }

        self.cipher.validate()?;

        if self.remote.is_none() && self.local.is_none() {
            return Err("Neither [remote] nor [local] is configured".to_string());
        }

        if let Some(local) = &self.local {
            local.validate()?;
        }

        Ok(())
    }
}

impl CipherConfig {
    /// Parse the method name
    pub fn kind(&self) -> Result<CipherKind, String> {
        self.method.parse::<CipherKind>().map_err(|e| e.to_string())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let kind = self.kind()?;
        if kind.is_aead() && self.password.is_empty() {
            return Err(format!("Cipher {} requires a password", kind));
        }
        Ok(())
    }
}

impl LocalConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.socks.is_none() && self.tunnels.is_empty() {
            return Err("[local] needs a socks listener or at least one tunnel".to_string());
        }

        for tunnel in &self.tunnels {
            if TargetAddr::parse(&tunnel.target).is_none() {
                return Err(format!("Invalid tunnel target: {:?}", tunnel.target));
            }
        }

        Ok(())
    }
}
