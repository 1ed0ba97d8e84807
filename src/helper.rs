//! Helper utilities for Ssrelay
//!
//! This module provides common utility functions used throughout the application.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

/// Default UDP session idle timeout in seconds
pub const DEFAULT_UDP_TIMEOUT_SECS: u64 = 300;

/// Parse duration from seconds
pub fn duration_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// Resolve a `host:port` string to its first socket address
pub async fn resolve_addr(addr: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await
        .with_context(|| format!("Failed to resolve address: {}", addr))?
        .next()
        .with_context(|| format!("No addresses found for: {}", addr))
}
