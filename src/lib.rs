//! # Ssrelay - Shadowsocks-style UDP relay
//!
//! Ssrelay forwards UDP datagrams between local applications and remote
//! targets through an encrypted relay pair. Each end keeps a NAT-style
//! table of sessions keyed by peer address, with an idle timeout shared by
//! both directions of a session.
//!
//! ## Features
//!
//! - **Local tunnels**: fixed-target UDP forwarding for plain applications
//! - **SOCKS5 UDP**: relaying of SOCKS5 UDP ASSOCIATE datagrams
//! - **Remote relay**: per-client forwarding sockets to arbitrary targets
//! - **AEAD packets**: AES-GCM and ChaCha20-Poly1305 with per-packet salts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ssrelay::config::load_config;
//! use ssrelay::udp::run_relays;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_relays(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! App -> Local relay ==(encrypted UDP)==> Remote relay -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod helper;
pub mod pool;
pub mod socks;
pub mod transport;
pub mod udp;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{CipherError, RelayError};
pub use udp::run_relays;

/// Version of the Ssrelay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
