//! UDP relaying over a shadowed packet transport
//!
//! ```text
//! app -> LocalRelay / SocksLocalRelay ==(encrypted)==> RemoteRelay -> target
//! ```
//!
//! Every entry point keeps a NAT-style session per peer address. A session
//! owns one forwarding socket plus the task copying replies back, and ends
//! when no traffic is seen in either direction for the idle timeout.

mod local;
mod remote;
mod session;
mod socks_local;
mod timed_copy;

pub use local::LocalRelay;
pub use remote::RemoteRelay;
pub use session::{
    inbox, offer, CloseSignal, Inbox, NatMap, SessionCloser, SessionTable, INBOX_CAPACITY,
};
pub use socks_local::SocksLocalRelay;
pub use timed_copy::{frame_reply, timed_copy, IdleTimer, Role, REPLY_HEADROOM};

use crate::config::Config;
use crate::error::RelayError;
use crate::transport::Shadow;
use anyhow::{bail, Result};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Start every relay named in `config` and run them until shutdown.
///
/// A relay that fails to bind is logged and skipped; it is an error only
/// when none of them start.
pub async fn run_relays(config: Config, shutdown: broadcast::Receiver<bool>) -> Result<()> {
    let kind = config.cipher.kind().map_err(RelayError::Config)?;
    let shadow = Shadow::new(kind, &config.cipher.password).map_err(RelayError::from)?;
    let timeout = config.udp_timeout();
    info!("Using cipher {} with UDP timeout {:?}", kind, timeout);

    let mut relays = JoinSet::new();

    if let Some(remote) = &config.remote {
        match RemoteRelay::bind(&remote.listen, shadow.clone(), timeout).await {
            Ok(relay) => {
                let rx = shutdown.resubscribe();
                relays.spawn(async move { relay.run(rx).await });
            }
            Err(e) => error!("Failed to start UDP remote relay: {:#}", e),
        }
    }

    if let Some(local) = &config.local {
        if let Some(listen) = &local.socks {
            match SocksLocalRelay::bind(listen, &local.server, shadow.clone(), timeout).await {
                Ok(relay) => {
                    let rx = shutdown.resubscribe();
                    relays.spawn(async move { relay.run(rx).await });
                }
                Err(e) => error!("Failed to start SOCKS5 UDP relay: {:#}", e),
            }
        }

        for tunnel in &local.tunnels {
            let bound = LocalRelay::bind(
                &tunnel.listen,
                &local.server,
                &tunnel.target,
                shadow.clone(),
                timeout,
            )
            .await;
            match bound {
                Ok(relay) => {
                    let rx = shutdown.resubscribe();
                    relays.spawn(async move { relay.run(rx).await });
                }
                Err(e) => error!("Failed to start UDP tunnel to {}: {:#}", tunnel.target, e),
            }
        }
    }

    if relays.is_empty() {
        bail!("No UDP relay could be started");
    }

    while let Some(joined) = relays.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("UDP relay stopped: {:#}", e),
            Err(e) => error!("UDP relay task failed: {}", e),
        }
    }

    info!("All UDP relays stopped");
    Ok(())
}
