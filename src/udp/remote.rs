//! Remote relay
//!
//! Receives encrypted datagrams from local relays. Each one starts with
//! the target's address prefix; the payload goes to the target from a
//! per-client forwarding socket on the open network, and replies return
//! to the client tagged with the address they came from.

use super::session::{inbox, offer, serve_return_path, Inbox, SessionCloser, SessionTable};
use super::timed_copy::{IdleTimer, Role};
use crate::pool::{BufferPool, PooledBuffer};
use crate::socks::TargetAddr;
use crate::transport::{bind_ephemeral, sendable_addr, SharedConn, Shadow};
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// UDP NAT between local relays and real targets
#[derive(Debug)]
pub struct RemoteRelay {
    listener: SharedConn,
    timeout: Duration,
    pool: BufferPool,
    sessions: Arc<SessionTable<Inbox>>,
    closer: SessionCloser,
}

impl RemoteRelay {
    /// Bind the listening socket and wrap it with `shadow`
    pub async fn bind(listen: &str, shadow: Shadow, timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(listen)
            .await
            .with_context(|| format!("UDP remote listen error on {}", listen))?;

        Ok(RemoteRelay {
            listener: shadow.wrap(socket),
            timeout,
            pool: BufferPool::new(),
            sessions: Arc::new(SessionTable::new()),
            closer: SessionCloser::new(),
        })
    }

    /// Address of the listening socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    /// Relay datagrams until a shutdown signal arrives
    pub async fn run(&self, mut shutdown: broadcast::Receiver<bool>) -> Result<()> {
        let local = self.local_addr()?;
        info!("Listening UDP on {}", local);

        loop {
            let mut buf = self.pool.acquire();

            let received = tokio::select! {
                received = self.listener.recv_from(&mut buf[..]) => received,
                _ = shutdown.recv() => {
                    info!("UDP relay on {} shutting down", local);
                    break;
                }
            };

            let (n, peer) = match received {
                Ok(received) => received,
                Err(e) => {
                    warn!("UDP remote read error: {}", e);
                    continue;
                }
            };
            buf.set_len(n);

            let session = self
                .sessions
                .get_or_try_insert_with(&peer.to_string(), || self.open_session(peer))
                .await;
            match session {
                Ok((inbox, _)) => {
                    offer(&inbox, buf);
                }
                Err(e) => warn!("Failed to create UDP session for {}: {:#}", peer, e),
            }
        }

        self.closer.close_all().await;
        Ok(())
    }

    /// Open the outbound socket for client `peer` and spawn its two tasks
    async fn open_session(&self, peer: SocketAddr) -> Result<Inbox> {
        let socket = bind_ephemeral(None)
            .await
            .context("Failed to create UDP socket")?;
        let conn: SharedConn = Arc::new(socket);
        let timer = Arc::new(IdleTimer::new(self.timeout));
        let (tx, rx) = inbox();

        tokio::spawn(drain_to_target(conn.clone(), rx, peer, timer.clone()));

        tokio::spawn(serve_return_path(
            self.closer.subscribe(),
            self.sessions.clone(),
            peer,
            self.listener.clone(),
            conn,
            timer,
            Role::ServerToClient,
        ));

        debug!("UDP session for client {} opened", peer);
        Ok(tx)
    }
}

/// Strip each queued datagram's prefix and send the payload to its target.
///
/// A datagram with a bad prefix or an unresolvable target is dropped; the
/// session carries on.
async fn drain_to_target(
    conn: SharedConn,
    mut inbox: mpsc::Receiver<PooledBuffer>,
    peer: SocketAddr,
    timer: Arc<IdleTimer>,
) {
    let local = conn.local_addr().ok();

    while let Some(buf) = inbox.recv().await {
        let datagram = buf.filled();
        let Some((target, prefix_len)) = TargetAddr::split(datagram) else {
            warn!(
                "Failed to split target address from {} byte packet from {}",
                datagram.len(),
                peer
            );
            continue;
        };

        let target_addr = match target.resolve().await {
            Ok(addr) => local.map_or(addr, |local| sendable_addr(local, addr)),
            Err(e) => {
                warn!("Failed to resolve target UDP address {}: {:#}", target, e);
                continue;
            }
        };

        timer.touch();
        if let Err(e) = conn.send_to(&datagram[prefix_len..], target_addr).await {
            warn!("UDP remote write error to {}: {}", target_addr, e);
        }
    }
}
