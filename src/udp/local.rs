//! Local relay for a fixed target
//!
//! Applications send bare UDP datagrams to the listening socket. Each
//! datagram gets the configured target's address prefix, is encrypted and
//! sent to the remote relay from a per-application forwarding socket.
//! Replies come back with the prefix stripped, so the application sees a
//! direct UDP exchange with the target.

use super::session::{inbox, offer, serve_return_path, Inbox, SessionCloser, SessionTable};
use super::timed_copy::{IdleTimer, Role};
use crate::error::RelayError;
use crate::helper::resolve_addr;
use crate::pool::{BufferPool, PooledBuffer};
use crate::socks::TargetAddr;
use crate::transport::{bind_ephemeral, SharedConn, Shadow};
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// UDP tunnel from local applications to one fixed target
#[derive(Debug)]
pub struct LocalRelay {
    listener: SharedConn,
    server: SocketAddr,
    target: TargetAddr,
    prefix: Vec<u8>,
    shadow: Shadow,
    timeout: Duration,
    pool: BufferPool,
    sessions: Arc<SessionTable<Inbox>>,
    closer: SessionCloser,
}

impl LocalRelay {
    /// Bind the listening socket and resolve the remote relay.
    ///
    /// Fails on an unresolvable server, an invalid target or a bind error.
    pub async fn bind(
        listen: &str,
        server: &str,
        target: &str,
        shadow: Shadow,
        timeout: Duration,
    ) -> Result<Self> {
        let server = resolve_addr(server)
            .await
            .context("UDP server address error")?;
        let target = TargetAddr::parse(target).ok_or_else(|| {
            RelayError::Address(format!("invalid target address: {:?}", target))
        })?;
        let listener = UdpSocket::bind(listen)
            .await
            .with_context(|| format!("UDP local listen error on {}", listen))?;

        Ok(LocalRelay {
            listener: Arc::new(listener),
            server,
            prefix: target.to_bytes(),
            target,
            shadow,
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
        info!("UDP tunnel {} <-> {} <-> {}", local, self.server, self.target);

        let prefix_len = self.prefix.len();
        loop {
            let mut buf = self.pool.acquire();
            buf[..prefix_len].copy_from_slice(&self.prefix);

            let received = tokio::select! {
                received = self.listener.recv_from(&mut buf[prefix_len..]) => received,
                _ = shutdown.recv() => {
                    info!("UDP tunnel on {} shutting down", local);
                    break;
                }
            };

            let (n, peer) = match received {
                Ok(received) => received,
                Err(e) => {
                    warn!("UDP local read error: {}", e);
                    continue;
                }
            };
            buf.set_len(prefix_len + n);

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

    /// Open the forwarding socket for `peer` and spawn its two tasks
    async fn open_session(&self, peer: SocketAddr) -> Result<Inbox> {
        let socket = bind_ephemeral(Some(self.server))
            .await
            .context("Failed to create UDP socket")?;
        let conn = self.shadow.wrap(socket);
        let timer = Arc::new(IdleTimer::new(self.timeout));
        let (tx, rx) = inbox();

        tokio::spawn(drain_to_server(
            conn.clone(),
            rx,
            self.server,
            timer.clone(),
        ));

        tokio::spawn(serve_return_path(
            self.closer.subscribe(),
            self.sessions.clone(),
            peer,
            self.listener.clone(),
            conn,
            timer,
            Role::ClientToUser,
        ));

        debug!("UDP session {} -> {} opened", peer, self.server);
        Ok(tx)
    }
}

/// Send queued datagrams to the remote relay until the inbox closes
async fn drain_to_server(
    conn: SharedConn,
    mut inbox: mpsc::Receiver<PooledBuffer>,
    server: SocketAddr,
    timer: Arc<IdleTimer>,
) {
    while let Some(buf) = inbox.recv().await {
        timer.touch();
        if let Err(e) = conn.send_to(buf.filled(), server).await {
            warn!("UDP local write error: {}", e);
        }
    }
}
