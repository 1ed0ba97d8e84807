//! Local relay for SOCKS5 UDP clients
//!
//! SOCKS5 applications send datagrams framed as
//! `RSV(2) | FRAG(1) | ATYP | DST.ADDR | DST.PORT | DATA`. The three-byte
//! header is dropped and the rest, address prefix included, is encrypted
//! and sent to the remote relay. Replies carry the source address prefix
//! from the remote relay and get a fresh `RSV | FRAG` header on the way
//! back.

use super::session::NatMap;
use super::timed_copy::Role;
use crate::helper::resolve_addr;
use crate::pool::UDP_BUF_SIZE;
use crate::socks::{TargetAddr, SOCKS5_RESERVED, SOCKS5_UDP_HEADER_LEN};
use crate::transport::{bind_ephemeral, SharedConn, Shadow};
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// UDP relay behind a SOCKS5 UDP ASSOCIATE
#[derive(Debug)]
pub struct SocksLocalRelay {
    listener: SharedConn,
    server: SocketAddr,
    shadow: Shadow,
    nat: Arc<NatMap>,
}

impl SocksLocalRelay {
    /// Bind the SOCKS5 UDP socket and resolve the remote relay
    pub async fn bind(
        listen: &str,
        server: &str,
        shadow: Shadow,
        timeout: Duration,
    ) -> Result<Self> {
        let server = resolve_addr(server)
            .await
            .context("UDP server address error")?;
        let listener = UdpSocket::bind(listen)
            .await
            .with_context(|| format!("UDP local listen error on {}", listen))?;

        Ok(SocksLocalRelay {
            listener: Arc::new(listener),
            server,
            shadow,
            nat: Arc::new(NatMap::new(timeout)),
        })
    }

    /// Address of the listening socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.nat.len().await
    }

    /// Relay datagrams until a shutdown signal arrives
    pub async fn run(&self, mut shutdown: broadcast::Receiver<bool>) -> Result<()> {
        let local = self.local_addr()?;
        info!("SOCKS5 UDP on {} via {}", local, self.server);

        let mut buf = vec![0u8; UDP_BUF_SIZE];
        loop {
            let received = tokio::select! {
                received = self.listener.recv_from(&mut buf) => received,
                _ = shutdown.recv() => {
                    info!("SOCKS5 UDP on {} shutting down", local);
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

            let Some(payload) = socks_payload(&buf[..n]) else {
                warn!("Dropping malformed SOCKS5 UDP datagram from {}", peer);
                continue;
            };

            let conn = match self.nat.get(&peer.to_string()).await {
                Some(conn) => conn,
                None => match self.open_session(peer).await {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to create UDP session for {}: {:#}", peer, e);
                        continue;
                    }
                },
            };

            if let Err(e) = conn.send_to(payload, self.server).await {
                warn!("UDP local write error: {}", e);
            }
        }

        self.nat.close_all().await;
        Ok(())
    }

    async fn open_session(&self, peer: SocketAddr) -> Result<SharedConn> {
        let socket = bind_ephemeral(Some(self.server))
            .await
            .context("Failed to create UDP socket")?;
        let conn = self.shadow.wrap(socket);

        info!(
            "UDP socks tunnel {} <-> {} <-> {}",
            peer,
            self.local_addr()?,
            self.server
        );
        self.nat
            .add(
                peer,
                self.listener.clone(),
                conn.clone(),
                Role::ClientToSocksApp,
            )
            .await;

        Ok(conn)
    }
}

/// Strip the `RSV | FRAG` header and check an address prefix follows.
///
/// Fragmented datagrams are not supported and are rejected.
fn socks_payload(datagram: &[u8]) -> Option<&[u8]> {
    if datagram.len() < SOCKS5_UDP_HEADER_LEN {
        return None;
    }
    let (header, payload) = datagram.split_at(SOCKS5_UDP_HEADER_LEN);
    if header[0] != SOCKS5_RESERVED || header[1] != SOCKS5_RESERVED || header[2] != 0 {
        return None;
    }
    TargetAddr::split(payload)?;
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks_payload_strips_header() {
        let datagram = [0, 0, 0, 1, 10, 0, 0, 1, 0x00, 0x35, b'q'];
        assert_eq!(
            socks_payload(&datagram),
            Some(&[1, 10, 0, 0, 1, 0x00, 0x35, b'q'][..])
        );
    }

    #[test]
    fn test_socks_payload_too_short() {
        assert_eq!(socks_payload(&[0, 0]), None);
        assert_eq!(socks_payload(&[]), None);
    }

    #[test]
    fn test_socks_payload_rejects_fragment() {
        let datagram = [0, 0, 1, 1, 10, 0, 0, 1, 0x00, 0x35];
        assert_eq!(socks_payload(&datagram), None);
    }

    #[test]
    fn test_socks_payload_rejects_reserved() {
        let datagram = [0, 1, 0, 1, 10, 0, 0, 1, 0x00, 0x35];
        assert_eq!(socks_payload(&datagram), None);
    }

    #[test]
    fn test_socks_payload_requires_address() {
        assert_eq!(socks_payload(&[0, 0, 0]), None);
        assert_eq!(socks_payload(&[0, 0, 0, 9, 1, 2]), None);
    }
}
