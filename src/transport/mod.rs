//! Transport module for Ssrelay
//!
//! This module provides the packet socket abstraction the relays are
//! written against, and the encryption layer that wraps it.

mod shadow;

pub use shadow::{Shadow, ShadowConn};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::fmt::Debug;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::debug;

/// Connectionless packet socket
///
/// Implemented by plain UDP sockets and by [`ShadowConn`], which encrypts
/// outgoing and decrypts incoming packets transparently.
#[async_trait]
pub trait PacketConn: Debug + Send + Sync + 'static {
    /// Receive one datagram into `buf`
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Send one datagram to `target`
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Local address the socket is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Packet socket shared between a listener and its session tasks
pub type SharedConn = Arc<dyn PacketConn>;

#[async_trait]
impl PacketConn for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Bind an ephemeral forwarding socket.
///
/// The socket takes the address family of `peer` when it is known.
/// Otherwise it is a dual-stack `[::]:0` socket that reaches both
/// families, or `0.0.0.0:0` on hosts without IPv6.
pub async fn bind_ephemeral(peer: Option<SocketAddr>) -> io::Result<UdpSocket> {
    match peer {
        Some(SocketAddr::V4(_)) => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await,
        Some(SocketAddr::V6(_)) => UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0)).await,
        None => match bind_dual_stack() {
            Ok(socket) => Ok(socket),
            Err(e) => {
                debug!("Dual-stack UDP bind failed, using IPv4: {}", e);
                UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await
            }
        },
    }
}

fn bind_dual_stack() -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_only_v6(false)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)).into())?;
    UdpSocket::from_std(socket.into())
}

/// Address to pass to `send_to` on a socket bound at `local`.
///
/// IPv4 targets become IPv4-mapped IPv6 addresses on an IPv6 socket.
pub fn sendable_addr(local: SocketAddr, target: SocketAddr) -> SocketAddr {
    match (local, target.ip()) {
        (SocketAddr::V6(_), IpAddr::V4(ip)) => {
            SocketAddr::new(IpAddr::V6(ip.to_ipv6_mapped()), target.port())
        }
        _ => target,
    }
}

/// Undo IPv4 mapping on an address read from a dual-stack socket
pub fn canonical_addr(addr: SocketAddr) -> SocketAddr {
    SocketAddr::new(addr.ip().to_canonical(), addr.port())
}
