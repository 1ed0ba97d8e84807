//! Return-path copy loop
//!
//! Reads replies from a session's forwarding socket under an idle deadline,
//! reframes them for the hop they return to and writes them out through
//! the listening socket.

use crate::error::is_idle_timeout;
use crate::pool::UDP_BUF_SIZE;
use crate::socks::{TargetAddr, MAX_ADDR_LEN, SOCKS5_UDP_HEADER, SOCKS5_UDP_HEADER_LEN};
use crate::transport::{canonical_addr, PacketConn};
use std::io;
use std::net::SocketAddr;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Space kept in front of every reply so a prefix can be written in place
pub const REPLY_HEADROOM: usize = MAX_ADDR_LEN;

/// Framing applied to replies on their way back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Remote relay to client tunnel: prepend the reply's source address
    ServerToClient,
    /// Local relay to a plain application: strip the address prefix
    ClientToUser,
    /// Local relay to a SOCKS5 client: prepend `RSV | FRAG`
    ClientToSocksApp,
}

/// Read deadline shared by the two tasks of one session
///
/// Either task extends it with [`IdleTimer::touch`]; a read through
/// [`IdleTimer::recv_from`] fails with `TimedOut` once the deadline passes
/// without being extended.
#[derive(Debug)]
pub struct IdleTimer {
    timeout: Duration,
    deadline: Mutex<Instant>,
}

impl IdleTimer {
    /// Create a timer whose deadline is `timeout` from now
    pub fn new(timeout: Duration) -> Self {
        IdleTimer {
            timeout,
            deadline: Mutex::new(Instant::now() + timeout),
        }
    }

    /// Push the deadline to `timeout` from now
    pub fn touch(&self) {
        *self.lock() = Instant::now() + self.timeout;
    }

    /// Current deadline
    pub fn deadline(&self) -> Instant {
        *self.lock()
    }

    /// Receive from `src`, failing with `TimedOut` at the deadline
    pub async fn recv_from(
        &self,
        src: &dyn PacketConn,
        buf: &mut [u8],
    ) -> io::Result<(usize, SocketAddr)> {
        let mut recv = src.recv_from(buf);

        loop {
            let deadline = self.deadline();
            match tokio::time::timeout_at(deadline, &mut recv).await {
                Ok(result) => return result,
                Err(_) if self.deadline() <= Instant::now() => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "UDP session idle timeout",
                    ));
                }
                // Extended by the other task while we slept
                Err(_) => continue,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Instant> {
        self.deadline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reframe the reply held at `buf[REPLY_HEADROOM..REPLY_HEADROOM + len]`.
///
/// Returns the range of `buf` to send, or `None` when a reply that should
/// carry an address prefix does not.
pub fn frame_reply(
    role: Role,
    buf: &mut [u8],
    len: usize,
    from: SocketAddr,
) -> Option<Range<usize>> {
    let start = REPLY_HEADROOM;
    let end = start + len;

    match role {
        Role::ServerToClient => {
            let source = TargetAddr::from(canonical_addr(from));
            let prefix_start = start - source.serialized_len();
            source.write_to(&mut buf[prefix_start..start]);
            Some(prefix_start..end)
        }
        Role::ClientToUser => {
            let (_, prefix_len) = TargetAddr::split(&buf[start..end])?;
            Some(start + prefix_len..end)
        }
        Role::ClientToSocksApp => {
            let header_start = start - SOCKS5_UDP_HEADER_LEN;
            buf[header_start..start].copy_from_slice(&SOCKS5_UDP_HEADER);
            Some(header_start..end)
        }
    }
}

/// Copy replies from `src` to `target` through `dst` until a read or write fails.
///
/// The deadline is extended before every read. An idle session ends with a
/// `TimedOut` error; see [`is_idle_timeout`].
pub async fn timed_copy(
    dst: &dyn PacketConn,
    target: SocketAddr,
    src: &dyn PacketConn,
    timer: &IdleTimer,
    role: Role,
) -> io::Result<()> {
    let mut buf = vec![0u8; REPLY_HEADROOM + UDP_BUF_SIZE];

    loop {
        timer.touch();
        let (n, from) = timer.recv_from(src, &mut buf[REPLY_HEADROOM..]).await?;

        let Some(range) = frame_reply(role, &mut buf, n, from) else {
            warn!("Dropping reply from {} without address prefix", from);
            continue;
        };

        dst.send_to(&buf[range], target).await?;
    }
}

/// Log how a session's copy loop ended
pub(crate) fn log_copy_result(peer: &str, result: &io::Result<()>) {
    match result {
        Err(e) if is_idle_timeout(e) => debug!("UDP session {} idle, closing", peer),
        Err(e) => warn!("UDP session {} copy error: {}", peer, e),
        Ok(()) => {}
    }
}
