//! UDP session tables
//!
//! Two NAT-style tables keyed by the peer's address string:
//!
//! - [`SessionTable`] holds the inbox of each queue-driven session. The
//!   lookup, the session construction and the insert run under one lock,
//!   so concurrent first datagrams from a peer produce one session.
//! - [`NatMap`] holds the forwarding socket of each SOCKS5 session behind
//!   a read-mostly lock, with [`NatMap::add`] spawning the return path
//!   that removes the entry when it ends.
//!
//! A [`SessionCloser`] ends every session of a relay at shutdown, so the
//! listening socket is released once `run` returns.

use super::timed_copy::{log_copy_result, timed_copy, IdleTimer, Role};
use crate::pool::PooledBuffer;
use crate::transport::SharedConn;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, trace};

/// Sending side of a session's capacity-1 queue
pub type Inbox = mpsc::Sender<PooledBuffer>;

/// Capacity of a session inbox
pub const INBOX_CAPACITY: usize = 1;

/// Peer-keyed table with create-once insertion
#[derive(Debug)]
pub struct SessionTable<V> {
    sessions: Mutex<HashMap<String, V>>,
}

impl<V: Clone> SessionTable<V> {
    /// Create an empty table
    pub fn new() -> Self {
        SessionTable {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the session for `key`, creating it with `create` if absent.
    ///
    /// The lock is held across `create`, so a concurrent caller for the
    /// same key waits and then observes the new session. The boolean is
    /// `true` when this call created it. A failed `create` leaves no entry.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        key: &str,
        create: F,
    ) -> Result<(V, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(key) {
            return Ok((session.clone(), false));
        }

        let session = create().await?;
        sessions.insert(key.to_string(), session.clone());
        Ok((session, true))
    }

    /// Look up a session
    pub async fn get(&self, key: &str) -> Option<V> {
        self.sessions.lock().await.get(key).cloned()
    }

    /// Remove a session; `None` if it was already gone
    pub async fn remove(&self, key: &str) -> Option<V> {
        self.sessions.lock().await.remove(key)
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether the table is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<V: Clone> Default for SessionTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the inbox pair for a new session
pub fn inbox() -> (Inbox, mpsc::Receiver<PooledBuffer>) {
    mpsc::channel(INBOX_CAPACITY)
}

/// Queue `buf` for a session without waiting.
///
/// A full inbox drops the new datagram, returning its buffer to the pool.
/// Returns whether the datagram was queued.
pub fn offer(inbox: &Inbox, buf: PooledBuffer) -> bool {
    match inbox.try_send(buf) {
        Ok(()) => true,
        Err(TrySendError::Full(buf)) => {
            trace!("UDP session busy, dropping {} bytes", buf.len());
            false
        }
        Err(TrySendError::Closed(buf)) => {
            trace!("UDP session closing, dropping {} bytes", buf.len());
            false
        }
    }
}

/// Shutdown signal shared by the session tasks of one relay
#[derive(Debug)]
pub struct SessionCloser {
    tx: watch::Sender<bool>,
}

impl SessionCloser {
    /// Create a closer with no sessions attached
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        SessionCloser { tx }
    }

    /// Signal for one session task, held until the task has let go of
    /// its sockets
    pub fn subscribe(&self) -> CloseSignal {
        CloseSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// End every session and wait until all of their tasks have exited
    pub async fn close_all(&self) {
        self.tx.send_replace(true);
        self.tx.closed().await;
    }
}

impl Default for SessionCloser {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`SessionCloser`]
#[derive(Debug)]
pub struct CloseSignal {
    rx: watch::Receiver<bool>,
}

impl CloseSignal {
    /// Resolve once the relay closes its sessions or goes away
    pub async fn closed(&mut self) {
        loop {
            let closing = *self.rx.borrow_and_update();
            if closing || self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Return path of a queue-driven session.
///
/// Copies replies from `conn` back to `peer` through `listener` until the
/// session idles out, fails or the relay closes, then releases both
/// sockets and removes the table entry.
pub(crate) async fn serve_return_path<V: Clone>(
    mut signal: CloseSignal,
    sessions: Arc<SessionTable<V>>,
    peer: SocketAddr,
    listener: SharedConn,
    conn: SharedConn,
    timer: Arc<IdleTimer>,
    role: Role,
) {
    let result = tokio::select! {
        result = timed_copy(listener.as_ref(), peer, conn.as_ref(), &timer, role) => result,
        _ = signal.closed() => Ok(()),
    };
    drop(listener);
    drop(conn);

    close_session(&sessions, &peer.to_string(), result).await;
}

/// Tear down a queue-driven session after its return path ended
pub(crate) async fn close_session<V: Clone>(
    sessions: &SessionTable<V>,
    key: &str,
    result: std::io::Result<()>,
) {
    log_copy_result(key, &result);
    if sessions.remove(key).await.is_some() {
        debug!("UDP session {} closed", key);
    }
}

/// Forwarding sockets of SOCKS5 sessions, keyed by client address
#[derive(Debug)]
pub struct NatMap {
    conns: RwLock<HashMap<String, SharedConn>>,
    timeout: Duration,
    closer: SessionCloser,
}

impl NatMap {
    /// Create an empty map whose sessions expire after `timeout`
    pub fn new(timeout: Duration) -> Self {
        NatMap {
            conns: RwLock::new(HashMap::new()),
            timeout,
            closer: SessionCloser::new(),
        }
    }

    /// Look up the forwarding socket for `key`
    pub async fn get(&self, key: &str) -> Option<SharedConn> {
        self.conns.read().await.get(key).cloned()
    }

    /// Insert or replace the forwarding socket for `key`
    pub async fn set(&self, key: String, conn: SharedConn) {
        self.conns.write().await.insert(key, conn);
    }

    /// Remove the entry for `key`; `None` if it was already gone
    pub async fn del(&self, key: &str) -> Option<SharedConn> {
        self.conns.write().await.remove(key)
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.conns.read().await.len()
    }

    /// Whether the map is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Register `src` for `peer` and spawn its return path.
    ///
    /// Replies read from `src` are framed for `role` and written to `peer`
    /// through `dst`. When the copy loop ends the entry is removed and the
    /// socket dropped.
    pub async fn add(
        self: &Arc<Self>,
        peer: SocketAddr,
        dst: SharedConn,
        src: SharedConn,
        role: Role,
    ) {
        let key = peer.to_string();
        self.set(key.clone(), src.clone()).await;

        let nat = Arc::clone(self);
        let mut signal = self.closer.subscribe();
        tokio::spawn(async move {
            let timer = IdleTimer::new(nat.timeout);
            let result = tokio::select! {
                result = timed_copy(dst.as_ref(), peer, src.as_ref(), &timer, role) => result,
                _ = signal.closed() => Ok(()),
            };
            drop(dst);
            drop(src);

            log_copy_result(&key, &result);
            if nat.del(&key).await.is_some() {
                debug!("UDP session {} closed", key);
            }
        });
    }

    /// End every session and wait for their tasks to exit
    pub async fn close_all(&self) {
        self.closer.close_all().await;
    }
}
