//! Encrypting packet socket wrapper

use super::{PacketConn, SharedConn};
use crate::crypto::{CipherKind, PacketCipher};
use crate::error::CipherError;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Wraps raw packet sockets into encrypting ones
///
/// A plain `Shadow` (method `none`) hands sockets back unchanged.
#[derive(Debug, Clone)]
pub struct Shadow {
    cipher: Option<PacketCipher>,
}

impl Shadow {
    /// A wrapper that does not encrypt
    pub fn plain() -> Self {
        Shadow { cipher: None }
    }

    /// Create a wrapper for `kind`, keyed from `password`
    pub fn new(kind: CipherKind, password: &str) -> Result<Self, CipherError> {
        if !kind.is_aead() {
            return Ok(Self::plain());
        }
        Ok(Shadow {
            cipher: Some(PacketCipher::new(kind, password)?),
        })
    }

    /// The configured method
    pub fn kind(&self) -> CipherKind {
        self.cipher
            .as_ref()
            .map(PacketCipher::kind)
            .unwrap_or(CipherKind::None)
    }

    /// Wrap a packet socket
    pub fn wrap<C: PacketConn>(&self, conn: C) -> SharedConn {
        match &self.cipher {
            Some(cipher) => Arc::new(ShadowConn::new(conn, cipher.clone())),
            None => Arc::new(conn),
        }
    }
}

/// Packet socket that encrypts on send and decrypts on receive
#[derive(Debug)]
pub struct ShadowConn<C> {
    inner: C,
    cipher: PacketCipher,
}

impl<C: PacketConn> ShadowConn<C> {
    /// Wrap `inner` with `cipher`
    pub fn new(inner: C, cipher: PacketCipher) -> Self {
        ShadowConn { inner, cipher }
    }
}

#[async_trait]
impl<C: PacketConn> PacketConn for ShadowConn<C> {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let salt_len = self.cipher.salt_len();

        loop {
            let (n, from) = self.inner.recv_from(buf).await?;
            match self.cipher.decrypt_packet(&mut buf[..n]) {
                Ok(plaintext) => {
                    let len = plaintext.len();
                    buf.copy_within(salt_len..salt_len + len, 0);
                    return Ok((len, from));
                }
                Err(e) => {
                    warn!("Dropping undecryptable packet from {}: {}", from, e);
                }
            }
        }
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        let packet = self.cipher.encrypt_packet(buf)?;
        self.inner.send_to(&packet, target).await?;
        Ok(buf.len())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
