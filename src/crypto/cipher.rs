//! Supported AEAD methods

use crate::error::CipherError;
use ring::aead::{Algorithm, AES_128_GCM, AES_256_GCM, CHACHA20_POLY1305};
use std::fmt;
use std::str::FromStr;

/// Cipher method selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    /// No encryption, packets pass through unchanged
    None,
    /// AES-128-GCM
    Aes128Gcm,
    /// AES-256-GCM
    Aes256Gcm,
    /// ChaCha20-Poly1305 (IETF)
    Chacha20IetfPoly1305,
}

impl CipherKind {
    /// The ring algorithm backing this method, `None` for plain mode
    pub fn algorithm(self) -> Option<&'static Algorithm> {
        match self {
            CipherKind::None => None,
            CipherKind::Aes128Gcm => Some(&AES_128_GCM),
            CipherKind::Aes256Gcm => Some(&AES_256_GCM),
            CipherKind::Chacha20IetfPoly1305 => Some(&CHACHA20_POLY1305),
        }
    }

    /// Key length in bytes; the salt has the same length
    pub fn key_len(self) -> usize {
        match self {
            CipherKind::None => 0,
            CipherKind::Aes128Gcm => 16,
            CipherKind::Aes256Gcm | CipherKind::Chacha20IetfPoly1305 => 32,
        }
    }

    /// Whether packets are encrypted at all
    pub fn is_aead(self) -> bool {
        self != CipherKind::None
    }
}

impl FromStr for CipherKind {
    type Err = CipherError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "plain" | "dummy" => Ok(CipherKind::None),
            "aes-128-gcm" | "aead_aes_128_gcm" => Ok(CipherKind::Aes128Gcm),
            "aes-256-gcm" | "aead_aes_256_gcm" => Ok(CipherKind::Aes256Gcm),
            "chacha20-ietf-poly1305" | "chacha20-poly1305" | "aead_chacha20_poly1305" => {
                Ok(CipherKind::Chacha20IetfPoly1305)
            }
            _ => Err(CipherError::UnknownMethod(name.to_string())),
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CipherKind::None => "none",
            CipherKind::Aes128Gcm => "aes-128-gcm",
            CipherKind::Aes256Gcm => "aes-256-gcm",
            CipherKind::Chacha20IetfPoly1305 => "chacha20-ietf-poly1305",
        };
        write!(f, "{}", name)
    }
}
