//! Error types for Ssrelay
//!
//! This module defines the custom error types used by the relay core.

use std::io;
use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Address framing error
    #[error("Address error: {0}")]
    Address(String),

    /// Packet encryption error
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),
}

/// Packet encryption errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Unknown cipher method name
    #[error("Unknown cipher method: {0}")]
    UnknownMethod(String),

    /// A real cipher was configured without a password
    #[error("Empty password for cipher {0}")]
    EmptyPassword(String),

    /// Packet shorter than salt plus tag
    #[error("Packet too short: {0} bytes")]
    PacketTooShort(usize),

    /// Authentication tag did not verify
    #[error("Packet authentication failed")]
    AuthFailed,

    /// Random salt generation failed
    #[error("Failed to generate salt")]
    SaltGeneration,

    /// Subkey derivation failed
    #[error("Failed to derive session key")]
    KeyDerivation,
}

impl From<CipherError> for io::Error {
    fn from(err: CipherError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

/// Whether an I/O error is an expired idle deadline rather than a failure
pub fn is_idle_timeout(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::TimedOut
}
