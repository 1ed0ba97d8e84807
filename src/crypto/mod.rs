//! Packet encryption for the relay tunnel
//!
//! Implements the Shadowsocks AEAD packet format used on the leg between
//! the local and remote relays:
//!
//! ```text
//! +--------+---------------------+-----+
//! |  SALT  | ENCRYPTED PAYLOAD   | TAG |
//! +--------+---------------------+-----+
//! | keylen |      Variable       | 16  |
//! +--------+---------------------+-----+
//! ```
//!
//! Every packet carries a fresh random salt from which a per-packet subkey
//! is derived, so the nonce can stay zero.

mod aead;
mod cipher;
mod key;

pub use aead::PacketCipher;
pub use cipher::CipherKind;
pub use key::{bytes_to_key, session_key};

/// Length of the AEAD authentication tag
pub const TAG_LEN: usize = 16;
