//! AEAD packet sealing and opening

use super::{bytes_to_key, session_key, CipherKind, TAG_LEN};
use crate::error::CipherError;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use std::sync::Arc;

/// Encrypts and decrypts whole UDP packets for one configured method
#[derive(Clone)]
pub struct PacketCipher {
    kind: CipherKind,
    key: Arc<[u8]>,
    rng: SystemRandom,
}

impl PacketCipher {
    /// Create a cipher for an AEAD method from a password
    pub fn new(kind: CipherKind, password: &str) -> Result<Self, CipherError> {
        if !kind.is_aead() {
            return Err(CipherError::UnknownMethod(kind.to_string()));
        }
        if password.is_empty() {
            return Err(CipherError::EmptyPassword(kind.to_string()));
        }

        Ok(PacketCipher {
            kind,
            key: bytes_to_key(password, kind.key_len()).into(),
            rng: SystemRandom::new(),
        })
    }

    /// The configured method
    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    /// Salt length in front of every packet
    pub fn salt_len(&self) -> usize {
        self.kind.key_len()
    }

    /// Bytes added to every packet by encryption
    pub fn overhead(&self) -> usize {
        self.salt_len() + TAG_LEN
    }

    /// Seal `plaintext` into `salt | ciphertext | tag`
    pub fn encrypt_packet(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let salt_len = self.salt_len();
        let mut packet = Vec::with_capacity(plaintext.len() + self.overhead());
        packet.resize(salt_len, 0);
        self.rng
            .fill(&mut packet[..salt_len])
            .map_err(|_| CipherError::SaltGeneration)?;

        let key = self.packet_key(&packet[..salt_len])?;
        packet.extend_from_slice(plaintext);

        let tag = key
            .seal_in_place_separate_tag(zero_nonce(), Aad::empty(), &mut packet[salt_len..])
            .map_err(|_| CipherError::KeyDerivation)?;
        packet.extend_from_slice(tag.as_ref());

        Ok(packet)
    }

    /// Open a sealed packet in place and return the plaintext slice
    pub fn decrypt_packet<'a>(&self, packet: &'a mut [u8]) -> Result<&'a [u8], CipherError> {
        let salt_len = self.salt_len();
        if packet.len() < salt_len + TAG_LEN {
            return Err(CipherError::PacketTooShort(packet.len()));
        }

        let (salt, sealed) = packet.split_at_mut(salt_len);
        let key = self.packet_key(salt)?;
        let plaintext = key
            .open_in_place(zero_nonce(), Aad::empty(), sealed)
            .map_err(|_| CipherError::AuthFailed)?;

        Ok(&*plaintext)
    }

    fn packet_key(&self, salt: &[u8]) -> Result<LessSafeKey, CipherError> {
        let algorithm = self.kind.algorithm().ok_or(CipherError::KeyDerivation)?;
        let subkey = session_key(&self.key, salt)?;
        let unbound =
            UnboundKey::new(algorithm, &subkey).map_err(|_| CipherError::KeyDerivation)?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketCipher")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn zero_nonce() -> Nonce {
    Nonce::assume_unique_for_key([0u8; NONCE_LEN])
}
