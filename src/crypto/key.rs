//! Key derivation
//!
//! The master key comes from the password via OpenSSL's `EVP_BytesToKey`
//! (MD5, one iteration, no salt). Each packet then derives its own subkey
//! with HKDF-SHA1 over the packet salt.

use crate::error::CipherError;
use md5::{Digest, Md5};

const SS_SUBKEY_INFO: &[&[u8]] = &[b"ss-subkey"];

struct SliceKeyType(usize);

impl ring::hkdf::KeyType for SliceKeyType {
    fn len(&self) -> usize {
        self.0
    }
}

/// Derive a `key_len` byte master key from a password
pub fn bytes_to_key(password: &str, key_len: usize) -> Vec<u8> {
    let password = password.as_bytes();
    let mut key = Vec::with_capacity(key_len + 16);
    let mut prev: Option<[u8; 16]> = None;

    while key.len() < key_len {
        let mut context = Md5::new();
        if let Some(digest) = prev {
            context.update(digest);
        }
        context.update(password);
        let digest: [u8; 16] = context.finalize().into();
        key.extend_from_slice(&digest);
        prev = Some(digest);
    }

    key.truncate(key_len);
    key
}

/// Derive the per-packet subkey for `salt`
pub fn session_key(key: &[u8], salt: &[u8]) -> Result<Vec<u8>, CipherError> {
    let mut subkey = vec![0u8; key.len()];
    ring::hkdf::Salt::new(ring::hkdf::HKDF_SHA1_FOR_LEGACY_USE_ONLY, salt)
        .extract(key)
        .expand(SS_SUBKEY_INFO, SliceKeyType(key.len()))
        .map_err(|_| CipherError::KeyDerivation)?
        .fill(&mut subkey)
        .map_err(|_| CipherError::KeyDerivation)?;
    Ok(subkey)
}
