//! Payload sealing bound to a connection's key material.
//!
//! Key negotiation belongs to the connection layer; a `Cryptor` only applies
//! whatever key that layer settled on.

use bytes::Bytes;
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::XChaCha20Poly1305;
use rand::RngCore;

use svcrelay_core::error::{CryptoOp, Result, RelayError};

/// XChaCha20-Poly1305 nonce length.
const NONCE_LEN: usize = 24;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// Seal/unseal capability for one connection.
pub trait Cryptor: Send + Sync {
    fn seal(&self, plain: &[u8]) -> Result<Bytes>;
    fn unseal(&self, sealed: &[u8]) -> Result<Bytes>;
}

/// Identity cryptor for connections without negotiated keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCryptor;

impl Cryptor for PassthroughCryptor {
    fn seal(&self, plain: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(plain))
    }

    fn unseal(&self, sealed: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(sealed))
    }
}

/// XChaCha20-Poly1305 with a random nonce prepended to each ciphertext.
pub struct XChaChaCryptor {
    cipher: XChaCha20Poly1305,
}

impl XChaChaCryptor {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(GenericArray::from_slice(key)),
        }
    }

    /// Build from a 64-character hex key.
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let raw = hex::decode(key_hex.trim())
            .map_err(|e| RelayError::Config(format!("seal key is not hex: {e}")))?;
        let key: [u8; KEY_LEN] = raw.try_into().map_err(|v: Vec<u8>| {
            RelayError::Config(format!("seal key must be {KEY_LEN} bytes, got {}", v.len()))
        })?;
        Ok(Self::new(&key))
    }
}

impl std::fmt::Debug for XChaChaCryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("XChaChaCryptor(..)")
    }
}

impl Cryptor for XChaChaCryptor {
    fn seal(&self, plain: &[u8]) -> Result<Bytes> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(GenericArray::from_slice(&nonce), plain)
            .map_err(|e| RelayError::Crypto {
                op: CryptoOp::Seal,
                reason: e.to_string(),
            })?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(Bytes::from(out))
    }

    fn unseal(&self, sealed: &[u8]) -> Result<Bytes> {
        if sealed.len() < NONCE_LEN {
            return Err(RelayError::Crypto {
                op: CryptoOp::Unseal,
                reason: "sealed payload shorter than nonce".into(),
            });
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(GenericArray::from_slice(nonce), ciphertext)
            .map(Bytes::from)
            .map_err(|e| RelayError::Crypto {
                op: CryptoOp::Unseal,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcrelay_core::error::ErrorCategory;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn sealed_bytes_open_with_same_key() {
        let c = XChaChaCryptor::from_hex(KEY_HEX).unwrap();
        let sealed = c.seal(b"{\"success\":42}").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + 14 + 16);
        assert_eq!(c.unseal(&sealed).unwrap().as_ref(), b"{\"success\":42}");
    }

    #[test]
    fn tampered_ciphertext_is_a_decode_failure() {
        let c = XChaChaCryptor::from_hex(KEY_HEX).unwrap();
        let mut sealed = c.seal(b"payload").unwrap().to_vec();
        if let Some(last) = sealed.last_mut() {
            *last ^= 0xff;
        }
        let err = c.unseal(&sealed).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Decode);

        let err = c.unseal(b"short").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Decode);
    }

    #[test]
    fn bad_key_is_config_error() {
        assert!(XChaChaCryptor::from_hex("abcd").is_err());
        assert!(XChaChaCryptor::from_hex("zz").is_err());
    }
}
