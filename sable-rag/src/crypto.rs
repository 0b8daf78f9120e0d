//! Chunk encryptor (C3): authenticated encryption of chunk text at rest.
//!
//! Vectors are always stored in plaintext (similarity search needs them
//! untransformed); only the retrievable text is encrypted. The key is
//! derived from the external key manager's data key via a slow KDF
//! (argon2id) before use, so a leaked raw data key alone is not a usable
//! AES key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::Argon2;
use rand::RngCore;

use crate::error::{RagError, Result};

const NONCE_LEN: usize = 12;
/// Domain-separation salt for the KDF. The data key itself already comes
/// from a per-user secret via the external key manager; this salt only
/// separates the derived AES key from other uses of that same data key.
const KDF_SALT: &[u8] = b"sable-rag/chunk-encryptor/v1";

/// Encrypts and decrypts chunk plaintext at rest (§4.3).
pub struct ChunkEncryptor {
    cipher: Aes256Gcm,
}

impl ChunkEncryptor {
    /// Derive an AES-256-GCM key from raw data-key bytes via argon2id.
    pub fn new(data_key: &[u8]) -> Result<Self> {
        let mut derived = [0u8; 32];
        Argon2::default()
            .hash_password_into(data_key, KDF_SALT, &mut derived)
            .map_err(|e| RagError::Corruption(format!("key derivation failed: {e}")))?;

        let key = Key::<Aes256Gcm>::from_slice(&derived);
        Ok(Self { cipher: Aes256Gcm::new(key) })
    }

    /// Encrypt `plaintext`, returning `nonce ∥ ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| RagError::Corruption(format!("encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt `nonce ∥ ciphertext` back to plaintext. Any failure —
    /// truncated input, wrong key, tampered tag — is a [`RagError::Corruption`]
    /// (§7 `CorruptionError`): the caller must abort the current read.
    pub fn decrypt(&self, data: &[u8]) -> Result<String> {
        if data.len() < NONCE_LEN {
            return Err(RagError::Corruption("ciphertext shorter than nonce".to_string()));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| RagError::Corruption("chunk ciphertext failed authentication".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| RagError::Corruption(format!("decrypted chunk is not valid utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let encryptor = ChunkEncryptor::new(b"a sufficiently long test data key").unwrap();
        let plaintext = "The capital of France is Paris.";
        let ciphertext = encryptor.encrypt(plaintext).unwrap();
        assert_ne!(ciphertext, plaintext.as_bytes());
        assert_eq!(encryptor.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn tampered_ciphertext_is_corruption_error() {
        let encryptor = ChunkEncryptor::new(b"a sufficiently long test data key").unwrap();
        let mut ciphertext = encryptor.encrypt("hello").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;

        let err = encryptor.decrypt(&ciphertext).unwrap_err();
        assert!(matches!(err, RagError::Corruption(_)));
    }

    #[test]
    fn different_keys_cannot_decrypt_each_other() {
        let a = ChunkEncryptor::new(b"key material for tenant a..........").unwrap();
        let b = ChunkEncryptor::new(b"key material for tenant b..........").unwrap();
        let ciphertext = a.encrypt("secret").unwrap();
        assert!(b.decrypt(&ciphertext).is_err());
    }
}
