//! Authenticated symmetric encryption for credentials at rest
//! (`HYGIENE_ENCRYPTION_KEY`).
//!
//! The only contract that matters here is that decrypt(encrypt(x)) == x and
//! that ciphertexts are authenticated (tamper-evident). AES-256-GCM satisfies
//! that contract and is what the workspace already depends on.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_LEN} bytes, got {0}")]
    BadKeyLength(usize),
    #[error("invalid base64 key or ciphertext: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("ciphertext is shorter than the nonce prefix")]
    Truncated,
    #[error("decryption failed: ciphertext may be tampered or the key is wrong")]
    AuthenticationFailed,
}

/// An authenticated-encryption key for credential blobs, loaded once at
/// process start and held by the composition root.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(encoded)?;
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::BadKeyLength(bytes.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Generate a fresh random key, base64-encoded — used by deployment
    /// tooling and tests, never at request-serving time.
    pub fn generate_key_base64() -> String {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        STANDARD.encode(bytes)
    }

    /// Encrypt `plaintext`, returning a base64 blob of `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(combined))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt). The returned
    /// plaintext must be held only in request-local scope and never logged
    ///.
    pub fn decrypt(&self, blob_base64: &str) -> Result<Vec<u8>, CryptoError> {
        let combined = STANDARD.decode(blob_base64)?;
        if combined.len() < NONCE_LEN {
            return Err(CryptoError::Truncated);
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_after_encrypt_round_trips() {
        let key = CredentialCipher::generate_key_base64();
        let cipher = CredentialCipher::from_base64_key(&key).unwrap();
        let plaintext = b"registry-token-super-secret";
        let blob = cipher.encrypt(plaintext).unwrap();
        assert_ne!(blob.as_bytes(), plaintext);
        let decrypted = cipher.decrypt(&blob).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let key = CredentialCipher::generate_key_base64();
        let cipher = CredentialCipher::from_base64_key(&key).unwrap();
        let mut blob = cipher.encrypt(b"secret").unwrap();
        blob.push('x');
        assert!(cipher.decrypt(&blob).is_err());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let cipher_a = CredentialCipher::from_base64_key(&CredentialCipher::generate_key_base64()).unwrap();
        let cipher_b = CredentialCipher::from_base64_key(&CredentialCipher::generate_key_base64()).unwrap();
        let blob = cipher_a.encrypt(b"secret").unwrap();
        assert!(cipher_b.decrypt(&blob).is_err());
    }

    #[test]
    fn rejects_short_keys() {
        let short_key = STANDARD.encode([0u8; 16]);
        assert!(matches!(
            CredentialCipher::from_base64_key(&short_key),
            Err(CryptoError::BadKeyLength(16))
        ));
    }
}
