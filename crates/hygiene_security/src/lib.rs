//! Credential encryption for the hygiene platform.
//!
//! Registry credentials submitted alongside an `/analyze` request are never
//! persisted in plaintext; they are encrypted with [`CredentialCipher`]
//! before they reach the job store and decrypted only in request-local
//! scope by the registry adapters.

pub mod crypto;

pub use crypto::{CredentialCipher, CryptoError};
