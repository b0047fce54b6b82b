//! Assertion signing hand-off
//!
//! XML construction, canonicalization and signature placement live outside
//! this crate. The service only resolves a provider's [`Credential`] and
//! passes it to an implementation of [`AssertionSigner`].

use super::Credential;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Unsupported key type: {0}")]
    UnsupportedKey(String),
}

/// Signs or encrypts assertion documents with a provider credential
pub trait AssertionSigner: Send + Sync {
    /// Return `document` with an enveloped signature made by `credential`
    fn sign(&self, document: &[u8], credential: &Credential) -> Result<Vec<u8>, SignerError>;

    /// Return `document` encrypted for the holder of `credential`'s certificate
    fn encrypt(&self, document: &[u8], credential: &Credential) -> Result<Vec<u8>, SignerError>;
}
