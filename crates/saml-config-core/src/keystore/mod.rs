//! Credential Loader
//!
//! Opens a password-protected keystore and yields the signing credential for
//! one alias, together with certificate details for every alias in the store.
//!
//! Loading is synchronous and may be slow (key derivation, disk I/O); async
//! callers run it on the blocking pool.
//!
//! # Example
//!
//! ```rust,no_run
//! use saml_config_core::keystore::{CredentialLoader, SealedKeystoreLoader};
//! use std::path::Path;
//!
//! let loader = SealedKeystoreLoader::new();
//! let store = loader.load(Path::new("/etc/saml/acme.keystore"), "changeit", "acme-signing")?;
//! println!("{} entries", store.metadata().size);
//! # Ok::<(), saml_config_core::keystore::CredentialLoadError>(())
//! ```

mod certificate;
mod sealed;
mod signer;

pub use certificate::{
    certificates_from_pem_or_der, pem_blocks, private_key_from_pem_or_der, CertificateDetails,
};
pub use sealed::{KdfParams, SealedKeystoreBuilder, SealedKeystoreLoader, SEALED_STORE_TYPE};
pub use signer::{AssertionSigner, SignerError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors raised while opening a keystore
#[derive(Error, Debug)]
pub enum CredentialLoadError {
    #[error("Keystore not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Keystore password is incorrect or the store is corrupt: {}", .0.display())]
    BadPassword(PathBuf),

    #[error("Alias not found in keystore: {0}")]
    AliasNotFound(String),

    /// Alias holds a trusted certificate only, no private key
    #[error("Alias {0} is not a private key entry")]
    NotKeyEntry(String),

    #[error("Certificate under alias {alias} is not a valid X.509 certificate: {reason}")]
    NotX509 { alias: String, reason: String },

    #[error("Malformed keystore: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CredentialLoadError {
    /// Stable category name used in per-provider failure messages
    pub fn category(&self) -> &'static str {
        match self {
            CredentialLoadError::NotFound(_) => "KeystoreNotFound",
            CredentialLoadError::BadPassword(_) => "BadPassword",
            CredentialLoadError::AliasNotFound(_) => "AliasNotFound",
            CredentialLoadError::NotKeyEntry(_) => "NotKeyEntry",
            CredentialLoadError::NotX509 { .. } => "NotX509",
            CredentialLoadError::Malformed(_) => "MalformedKeystore",
            CredentialLoadError::Io(_) => "IoError",
        }
    }
}

pub type Result<T> = std::result::Result<T, CredentialLoadError>;

/// Opens keystores of one format
pub trait CredentialLoader: Send + Sync + fmt::Debug {
    /// Store type reported in keystore metadata
    fn store_type(&self) -> &str;

    /// Open `path` with `password` and extract the credential under `alias`
    fn load(&self, path: &Path, password: &str, alias: &str) -> Result<LoadedKeystore>;
}

/// A private key with its certificate chain
///
/// Key bytes are PKCS#8 DER and are wiped from memory on drop.
#[derive(Clone)]
pub struct Credential {
    alias: String,
    private_key: Zeroizing<Vec<u8>>,
    certificate_chain: Vec<Vec<u8>>,
}

impl Credential {
    pub fn new(
        alias: impl Into<String>,
        private_key: Vec<u8>,
        certificate_chain: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            alias: alias.into(),
            private_key: Zeroizing::new(private_key),
            certificate_chain,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn private_key_der(&self) -> &[u8] {
        &self.private_key
    }

    /// DER certificates, leaf first
    pub fn certificate_chain(&self) -> &[Vec<u8>] {
        &self.certificate_chain
    }

    pub fn leaf_certificate(&self) -> Option<&[u8]> {
        self.certificate_chain.first().map(Vec::as_slice)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("alias", &self.alias)
            .field("private_key", &"[REDACTED]")
            .field("certificate_chain_len", &self.certificate_chain.len())
            .finish()
    }
}

/// Metadata describing one keystore and every certificate in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreDetails {
    pub keystore_path: String,
    pub keystore_name: String,
    pub primary_alias: String,
    pub store_type: String,
    /// Number of entries in the store
    pub size: usize,
    /// Leaf certificate of every alias, ordered by alias
    pub certificates: Vec<CertificateDetails>,
}

/// Result of a successful [`CredentialLoader::load`]
#[derive(Debug, Clone)]
pub struct LoadedKeystore {
    pub path: PathBuf,
    pub store_type: String,
    pub credential: Credential,
    /// Number of entries in the store, including any left out of `entries`
    pub size: usize,
    /// Leaf certificate details for every readable alias, ordered by alias
    pub entries: Vec<CertificateDetails>,
}

impl LoadedKeystore {
    pub fn metadata(&self) -> KeystoreDetails {
        KeystoreDetails {
            keystore_path: self.path.display().to_string(),
            keystore_name: self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            primary_alias: self.credential.alias().to_string(),
            store_type: self.store_type.clone(),
            size: self.size,
            certificates: self.entries.clone(),
        }
    }
}
