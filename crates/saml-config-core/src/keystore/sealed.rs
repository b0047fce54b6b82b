//! Sealed keystore format
//!
//! A JSON document whose private keys are sealed with ChaCha20-Poly1305
//! under a key derived from the store password with Argon2id. Certificates
//! are stored in the clear so metadata tooling can list them, but they are
//! only returned after the password has been verified.
//!
//! # File Format
//!
//! ```json
//! {
//!   "format": "sealed-keystore",
//!   "version": 1,
//!   "kdf": { "algorithm": "argon2id", "salt": "...", "m_cost": 19456, "t_cost": 2, "p_cost": 1 },
//!   "verifier": { "nonce": "...", "ciphertext": "..." },
//!   "entries": {
//!     "signing": { "certificates": ["<DER, base64>"], "private_key": { "nonce": "...", "ciphertext": "..." } },
//!     "partner": { "certificates": ["<DER, base64>"], "private_key": null }
//!   }
//! }
//! ```
//!
//! The verifier seals a fixed marker; each private key is sealed with its
//! alias as associated data so entries cannot be swapped between aliases.

use super::{
    certificates_from_pem_or_der, private_key_from_pem_or_der, CertificateDetails, Credential,
    CredentialLoadError, CredentialLoader, LoadedKeystore, Result,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::rand_core::RngCore;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Store type reported for sealed keystores
pub const SEALED_STORE_TYPE: &str = "SEALED";

const FORMAT: &str = "sealed-keystore";
const FORMAT_VERSION: u32 = 1;
const KDF_ALGORITHM: &str = "argon2id";
const VERIFIER_MARKER: &[u8] = b"sealed-keystore:v1";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

// Upper bounds on KDF parameters read from a store file
const MAX_M_COST: u32 = Params::DEFAULT_M_COST * 4;
const MAX_T_COST: u32 = Params::DEFAULT_T_COST * 8;
const MAX_P_COST: u32 = 16;

#[derive(Debug, Serialize, Deserialize)]
struct SealedFile {
    format: String,
    version: u32,
    kdf: KdfSection,
    verifier: SealedBlob,
    entries: BTreeMap<String, SealedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct KdfSection {
    algorithm: String,
    salt: String,
    m_cost: u32,
    t_cost: u32,
    p_cost: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedBlob {
    nonce: String,
    ciphertext: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedEntry {
    certificates: Vec<String>,
    private_key: Option<SealedBlob>,
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory in KiB
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        }
    }
}

fn derive_key(password: &str, salt: &[u8], params: KdfParams) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|e| CredentialLoadError::Malformed(format!("invalid KDF parameters: {}", e)))?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| CredentialLoadError::Malformed(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

fn cipher_for(key: &[u8; KEY_LEN]) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key))
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CredentialLoadError::Malformed(format!("{} is not valid base64: {}", field, e)))
}

fn seal(cipher: &ChaCha20Poly1305, plaintext: &[u8], aad: &[u8]) -> Result<SealedBlob> {
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CredentialLoadError::Malformed("sealing failed".into()))?;

    Ok(SealedBlob {
        nonce: STANDARD.encode(nonce),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

/// Open a sealed blob; `Ok(None)` means authentication failed
fn open(
    cipher: &ChaCha20Poly1305,
    blob: &SealedBlob,
    aad: &[u8],
) -> Result<Option<Zeroizing<Vec<u8>>>> {
    let nonce = decode("nonce", &blob.nonce)?;
    if nonce.len() != NONCE_LEN {
        return Err(CredentialLoadError::Malformed(format!(
            "nonce must be {} bytes, got {}",
            NONCE_LEN,
            nonce.len()
        )));
    }
    let ciphertext = decode("ciphertext", &blob.ciphertext)?;

    Ok(cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad,
            },
        )
        .ok()
        .map(Zeroizing::new))
}

/// Loads [`SealedFile`] keystores
#[derive(Debug, Clone, Default)]
pub struct SealedKeystoreLoader;

impl SealedKeystoreLoader {
    pub fn new() -> Self {
        Self
    }

    fn read(path: &Path) -> Result<SealedFile> {
        let content = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CredentialLoadError::NotFound(path.to_path_buf()),
            _ => CredentialLoadError::Io(e),
        })?;

        let file: SealedFile = serde_json::from_slice(&content)
            .map_err(|e| CredentialLoadError::Malformed(format!("JSON error: {}", e)))?;

        if file.format != FORMAT {
            return Err(CredentialLoadError::Malformed(format!(
                "unexpected format: {}",
                file.format
            )));
        }
        if file.version > FORMAT_VERSION {
            return Err(CredentialLoadError::Malformed(format!(
                "unsupported version: {} (max supported: {})",
                file.version, FORMAT_VERSION
            )));
        }
        if file.kdf.algorithm != KDF_ALGORITHM {
            return Err(CredentialLoadError::Malformed(format!(
                "unsupported KDF: {}",
                file.kdf.algorithm
            )));
        }
        let kdf = &file.kdf;
        if kdf.m_cost > MAX_M_COST || kdf.t_cost > MAX_T_COST || kdf.p_cost > MAX_P_COST {
            return Err(CredentialLoadError::Malformed(format!(
                "KDF parameters out of range: m_cost={} t_cost={} p_cost={} (max {}/{}/{})",
                kdf.m_cost,
                kdf.t_cost,
                kdf.p_cost,
                MAX_M_COST,
                MAX_T_COST,
                MAX_P_COST
            )));
        }

        Ok(file)
    }
}

impl CredentialLoader for SealedKeystoreLoader {
    fn store_type(&self) -> &str {
        SEALED_STORE_TYPE
    }

    fn load(&self, path: &Path, password: &str, alias: &str) -> Result<LoadedKeystore> {
        let file = Self::read(path)?;

        let salt = decode("salt", &file.kdf.salt)?;
        let key = derive_key(
            password,
            &salt,
            KdfParams {
                m_cost: file.kdf.m_cost,
                t_cost: file.kdf.t_cost,
                p_cost: file.kdf.p_cost,
            },
        )?;
        let cipher = cipher_for(&key);

        match open(&cipher, &file.verifier, b"")? {
            Some(marker) if marker.as_slice() == VERIFIER_MARKER => {}
            _ => return Err(CredentialLoadError::BadPassword(path.to_path_buf())),
        }

        let entry = file
            .entries
            .get(alias)
            .ok_or_else(|| CredentialLoadError::AliasNotFound(alias.to_string()))?;
        let sealed_key = entry
            .private_key
            .as_ref()
            .ok_or_else(|| CredentialLoadError::NotKeyEntry(alias.to_string()))?;
        let private_key = open(&cipher, sealed_key, alias.as_bytes())?.ok_or_else(|| {
            CredentialLoadError::Malformed(format!(
                "private key for alias {} failed its integrity check",
                alias
            ))
        })?;

        let chain = entry
            .certificates
            .iter()
            .map(|c| decode("certificate", c))
            .collect::<Result<Vec<_>>>()?;

        let mut entries = Vec::with_capacity(file.entries.len());
        for (entry_alias, entry) in &file.entries {
            let is_primary = entry_alias == alias;
            match leaf_details(entry_alias, entry, is_primary) {
                Ok(details) => entries.push(details),
                Err(e) if is_primary => return Err(e),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        alias = %entry_alias,
                        error = %e,
                        "Skipping unreadable keystore entry"
                    );
                }
            }
        }

        debug!(
            path = %path.display(),
            alias = %alias,
            entries = entries.len(),
            "Opened sealed keystore"
        );

        Ok(LoadedKeystore {
            path: path.to_path_buf(),
            store_type: SEALED_STORE_TYPE.to_string(),
            credential: Credential::new(alias, private_key.to_vec(), chain),
            size: file.entries.len(),
            entries,
        })
    }
}

/// Leaf certificate details of one entry
fn leaf_details(alias: &str, entry: &SealedEntry, is_primary: bool) -> Result<CertificateDetails> {
    let leaf = entry.certificates.first().ok_or_else(|| {
        CredentialLoadError::Malformed(format!("alias {} has no certificate", alias))
    })?;
    let der = decode("certificate", leaf)?;
    CertificateDetails::from_der(alias, &der, is_primary)
}

struct PendingEntry {
    certificates: Vec<Vec<u8>>,
    private_key: Option<Zeroizing<Vec<u8>>>,
}

/// Creates sealed keystores
///
/// ```rust,no_run
/// use saml_config_core::keystore::SealedKeystoreBuilder;
///
/// SealedKeystoreBuilder::new()
///     .add_key_entry_pem("signing", &std::fs::read("signing.key")?, &std::fs::read("signing.pem")?)?
///     .write_to("acme.keystore", "changeit")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct SealedKeystoreBuilder {
    params: KdfParams,
    entries: BTreeMap<String, PendingEntry>,
}

impl SealedKeystoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.params = params;
        self
    }

    /// Add a private key (PKCS#8 DER) with its certificate chain (DER, leaf first)
    pub fn add_key_entry(
        mut self,
        alias: impl Into<String>,
        private_key: Vec<u8>,
        certificate_chain: Vec<Vec<u8>>,
    ) -> Self {
        self.entries.insert(
            alias.into(),
            PendingEntry {
                certificates: certificate_chain,
                private_key: Some(Zeroizing::new(private_key)),
            },
        );
        self
    }

    /// Add a private key and chain given as PEM (or DER) input
    pub fn add_key_entry_pem(
        self,
        alias: impl Into<String>,
        private_key: &[u8],
        certificate_chain: &[u8],
    ) -> Result<Self> {
        let key = private_key_from_pem_or_der(private_key)?;
        let chain = certificates_from_pem_or_der(certificate_chain)?;
        Ok(self.add_key_entry(alias, key, chain))
    }

    /// Add a certificate-only entry
    pub fn add_trusted_certificate(mut self, alias: impl Into<String>, certificate: Vec<u8>) -> Self {
        self.entries.insert(
            alias.into(),
            PendingEntry {
                certificates: vec![certificate],
                private_key: None,
            },
        );
        self
    }

    pub fn add_trusted_certificate_pem(
        self,
        alias: impl Into<String>,
        certificate: &[u8],
    ) -> Result<Self> {
        let mut certs = certificates_from_pem_or_der(certificate)?;
        let leaf = certs.swap_remove(0);
        Ok(self.add_trusted_certificate(alias, leaf))
    }

    /// Seal the entries under `password` and render the store document
    pub fn seal(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let key = derive_key(password, &salt, self.params)?;
        let cipher = cipher_for(&key);

        let mut entries = BTreeMap::new();
        for (alias, pending) in &self.entries {
            let private_key = pending
                .private_key
                .as_ref()
                .map(|k| seal(&cipher, k, alias.as_bytes()))
                .transpose()?;
            entries.insert(
                alias.clone(),
                SealedEntry {
                    certificates: pending.certificates.iter().map(|c| STANDARD.encode(c)).collect(),
                    private_key,
                },
            );
        }

        let file = SealedFile {
            format: FORMAT.to_string(),
            version: FORMAT_VERSION,
            kdf: KdfSection {
                algorithm: KDF_ALGORITHM.to_string(),
                salt: STANDARD.encode(salt),
                m_cost: self.params.m_cost,
                t_cost: self.params.t_cost,
                p_cost: self.params.p_cost,
            },
            verifier: seal(&cipher, VERIFIER_MARKER, b"")?,
            entries,
        };

        serde_json::to_string_pretty(&file)
            .map_err(|e| CredentialLoadError::Malformed(format!("JSON error: {}", e)))
    }

    /// Seal and write the store, replacing any existing file atomically
    pub fn write_to(&self, path: impl AsRef<Path>, password: &str) -> Result<()> {
        let path = path.as_ref();
        let output = self.seal(password)?;

        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, output)?;
        std::fs::rename(&temp_path, path)?;

        debug!(path = %path.display(), entries = self.entries.len(), "Wrote sealed keystore");
        Ok(())
    }
}
