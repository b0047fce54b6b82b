//! Provider Registry
//!
//! The immutable snapshot of provider configuration: one [`GeneralConfig`]
//! plus one [`ProviderConfig`] per provider id. A snapshot is never mutated
//! after construction; refreshes build a new [`ConfigData`] and swap it in
//! wholesale.
//!
//! # Raw Format
//!
//! The remote endpoint serves a flat string map:
//!
//! ```text
//! CERT_LIB_PATH            = /etc/saml/keystores
//! PROVIDER_LIST            = ACME, GLOBEX
//! ACME_KEYALIAS            = acme-signing
//! ACME_KEYSTOREFILE        = acme.keystore
//! ACME_KEYSTOREPASSWORD    = ********
//! ACME_PARSEENCODING       = UTF-8
//! ...
//! ```

mod parser;

pub use parser::parse;

use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Key holding the root directory of every provider keystore
pub const CERT_LIB_PATH: &str = "CERT_LIB_PATH";
/// Key holding the comma-separated provider ids
pub const PROVIDER_LIST: &str = "PROVIDER_LIST";

pub const KEY_ALIAS_SUFFIX: &str = "_KEYALIAS";
pub const KEYSTORE_FILE_SUFFIX: &str = "_KEYSTOREFILE";
pub const KEYSTORE_PASSWORD_SUFFIX: &str = "_KEYSTOREPASSWORD";
pub const PARSE_ENCODING_SUFFIX: &str = "_PARSEENCODING";

const MASKED: &str = "********";

/// General (non-provider-specific) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneralConfig {
    /// Root directory under which every provider keystore lives
    pub cert_lib_path: String,
}

impl GeneralConfig {
    pub fn new(cert_lib_path: impl Into<String>) -> Self {
        Self {
            cert_lib_path: cert_lib_path.into(),
        }
    }

    /// Resolve a provider's keystore filename against the library root
    ///
    /// The filename must stay inside the root: absolute paths and `..`
    /// components are rejected.
    pub fn keystore_path(&self, keystore_file: &str) -> Result<PathBuf, String> {
        let relative = Path::new(keystore_file);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained || relative.file_name().is_none() {
            return Err(format!(
                "keystore file {} must be a relative path inside the keystore library",
                keystore_file
            ));
        }
        Ok(Path::new(&self.cert_lib_path).join(relative))
    }
}

/// Configuration for a single provider
///
/// Every field is optional: the registry keeps whatever the endpoint served
/// and leaves it to consumers to reject incomplete providers individually.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderConfig {
    /// Alias of the signing key entry inside the keystore
    pub key_alias: Option<String>,
    /// Keystore filename, relative to [`GeneralConfig::cert_lib_path`]
    pub keystore_file: Option<String>,
    /// Keystore password
    #[serde(serialize_with = "serialize_masked")]
    pub keystore_password: Option<SecretString>,
    /// Text encoding hint for downstream assertion parsing
    pub parse_encoding: Option<String>,
}

impl ProviderConfig {
    pub fn new(
        key_alias: impl Into<String>,
        keystore_file: impl Into<String>,
        keystore_password: impl Into<String>,
        parse_encoding: impl Into<String>,
    ) -> Self {
        Self {
            key_alias: Some(key_alias.into()),
            keystore_file: Some(keystore_file.into()),
            keystore_password: Some(SecretString::new(keystore_password.into())),
            parse_encoding: Some(parse_encoding.into()),
        }
    }

    /// The password as plain text, for handing to a keystore loader
    pub fn password(&self) -> Option<&str> {
        self.keystore_password
            .as_ref()
            .map(|p| p.expose_secret().as_str())
    }

    /// Names of required fields that are absent or blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(self.keystore_file.as_deref()) {
            missing.push("keystore file");
        }
        if is_blank(self.password()) {
            missing.push("keystore password");
        }
        if is_blank(self.key_alias.as_deref()) {
            missing.push("key alias");
        }
        missing
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn serialize_masked<S: Serializer>(
    value: &Option<SecretString>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_str(MASKED),
        None => serializer.serialize_none(),
    }
}

/// Immutable configuration snapshot: general settings plus every provider
#[derive(Debug, Clone, Serialize)]
pub struct ConfigData {
    pub general: GeneralConfig,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl ConfigData {
    pub fn new(general: GeneralConfig, providers: BTreeMap<String, ProviderConfig>) -> Self {
        Self { general, providers }
    }

    /// Look up a provider by id
    pub fn provider(&self, provider_id: &str) -> Option<&ProviderConfig> {
        self.providers.get(provider_id)
    }

    /// Provider ids in the snapshot
    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Gate applied before a freshly fetched snapshot may be installed
    pub fn validate(&self) -> Result<(), String> {
        if self.general.cert_lib_path.trim().is_empty() {
            return Err("general configuration has an empty keystore library path".into());
        }
        if self.providers.is_empty() {
            return Err("no provider configurations found".into());
        }
        Ok(())
    }
}
