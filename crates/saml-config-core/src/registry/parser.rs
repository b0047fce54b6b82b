//! Raw map → [`ConfigData`] parsing
//!
//! Parsing is pure: it never touches the filesystem or the network. Missing
//! per-provider fields are kept as `None` and reported at `warn` level; the
//! aggregator rejects such providers one by one.

use super::{
    ConfigData, GeneralConfig, ProviderConfig, CERT_LIB_PATH, KEYSTORE_FILE_SUFFIX,
    KEYSTORE_PASSWORD_SUFFIX, KEY_ALIAS_SUFFIX, PARSE_ENCODING_SUFFIX, PROVIDER_LIST,
};
use crate::error::ParseError;
use secrecy::SecretString;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Parse a flat key/value map into a configuration snapshot
pub fn parse(raw: &HashMap<String, String>) -> Result<ConfigData, ParseError> {
    let general = parse_general(raw)?;
    let providers = parse_providers(raw);

    debug!(
        cert_lib_path = %general.cert_lib_path,
        providers = providers.len(),
        "Parsed provider registry"
    );

    Ok(ConfigData::new(general, providers))
}

fn parse_general(raw: &HashMap<String, String>) -> Result<GeneralConfig, ParseError> {
    let path = raw
        .get(CERT_LIB_PATH)
        .ok_or_else(|| ParseError::MissingKey(CERT_LIB_PATH.to_string()))?;

    if path.trim().is_empty() {
        return Err(ParseError::EmptyValue(CERT_LIB_PATH.to_string()));
    }

    Ok(GeneralConfig::new(path.trim()))
}

fn parse_providers(raw: &HashMap<String, String>) -> BTreeMap<String, ProviderConfig> {
    let Some(list) = raw.get(PROVIDER_LIST) else {
        warn!("{} is not set, registry has no providers", PROVIDER_LIST);
        return BTreeMap::new();
    };

    provider_ids(list)
        .map(|id| {
            let config = ProviderConfig {
                key_alias: field(raw, id, KEY_ALIAS_SUFFIX),
                keystore_file: field(raw, id, KEYSTORE_FILE_SUFFIX),
                keystore_password: field(raw, id, KEYSTORE_PASSWORD_SUFFIX)
                    .map(SecretString::new),
                parse_encoding: field(raw, id, PARSE_ENCODING_SUFFIX),
            };
            (id.to_string(), config)
        })
        .collect()
}

/// Split the provider list, trimming ids and skipping empty items
fn provider_ids(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|id| !id.is_empty())
}

fn field(raw: &HashMap<String, String>, provider_id: &str, suffix: &str) -> Option<String> {
    let key = format!("{}{}", provider_id, suffix);
    let value = raw.get(&key).cloned();
    if value.is_none() {
        warn!(provider = %provider_id, key = %key, "Provider configuration key is missing");
    }
    value
}
