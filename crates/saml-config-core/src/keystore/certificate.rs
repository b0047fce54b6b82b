//! X.509 certificate inspection and PEM decoding

use super::CredentialLoadError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::pem::Pem;

/// Summary of one certificate held under an alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDetails {
    pub alias: String,
    pub subject: String,
    pub issuer: String,
    /// Serial number in decimal
    pub serial_number: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// Whether this alias is the provider's configured signing alias
    pub is_primary: bool,
}

impl CertificateDetails {
    /// Parse a DER certificate stored under `alias`
    pub fn from_der(alias: &str, der: &[u8], is_primary: bool) -> Result<Self, CredentialLoadError> {
        let not_x509 = |reason: String| CredentialLoadError::NotX509 {
            alias: alias.to_string(),
            reason,
        };

        let (_, cert) =
            x509_parser::parse_x509_certificate(der).map_err(|e| not_x509(e.to_string()))?;

        let validity = cert.validity();
        let valid_from = timestamp(validity.not_before.timestamp())
            .ok_or_else(|| not_x509("notBefore is out of range".into()))?;
        let valid_until = timestamp(validity.not_after.timestamp())
            .ok_or_else(|| not_x509("notAfter is out of range".into()))?;

        Ok(Self {
            alias: alias.to_string(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial_number: cert.serial.to_string(),
            valid_from,
            valid_until,
            is_primary,
        })
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Decode every PEM block labelled `label` into DER
pub fn pem_blocks(input: &[u8], label: &str) -> Result<Vec<Vec<u8>>, CredentialLoadError> {
    let mut blocks = Vec::new();
    for pem in Pem::iter_from_buffer(input) {
        let pem = pem.map_err(|e| CredentialLoadError::Malformed(format!("PEM error: {}", e)))?;
        if pem.label == label {
            blocks.push(pem.contents);
        }
    }
    Ok(blocks)
}

/// Decode certificates given either as PEM text or as a single DER blob
pub fn certificates_from_pem_or_der(input: &[u8]) -> Result<Vec<Vec<u8>>, CredentialLoadError> {
    if input.starts_with(b"-----BEGIN") {
        let certs = pem_blocks(input, "CERTIFICATE")?;
        if certs.is_empty() {
            return Err(CredentialLoadError::Malformed(
                "no CERTIFICATE block found".into(),
            ));
        }
        Ok(certs)
    } else {
        Ok(vec![input.to_vec()])
    }
}

/// Decode a PKCS#8 private key given either as PEM text or raw DER
pub fn private_key_from_pem_or_der(input: &[u8]) -> Result<Vec<u8>, CredentialLoadError> {
    if input.starts_with(b"-----BEGIN") {
        pem_blocks(input, "PRIVATE KEY")?
            .into_iter()
            .next()
            .ok_or_else(|| CredentialLoadError::Malformed("no PRIVATE KEY block found".into()))
    } else {
        Ok(input.to_vec())
    }
}
