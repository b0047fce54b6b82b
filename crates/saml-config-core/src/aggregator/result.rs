//! Aggregation result types

use crate::keystore::KeystoreDetails;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-provider outcome of an aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialMetadata {
    Success {
        provider_id: String,
        parse_encoding: Option<String>,
        keystore: KeystoreDetails,
        processed_at: DateTime<Utc>,
    },
    Failure {
        provider_id: String,
        error: String,
        processed_at: DateTime<Utc>,
    },
}

impl CredentialMetadata {
    pub fn success(
        provider_id: impl Into<String>,
        parse_encoding: Option<String>,
        keystore: KeystoreDetails,
    ) -> Self {
        CredentialMetadata::Success {
            provider_id: provider_id.into(),
            parse_encoding,
            keystore,
            processed_at: Utc::now(),
        }
    }

    pub fn failure(provider_id: impl Into<String>, error: impl Into<String>) -> Self {
        CredentialMetadata::Failure {
            provider_id: provider_id.into(),
            error: error.into(),
            processed_at: Utc::now(),
        }
    }

    pub fn provider_id(&self) -> &str {
        match self {
            CredentialMetadata::Success { provider_id, .. }
            | CredentialMetadata::Failure { provider_id, .. } => provider_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CredentialMetadata::Success { .. })
    }

    /// Status label as serialized
    pub fn status(&self) -> &'static str {
        match self {
            CredentialMetadata::Success { .. } => "SUCCESS",
            CredentialMetadata::Failure { .. } => "FAILURE",
        }
    }
}

/// Overall status of one aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationStatus {
    Completed,
    CompletedWithFailures,
    TimedOut,
}

impl AggregationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationStatus::Completed => "COMPLETED",
            AggregationStatus::CompletedWithFailures => "COMPLETED_WITH_FAILURES",
            AggregationStatus::TimedOut => "TIMED_OUT",
        }
    }
}

/// Classification used to pick a response code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationOutcome {
    /// Every provider succeeded
    Success,
    /// Errors, but at least one provider succeeded
    PartialSuccess,
    /// Nothing succeeded before the deadline
    TimedOut,
    /// Nothing succeeded
    Failed,
}

/// Counts and identifiers for one aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    /// Providers in the registry snapshot
    pub total_providers: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub has_errors: bool,
    pub operation_id: Uuid,
    /// Providers that had not finished when the deadline expired
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_providers: Vec<String>,
}

/// Aggregated credential metadata across every provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub providers: BTreeMap<String, CredentialMetadata>,
    pub summary: OperationSummary,
    pub status: AggregationStatus,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl AggregationResult {
    /// Build a result from collected outcomes
    ///
    /// `pending` is non-empty only when the deadline expired.
    pub fn new(
        operation_id: Uuid,
        total_providers: usize,
        providers: BTreeMap<String, CredentialMetadata>,
        mut pending: Vec<String>,
        timed_out: bool,
    ) -> Self {
        let success_count = providers.values().filter(|m| m.is_success()).count();
        let failure_count = providers.len() - success_count;
        pending.sort();

        let status = if timed_out {
            AggregationStatus::TimedOut
        } else if failure_count > 0 {
            AggregationStatus::CompletedWithFailures
        } else {
            AggregationStatus::Completed
        };

        Self {
            providers,
            summary: OperationSummary {
                total_providers,
                success_count,
                failure_count,
                has_errors: timed_out || failure_count > 0,
                operation_id,
                pending_providers: pending,
            },
            status,
            duration_ms: 0,
            completed_at: Utc::now(),
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    pub fn outcome(&self) -> AggregationOutcome {
        if !self.summary.has_errors {
            AggregationOutcome::Success
        } else if self.summary.success_count > 0 {
            AggregationOutcome::PartialSuccess
        } else if self.status == AggregationStatus::TimedOut {
            AggregationOutcome::TimedOut
        } else {
            AggregationOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> KeystoreDetails {
        KeystoreDetails {
            keystore_path: "/certs/a.keystore".into(),
            keystore_name: "a.keystore".into(),
            primary_alias: "a1".into(),
            store_type: "SEALED".into(),
            size: 0,
            certificates: Vec::new(),
        }
    }

    fn outcomes(entries: Vec<CredentialMetadata>) -> BTreeMap<String, CredentialMetadata> {
        entries
            .into_iter()
            .map(|m| (m.provider_id().to_string(), m))
            .collect()
    }

    #[test]
    fn test_metadata_serializes_with_status_tag() {
        let ok = serde_json::to_value(CredentialMetadata::success("A", Some("UTF-8".into()), details()))
            .unwrap();
        assert_eq!(ok["status"], "SUCCESS");
        assert_eq!(ok["keystore"]["primary_alias"], "a1");
        assert!(ok.get("error").is_none());

        let failed = serde_json::to_value(CredentialMetadata::failure("B", "boom")).unwrap();
        assert_eq!(failed["status"], "FAILURE");
        assert_eq!(failed["error"], "boom");
        assert!(failed.get("keystore").is_none());
    }

    #[test]
    fn test_all_successful() {
        let result = AggregationResult::new(
            Uuid::new_v4(),
            1,
            outcomes(vec![CredentialMetadata::success("A", None, details())]),
            Vec::new(),
            false,
        );
        assert_eq!(result.status, AggregationStatus::Completed);
        assert!(!result.summary.has_errors);
        assert_eq!(result.outcome(), AggregationOutcome::Success);
    }

    #[test]
    fn test_partial_failure() {
        let result = AggregationResult::new(
            Uuid::new_v4(),
            2,
            outcomes(vec![
                CredentialMetadata::success("A", None, details()),
                CredentialMetadata::failure("B", "bad password"),
            ]),
            Vec::new(),
            false,
        );
        assert_eq!(result.status, AggregationStatus::CompletedWithFailures);
        assert_eq!(result.summary.failure_count, 1);
        assert_eq!(result.outcome(), AggregationOutcome::PartialSuccess);
    }

    #[test]
    fn test_timeout_without_successes() {
        let result = AggregationResult::new(
            Uuid::new_v4(),
            2,
            BTreeMap::new(),
            vec!["B".into(), "A".into()],
            true,
        );
        assert_eq!(result.status, AggregationStatus::TimedOut);
        assert!(result.summary.has_errors);
        assert_eq!(result.summary.pending_providers, vec!["A", "B"]);
        assert_eq!(result.outcome(), AggregationOutcome::TimedOut);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "TIMED_OUT");
    }

    #[test]
    fn test_every_provider_failed() {
        let result = AggregationResult::new(
            Uuid::new_v4(),
            1,
            outcomes(vec![CredentialMetadata::failure("A", "not found")]),
            Vec::new(),
            false,
        );
        assert_eq!(result.outcome(), AggregationOutcome::Failed);
    }
}
