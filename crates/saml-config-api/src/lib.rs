//! SAML Config API
//!
//! REST surface over [`saml_config_core::CredentialService`]:
//!
//! | Route                      | Response                                        |
//! |----------------------------|-------------------------------------------------|
//! | `GET /health`              | liveness and last configuration refresh         |
//! | `GET /config`              | current provider configuration, passwords masked |
//! | `POST /config/clear-cache` | `204`, next read refreshes                      |
//! | `GET /keystores`           | credential metadata for every provider          |
//! | `GET /metrics`             | Prometheus text exposition                      |
//!
//! `GET /keystores` answers `200` when every provider loaded, `206` when some
//! did, `504` when none did before the deadline and `400` when none did at
//! all. Configuration that cannot be fetched yields `503`.

pub mod handler;

pub use handler::{create_router, status_for, ApiError, AppState, ErrorBody};
