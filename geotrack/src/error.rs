//! Crate-wide error taxonomy.
//!
//! Mirrors the four posture classes from the design: user-actionable errors
//! halt acquisition and are surfaced as events; transient errors are retried
//! by `ErrorRecovery`; structural errors propagate synchronously out of
//! `ready`/`set_config`; soft errors become diagnostic events and the engine
//! continues. Each subsystem gets its own thiserror enum; `GeoError`
//! aggregates them for callers that just want one `Result` type.

use std::time::SystemTime;

use thiserror::Error;

use crate::config::ConfigError;
use crate::geofence_engine::GeofenceError;
use crate::sync::SyncError;
use crate::trip_engine::TripError;

/// A discriminant classifying every error kind the engine can emit,
/// independent of the Rust error type carrying it. Used on the event bus so
/// subscribers can react by kind without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    PermissionDenied,
    ServicesDisabled,
    LocationTimeout,
    NetworkError,
    ServiceDisconnected,
    ConfigError,
    GeofenceError,
    TripError,
    PlatformError,
    InitializationError,
    AuthorizationChanged,
    Unknown,
}

impl ErrorKind {
    /// Transient kinds are auto-retried by `ErrorRecovery` until exhaustion.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::LocationTimeout | ErrorKind::NetworkError | ErrorKind::ServiceDisconnected
        )
    }

    /// User-actionable kinds halt acquisition and never auto-retry.
    pub fn is_user_actionable(self) -> bool {
        matches!(
            self,
            ErrorKind::PermissionDenied
                | ErrorKind::ServicesDisabled
                | ErrorKind::AuthorizationChanged
        )
    }

    /// Structural kinds are returned synchronously and never mutate state.
    pub fn is_structural(self) -> bool {
        matches!(self, ErrorKind::ConfigError | ErrorKind::InitializationError)
    }

    /// Soft kinds are diagnostic only; the affected operation is skipped.
    pub fn is_soft(self) -> bool {
        matches!(self, ErrorKind::GeofenceError | ErrorKind::TripError)
    }
}

/// The structured failure payload carried on the event bus and returned from
/// fallible coordinator operations, per spec §7.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub suggested_recovery: Option<String>,
    #[serde(skip)]
    pub timestamp: SystemTime,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggested_recovery: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_recovery(mut self, recovery: impl Into<String>) -> Self {
        self.suggested_recovery = Some(recovery.into());
        self
    }
}

/// Top-level aggregate error for fallible public operations.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("geofence error: {0}")]
    Geofence(#[from] GeofenceError),

    #[error("trip error: {0}")]
    Trip(#[from] TripError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("permission denied")]
    PermissionDenied,

    #[error("location services disabled")]
    ServicesDisabled,

    #[error("location request timed out after {0:?}")]
    LocationTimeout(std::time::Duration),

    #[error("storage worker error: {0}")]
    Store(String),
}

impl GeoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GeoError::Config(_) => ErrorKind::ConfigError,
            GeoError::Geofence(_) => ErrorKind::GeofenceError,
            GeoError::Trip(_) => ErrorKind::TripError,
            GeoError::Sync(_) => ErrorKind::NetworkError,
            GeoError::PermissionDenied => ErrorKind::PermissionDenied,
            GeoError::ServicesDisabled => ErrorKind::ServicesDisabled,
            GeoError::LocationTimeout(_) => ErrorKind::LocationTimeout,
            GeoError::Store(_) => ErrorKind::PlatformError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classification_matches_posture_classes() {
        assert!(ErrorKind::NetworkError.is_transient());
        assert!(ErrorKind::PermissionDenied.is_user_actionable());
        assert!(ErrorKind::ConfigError.is_structural());
        assert!(ErrorKind::TripError.is_soft());
    }

    #[test]
    fn geo_error_maps_to_expected_kind() {
        let err = GeoError::LocationTimeout(std::time::Duration::from_secs(5));
        assert_eq!(err.kind(), ErrorKind::LocationTimeout);
    }
}
