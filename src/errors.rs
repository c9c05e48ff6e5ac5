// Error vocabulary for the synchronization core.
// Every failure that leaves this crate is a SyncError and carries an ErrorClass.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::shipment::ShipmentId;

/// Failures surfaced by a `ShipmentStore` implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("stored row could not be decoded: {reason}")]
    Corrupt { reason: String },

    #[error("tracking id of shipment {shipment_id} cannot change from {stored} to {requested}")]
    TrackingIdChanged {
        shipment_id: ShipmentId,
        stored: String,
        requested: String,
    },

    #[error("shipment {shipment_id} kept changing under concurrent writers ({attempts} attempts)")]
    Contended { shipment_id: ShipmentId, attempts: u32 },
}

impl StorageError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StorageError::Unavailable {
            message: message.into(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StorageError::UniqueViolation { .. })
    }
}

/// How the workflow engine should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// The workflow definition and this code disagree. Never retry.
    FatalDefinition,
    /// The notification itself is malformed. Never retry automatically.
    FatalData,
    /// Storage or capacity trouble. Retry at the engine's discretion.
    TransientInfrastructure,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::FatalDefinition => "FATAL_DEFINITION",
            ErrorClass::FatalData => "FATAL_DATA",
            ErrorClass::TransientInfrastructure => "TRANSIENT_INFRASTRUCTURE",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::TransientInfrastructure)
    }

    pub fn is_fatal(self) -> bool {
        !self.is_retryable()
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the synchronizer, allocator and registrar.
///
/// Variants carry the step, run and shipment context available at the point
/// of detection so they can be logged before crossing the engine boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unknown workflow step '{step_id}' (run {run_id})")]
    UnknownStep { step_id: String, run_id: String },

    #[error("workflow variable '{variable}' is missing (step '{step_id}', run {run_id})")]
    MissingVariable {
        variable: String,
        step_id: String,
        run_id: String,
    },

    #[error("workflow variable '{variable}' has unusable value {found} (step '{step_id}', run {run_id})")]
    InvalidVariableType {
        variable: String,
        found: String,
        step_id: String,
        run_id: String,
    },

    #[error("shipment {shipment_id} not found (step '{step_id}', run {run_id})")]
    RecordNotFound {
        shipment_id: ShipmentId,
        step_id: String,
        run_id: String,
    },

    #[error("tracking identifier space exhausted after {attempts} attempts")]
    IdentifierSpaceExhausted { attempts: u32 },

    #[error("shipment storage unavailable during {operation}: {source}")]
    StorageUnavailable {
        operation: String,
        shipment_id: Option<ShipmentId>,
        #[source]
        source: StorageError,
    },
}

impl SyncError {
    pub fn storage(
        operation: impl Into<String>,
        shipment_id: Option<ShipmentId>,
        source: StorageError,
    ) -> Self {
        SyncError::StorageUnavailable {
            operation: operation.into(),
            shipment_id,
            source,
        }
    }

    /// The three-way classification the engine boundary acts on.
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::UnknownStep { .. } => ErrorClass::FatalDefinition,
            SyncError::MissingVariable { .. }
            | SyncError::InvalidVariableType { .. }
            | SyncError::RecordNotFound { .. } => ErrorClass::FatalData,
            SyncError::IdentifierSpaceExhausted { .. } | SyncError::StorageUnavailable { .. } => {
                ErrorClass::TransientInfrastructure
            }
        }
    }

    /// Stable error code reported to the workflow engine.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::UnknownStep { .. } => "UNKNOWN_STEP",
            SyncError::MissingVariable { .. } => "MISSING_VARIABLE",
            SyncError::InvalidVariableType { .. } => "INVALID_VARIABLE_TYPE",
            SyncError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            SyncError::IdentifierSpaceExhausted { .. } => "IDENTIFIER_SPACE_EXHAUSTED",
            SyncError::StorageUnavailable { .. } => "STORAGE_UNAVAILABLE",
        }
    }

    /// Response status the HTTP layer uses when it surfaces this error.
    pub fn http_status(&self) -> u16 {
        match self {
            SyncError::RecordNotFound { .. } => 404,
            SyncError::MissingVariable { .. } => 400,
            SyncError::InvalidVariableType { .. } => 422,
            SyncError::UnknownStep { .. } => 500,
            SyncError::IdentifierSpaceExhausted { .. } | SyncError::StorageUnavailable { .. } => {
                503
            }
        }
    }

    /// Emit the error at a level matching its class.
    pub fn log(&self) {
        match self.class() {
            ErrorClass::TransientInfrastructure => tracing::warn!(
                error.class = %self.class(),
                error.code = self.code(),
                "{}",
                self
            ),
            ErrorClass::FatalDefinition | ErrorClass::FatalData => tracing::error!(
                error.class = %self.class(),
                error.code = self.code(),
                "{}",
                self
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_ctx() -> (String, String) {
        ("task_UpdateStatusReceived".to_string(), "run-1".to_string())
    }

    #[test]
    fn test_every_variant_is_classified() {
        let (step_id, run_id) = step_ctx();
        let cases = vec![
            (
                SyncError::UnknownStep {
                    step_id: "no_such_step".into(),
                    run_id: run_id.clone(),
                },
                ErrorClass::FatalDefinition,
            ),
            (
                SyncError::MissingVariable {
                    variable: "shipmentId".into(),
                    step_id: step_id.clone(),
                    run_id: run_id.clone(),
                },
                ErrorClass::FatalData,
            ),
            (
                SyncError::InvalidVariableType {
                    variable: "shipmentId".into(),
                    found: "\"abc\"".into(),
                    step_id: step_id.clone(),
                    run_id: run_id.clone(),
                },
                ErrorClass::FatalData,
            ),
            (
                SyncError::RecordNotFound {
                    shipment_id: ShipmentId(9),
                    step_id,
                    run_id,
                },
                ErrorClass::FatalData,
            ),
            (
                SyncError::IdentifierSpaceExhausted { attempts: 10 },
                ErrorClass::TransientInfrastructure,
            ),
            (
                SyncError::storage("save", None, StorageError::unavailable("pool closed")),
                ErrorClass::TransientInfrastructure,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.class(), expected, "{}", error.code());
        }
    }

    #[test]
    fn test_http_status_split_between_client_and_server_errors() {
        let not_found = SyncError::RecordNotFound {
            shipment_id: ShipmentId(1),
            step_id: "s".into(),
            run_id: "r".into(),
        };
        assert_eq!(not_found.http_status(), 404);

        let exhausted = SyncError::IdentifierSpaceExhausted { attempts: 3 };
        assert_eq!(exhausted.http_status(), 503);
    }

    #[test]
    fn test_class_wire_names() {
        assert_eq!(ErrorClass::FatalDefinition.to_string(), "FATAL_DEFINITION");
        assert_eq!(
            serde_json::to_string(&ErrorClass::TransientInfrastructure).unwrap(),
            "\"TRANSIENT_INFRASTRUCTURE\""
        );
        assert!(ErrorClass::TransientInfrastructure.is_retryable());
        assert!(ErrorClass::FatalData.is_fatal());
    }

    #[test]
    fn test_storage_error_keeps_source() {
        use std::error::Error as _;
        let err = SyncError::storage(
            "find_by_id",
            Some(ShipmentId(3)),
            StorageError::unavailable("connection refused"),
        );
        let source = err.source().expect("source is attached");
        assert!(source.to_string().contains("connection refused"));
    }
}
