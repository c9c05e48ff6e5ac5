//! Boundary between the workflow engine and the synchronizer.
//!
//! The engine gets back one of three signals: complete the step, raise a
//! business error it can route to an error-handling branch (fatal classes),
//! or fail the job so its own retry policy applies (transient class).

use serde::Serialize;
use std::sync::Arc;

use crate::errors::{ErrorClass, SyncError};
use crate::shipment::{ShipmentId, ShipmentStatus};
use crate::workflows::{StatusSynchronizer, StepNotification, SyncAck};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum EngineSignal {
    Complete {
        shipment_id: ShipmentId,
        status: ShipmentStatus,
        applied: bool,
    },
    /// Fatal: do not retry, route to the error branch.
    BusinessError {
        error_code: String,
        class: ErrorClass,
        message: String,
    },
    /// Transient: hand the failure back to the engine's retry policy.
    Failure { error_code: String, message: String },
}

impl EngineSignal {
    pub fn is_complete(&self) -> bool {
        matches!(self, EngineSignal::Complete { .. })
    }
}

impl From<&SyncAck> for EngineSignal {
    fn from(ack: &SyncAck) -> Self {
        EngineSignal::Complete {
            shipment_id: ack.shipment_id(),
            status: ack.status(),
            applied: ack.was_applied(),
        }
    }
}

impl From<&SyncError> for EngineSignal {
    fn from(err: &SyncError) -> Self {
        let error_code = err.code().to_string();
        let message = err.to_string();
        match err.class() {
            ErrorClass::TransientInfrastructure => EngineSignal::Failure {
                error_code,
                message,
            },
            class => EngineSignal::BusinessError {
                error_code,
                class,
                message,
            },
        }
    }
}

/// Callback target the workflow engine invokes for status-update steps.
#[derive(Clone)]
pub struct WorkflowStepHandler {
    synchronizer: Arc<StatusSynchronizer>,
}

impl WorkflowStepHandler {
    pub fn new(synchronizer: Arc<StatusSynchronizer>) -> Self {
        Self { synchronizer }
    }

    pub async fn handle(&self, notification: &StepNotification) -> EngineSignal {
        match self.synchronizer.synchronize(notification).await {
            Ok(ack) => EngineSignal::from(&ack),
            Err(err) => EngineSignal::from(&err),
        }
    }

    /// Decode a raw JSON callback body and handle it.
    pub async fn handle_payload(&self, payload: &str) -> Result<EngineSignal, serde_json::Error> {
        let notification: StepNotification = serde_json::from_str(payload)?;
        Ok(self.handle(&notification).await)
    }
}
