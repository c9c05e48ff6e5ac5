// Idempotent workflow-step -> shipment-status synchronization.
//
// One call per step notification. Within a process the read-modify-write runs
// under the shipment's record lock. Across processes the write is conditioned
// on the status that was read, so a racing duplicate finds its write rejected,
// re-reads, and observes the applied status.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use super::notification::StepNotification;
use super::record_locks::RecordLocks;
use super::step_map;
use super::variables::{shipment_id_from, CoercionError};
use crate::config::WorkflowConfig;
use crate::errors::{StorageError, SyncError};
use crate::notify::{LoggingNotifier, StatusChange, StatusChangeNotifier};
use crate::observability::{OperationTimer, SyncMetrics};
use crate::shipment::{Shipment, ShipmentId, ShipmentStatus};
use crate::storage::ShipmentStore;
use crate::telemetry::{create_sync_span, generate_correlation_id};

// Conditional writes lost in a row before the call fails as transient.
const MAX_WRITE_ROUNDS: u32 = 5;

/// What happened to the stored workflow run id during a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunIdUpdate {
    Unchanged,
    /// The record had no run id yet.
    Stamped,
    /// The record pointed at a different run.
    Reconciled { previous: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAck {
    /// The status was changed and persisted in one write.
    Applied {
        shipment: Shipment,
        previous: ShipmentStatus,
        run_id: RunIdUpdate,
    },
    /// The record already had the target status; nothing was written.
    AlreadyApplied {
        shipment_id: ShipmentId,
        status: ShipmentStatus,
    },
}

impl SyncAck {
    pub fn shipment_id(&self) -> ShipmentId {
        match self {
            SyncAck::Applied { shipment, .. } => shipment.id,
            SyncAck::AlreadyApplied { shipment_id, .. } => *shipment_id,
        }
    }

    pub fn status(&self) -> ShipmentStatus {
        match self {
            SyncAck::Applied { shipment, .. } => shipment.status,
            SyncAck::AlreadyApplied { status, .. } => *status,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, SyncAck::Applied { .. })
    }
}

pub struct StatusSynchronizer {
    store: Arc<dyn ShipmentStore>,
    notifier: Arc<dyn StatusChangeNotifier>,
    metrics: Arc<SyncMetrics>,
    locks: RecordLocks,
    shipment_variable: String,
}

impl StatusSynchronizer {
    pub fn new(store: Arc<dyn ShipmentStore>) -> Self {
        Self {
            store,
            notifier: Arc::new(LoggingNotifier),
            metrics: Arc::new(SyncMetrics::new()),
            locks: RecordLocks::new(),
            shipment_variable: WorkflowConfig::default().shipment_variable,
        }
    }

    pub fn from_config(store: Arc<dyn ShipmentStore>, config: &WorkflowConfig) -> Self {
        Self::new(store).with_shipment_variable(config.shipment_variable.clone())
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn StatusChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_shipment_variable(mut self, name: impl Into<String>) -> Self {
        self.shipment_variable = name.into();
        self
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Apply the status a workflow step maps to, at most once.
    ///
    /// Failures are logged and counted with their class before being returned.
    pub async fn synchronize(&self, notification: &StepNotification) -> Result<SyncAck, SyncError> {
        let correlation_id = generate_correlation_id();
        let span = create_sync_span(
            &notification.step_identifier,
            &notification.run_id,
            notification.execution_id.as_deref(),
            &correlation_id,
        );

        async {
            let timer = OperationTimer::new("synchronize");
            let result = self.apply(notification).await;
            timer.finish();

            if let Err(err) = &result {
                err.log();
                self.metrics.record_failure(err.class());
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn apply(&self, notification: &StepNotification) -> Result<SyncAck, SyncError> {
        let step_id = notification.step_identifier.as_str();
        let run_id = notification.run_id.as_str();

        let target = step_map::target_status(step_id).ok_or_else(|| SyncError::UnknownStep {
            step_id: step_id.to_string(),
            run_id: run_id.to_string(),
        })?;

        let shipment_id = shipment_id_from(&notification.variables, &self.shipment_variable)
            .map_err(|err| match err {
                CoercionError::Missing => SyncError::MissingVariable {
                    variable: self.shipment_variable.clone(),
                    step_id: step_id.to_string(),
                    run_id: run_id.to_string(),
                },
                CoercionError::InvalidType { found } => SyncError::InvalidVariableType {
                    variable: self.shipment_variable.clone(),
                    found,
                    step_id: step_id.to_string(),
                    run_id: run_id.to_string(),
                },
            })?;
        tracing::Span::current().record("shipment.id", shipment_id.value());

        let _record = self.locks.acquire(shipment_id).await;

        for round in 1..=MAX_WRITE_ROUNDS {
            let shipment = self
                .store
                .find_by_id(shipment_id)
                .await
                .map_err(|e| SyncError::storage("find_by_id", Some(shipment_id), e))?
                .ok_or_else(|| SyncError::RecordNotFound {
                    shipment_id,
                    step_id: step_id.to_string(),
                    run_id: run_id.to_string(),
                })?;

            if shipment.status == target {
                info!(
                    shipment_id = %shipment_id,
                    status = %target,
                    "Shipment already in target status, skipping update"
                );
                self.metrics.record_idempotent_skip();
                return Ok(SyncAck::AlreadyApplied {
                    shipment_id,
                    status: target,
                });
            }

            if let Some(ack) = self.write_transition(shipment, target, run_id).await? {
                return Ok(ack);
            }
            debug!(round, shipment_id = %shipment_id, "Lost conditional write, re-reading");
        }

        Err(SyncError::storage(
            "save_if_status",
            Some(shipment_id),
            StorageError::Contended {
                shipment_id,
                attempts: MAX_WRITE_ROUNDS,
            },
        ))
    }

    /// Persist one transition conditioned on the status just read.
    ///
    /// `None` when another writer moved the record in between.
    async fn write_transition(
        &self,
        mut shipment: Shipment,
        target: ShipmentStatus,
        run_id: &str,
    ) -> Result<Option<SyncAck>, SyncError> {
        let shipment_id = shipment.id;
        let previous = shipment.status;

        let run_update = match shipment.workflow_run_id.as_deref() {
            Some(current) if current == run_id => RunIdUpdate::Unchanged,
            Some(current) => RunIdUpdate::Reconciled {
                previous: current.to_string(),
            },
            None => RunIdUpdate::Stamped,
        };

        shipment.status = target;
        shipment.workflow_run_id = Some(run_id.to_string());
        shipment.updated_at = Utc::now();

        let Some(saved) = self
            .store
            .save_if_status(shipment, previous)
            .await
            .map_err(|e| SyncError::storage("save_if_status", Some(shipment_id), e))?
        else {
            return Ok(None);
        };

        if !target.is_forward_of(previous) {
            warn!(
                shipment_id = %shipment_id,
                from = %previous,
                to = %target,
                "Applied out-of-order transition requested by workflow"
            );
        }
        if let RunIdUpdate::Reconciled { previous: stale } = &run_update {
            info!(
                shipment_id = %shipment_id,
                stale_run_id = %stale,
                run_id = %run_id,
                "Reconciled workflow run id"
            );
        }

        self.metrics
            .record_transition(matches!(run_update, RunIdUpdate::Reconciled { .. }));
        info!(
            shipment_id = %shipment_id,
            from = %previous,
            to = %target,
            "Shipment status updated"
        );

        let change = StatusChange {
            shipment: saved.clone(),
            previous,
        };
        if let Err(e) = self.notifier.status_changed(&change).await {
            warn!(shipment_id = %shipment_id, "Status change notification failed: {:#}", e);
        } else {
            debug!(shipment_id = %shipment_id, "Status change notification dispatched");
        }

        Ok(Some(SyncAck::Applied {
            shipment: saved,
            previous,
            run_id: run_update,
        }))
    }
}
