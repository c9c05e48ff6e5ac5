// Shipment creation: allocate a tracking id, then insert a PENDING record.
// A uniqueness violation at commit means another process won the same
// candidate after our existence check; it is retried like any other collision
// and charged to the same attempt budget.

use std::sync::Arc;
use tracing::{info, warn, Instrument};

use crate::allocator::TrackingIdAllocator;
use crate::errors::SyncError;
use crate::shipment::{NewShipment, Shipment};
use crate::storage::ShipmentStore;
use crate::telemetry::{create_registration_span, generate_correlation_id};

pub struct ShipmentRegistrar {
    store: Arc<dyn ShipmentStore>,
    allocator: TrackingIdAllocator,
}

impl ShipmentRegistrar {
    pub fn new(store: Arc<dyn ShipmentStore>, allocator: TrackingIdAllocator) -> Self {
        Self { store, allocator }
    }

    pub fn allocator(&self) -> &TrackingIdAllocator {
        &self.allocator
    }

    /// Create a new shipment in `PENDING` with no workflow run.
    pub async fn register(&self) -> Result<Shipment, SyncError> {
        let span = create_registration_span(&generate_correlation_id());
        async {
            let result = self.insert_with_retry().await;
            if let Err(err) = &result {
                err.log();
                self.allocator.metrics().record_failure(err.class());
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn insert_with_retry(&self) -> Result<Shipment, SyncError> {
        // existence checks and commit-time collisions draw on one bound
        let mut budget = self.allocator.budget();

        loop {
            let reservation = self.allocator.allocate_within(&mut budget).await?;
            let new = NewShipment::new(reservation.tracking_id().clone());

            match self.store.insert(new).await {
                Ok(shipment) => {
                    tracing::Span::current().record("tracking.id", shipment.tracking_id.as_str());
                    info!(
                        shipment_id = %shipment.id,
                        tracking_id = %shipment.tracking_id,
                        attempts = budget.used(),
                        "Shipment registered"
                    );
                    return Ok(shipment);
                }
                Err(e) if e.is_unique_violation() => {
                    warn!(
                        attempt = budget.used(),
                        remaining = budget.remaining(),
                        tracking_id = %reservation.tracking_id(),
                        "Tracking id taken at commit, allocating another"
                    );
                    self.allocator.metrics().record_collision();
                }
                Err(e) => return Err(SyncError::storage("insert", None, e)),
            }
        }
    }
}
