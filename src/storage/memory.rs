use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::ShipmentStore;
use crate::errors::StorageError;
use crate::shipment::{NewShipment, Shipment, ShipmentId, ShipmentStatus};

#[derive(Debug, Default)]
struct Tables {
    shipments: BTreeMap<ShipmentId, Shipment>,
    tracking_ids: HashSet<String>,
    last_id: i64,
}

/// Process-local store with the same uniqueness rules as the SQL schema.
///
/// Keeps a count of successful writes and can be switched unavailable to
/// simulate an outage.
#[derive(Debug, Default)]
pub struct InMemoryShipmentStore {
    tables: RwLock<Tables>,
    writes: AtomicU64,
    unavailable: AtomicBool,
}

impl InMemoryShipmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes that actually changed a record.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Seed a record directly, bypassing the write counter.
    pub async fn seed(&self, shipment: Shipment) {
        let mut tables = self.tables.write().await;
        tables.last_id = tables.last_id.max(shipment.id.value());
        tables
            .tracking_ids
            .insert(shipment.tracking_id.as_str().to_string());
        tables.shipments.insert(shipment.id, shipment);
    }

    /// Reserve a tracking id as if another process had committed it.
    pub async fn occupy_tracking_id(&self, tracking_id: &str) {
        self.tables
            .write()
            .await
            .tracking_ids
            .insert(tracking_id.to_string());
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.shipments.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("in-memory store switched off"));
        }
        Ok(())
    }
}

#[async_trait]
impl ShipmentStore for InMemoryShipmentStore {
    async fn find_by_id(&self, id: ShipmentId) -> Result<Option<Shipment>, StorageError> {
        self.check_available()?;
        Ok(self.tables.read().await.shipments.get(&id).cloned())
    }

    async fn exists_by_tracking_id(&self, tracking_id: &str) -> Result<bool, StorageError> {
        self.check_available()?;
        Ok(self.tables.read().await.tracking_ids.contains(tracking_id))
    }

    async fn insert(&self, shipment: NewShipment) -> Result<Shipment, StorageError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        if !tables
            .tracking_ids
            .insert(shipment.tracking_id.as_str().to_string())
        {
            return Err(StorageError::UniqueViolation {
                constraint: "shipments.tracking_id".to_string(),
            });
        }

        tables.last_id += 1;
        let id = ShipmentId(tables.last_id);
        let stored = shipment.into_shipment(id);
        tables.shipments.insert(id, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(shipment_id = %id, tracking_id = %stored.tracking_id, "Inserted shipment");
        Ok(stored)
    }

    async fn save(&self, shipment: Shipment) -> Result<Shipment, StorageError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        let tracking = shipment.tracking_id.as_str().to_string();
        match tables.shipments.get(&shipment.id) {
            Some(existing) => keep_tracking_id(existing, &shipment)?,
            None if tables.tracking_ids.contains(&tracking) => {
                return Err(StorageError::UniqueViolation {
                    constraint: "shipments.tracking_id".to_string(),
                });
            }
            None => {}
        }

        tables.tracking_ids.insert(tracking);
        tables.last_id = tables.last_id.max(shipment.id.value());
        tables.shipments.insert(shipment.id, shipment.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(shipment_id = %shipment.id, status = %shipment.status, "Saved shipment");
        Ok(shipment)
    }

    async fn save_if_status(
        &self,
        shipment: Shipment,
        expected: ShipmentStatus,
    ) -> Result<Option<Shipment>, StorageError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        let Some(stored) = tables.shipments.get_mut(&shipment.id) else {
            return Ok(None);
        };
        keep_tracking_id(stored, &shipment)?;
        if stored.status != expected {
            debug!(
                shipment_id = %shipment.id,
                expected = %expected,
                found = %stored.status,
                "Conditional save skipped, status moved"
            );
            return Ok(None);
        }

        stored.status = shipment.status;
        stored.workflow_run_id = shipment.workflow_run_id;
        stored.updated_at = shipment.updated_at;
        let saved = stored.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(shipment_id = %saved.id, status = %saved.status, "Saved shipment");
        Ok(Some(saved))
    }
}

fn keep_tracking_id(stored: &Shipment, requested: &Shipment) -> Result<(), StorageError> {
    if stored.tracking_id != requested.tracking_id {
        return Err(StorageError::TrackingIdChanged {
            shipment_id: stored.id,
            stored: stored.tracking_id.to_string(),
            requested: requested.tracking_id.to_string(),
        });
    }
    Ok(())
}
