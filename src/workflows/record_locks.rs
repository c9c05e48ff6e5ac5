// Per-shipment mutual exclusion for the synchronizer's read-modify-write.
// Different shipments never contend; entries are dropped once nobody holds or waits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::shipment::ShipmentId;

type Slot = Arc<AsyncMutex<()>>;

#[derive(Debug, Default, Clone)]
pub struct RecordLocks {
    slots: Arc<Mutex<HashMap<ShipmentId, Slot>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder exists for `id`.
    pub async fn acquire(&self, id: ShipmentId) -> RecordGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            slots.entry(id).or_default().clone()
        };
        let guard = slot.clone().lock_owned().await;
        RecordGuard {
            id,
            slots: self.slots.clone(),
            slot,
            _guard: guard,
        }
    }

    /// Number of shipments currently locked or awaited.
    pub fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

pub struct RecordGuard {
    id: ShipmentId,
    slots: Arc<Mutex<HashMap<ShipmentId, Slot>>>,
    slot: Slot,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        // map + this guard's slot + the owned guard's own reference
        if Arc::strong_count(&self.slot) <= 3 {
            slots.remove(&self.id);
        }
    }
}
