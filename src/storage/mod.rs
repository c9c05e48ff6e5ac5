/// Durable shipment storage abstraction
///
/// The synchronizer, allocator and registrar only talk to storage through
/// [`ShipmentStore`], so tests can swap in [`InMemoryShipmentStore`] or a
/// `mockall`-generated `MockShipmentStore`.
///
/// # Testing with Mocks
///
/// ```rust,ignore
/// let mut store = MockShipmentStore::new();
/// store
///     .expect_exists_by_tracking_id()
///     .times(10)
///     .returning(|_| Ok(true));
/// ```
use async_trait::async_trait;

use crate::errors::StorageError;
use crate::shipment::{NewShipment, Shipment, ShipmentId, ShipmentStatus};

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use memory::InMemoryShipmentStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteShipmentStore;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Storage operations consumed by the synchronization core.
///
/// Implementations must make `save`, `save_if_status` and `insert` single
/// atomic writes. A shipment's tracking id never changes once inserted.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Load a shipment by its internal id
    async fn find_by_id(&self, id: ShipmentId) -> Result<Option<Shipment>, StorageError>;

    /// Check whether a tracking identifier is already taken
    async fn exists_by_tracking_id(&self, tracking_id: &str) -> Result<bool, StorageError>;

    /// Insert a new shipment, assigning its id
    ///
    /// Fails with [`StorageError::UniqueViolation`] if the tracking id was
    /// taken between the allocator's check and this commit.
    async fn insert(&self, shipment: NewShipment) -> Result<Shipment, StorageError>;

    /// Upsert every field of the shipment in one write
    ///
    /// Fails with [`StorageError::TrackingIdChanged`] if the record exists
    /// under a different tracking id.
    async fn save(&self, shipment: Shipment) -> Result<Shipment, StorageError>;

    /// Write status, run id and `updated_at` only if the stored status is
    /// still `expected`.
    ///
    /// `Ok(None)` means another writer got there first (or the record is
    /// gone) and nothing was written.
    async fn save_if_status(
        &self,
        shipment: Shipment,
        expected: ShipmentStatus,
    ) -> Result<Option<Shipment>, StorageError>;
}
