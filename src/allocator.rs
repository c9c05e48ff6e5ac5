//! Tracking identifier allocation.
//!
//! Candidates look like `<yyyyMMddHHmmss><random suffix>`, e.g.
//! `20240101123045712`. A candidate is accepted once storage says it is free
//! and no other caller in this process holds it. The store's uniqueness
//! constraint remains the backstop across processes; see
//! [`crate::registration`] for the commit-time retry.

use chrono::{DateTime, Local};
use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::AllocatorConfig;
use crate::errors::SyncError;
use crate::observability::SyncMetrics;
use crate::shipment::TrackingId;
use crate::storage::ShipmentStore;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;
type Reserved = Arc<Mutex<HashSet<String>>>;

/// An allocated identifier, held back from other callers in this process
/// until dropped.
pub struct TrackingReservation {
    id: TrackingId,
    reserved: Reserved,
}

impl TrackingReservation {
    pub fn tracking_id(&self) -> &TrackingId {
        &self.id
    }

    pub fn as_str(&self) -> &str {
        self.id.as_str()
    }

    /// Release the reservation and keep the identifier.
    ///
    /// From here on nothing in this process stops another allocation from
    /// returning the same identifier, so call this only once the record is
    /// inserted. Until then hold the reservation and borrow through
    /// [`tracking_id`](Self::tracking_id).
    #[must_use]
    pub fn into_tracking_id(self) -> TrackingId {
        self.id.clone()
    }
}

impl Drop for TrackingReservation {
    fn drop(&mut self) {
        self.reserved
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(self.id.as_str());
    }
}

impl fmt::Debug for TrackingReservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TrackingReservation").field(&self.id).finish()
    }
}

/// Candidates left for one allocation, shared across retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptBudget {
    limit: u32,
    used: u32,
}

impl AttemptBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    /// Spend one attempt, returning its 1-based number.
    pub fn charge(&mut self) -> Option<u32> {
        if self.used >= self.limit {
            return None;
        }
        self.used += 1;
        Some(self.used)
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.limit - self.used
    }

    pub fn exhausted(&self) -> SyncError {
        SyncError::IdentifierSpaceExhausted {
            attempts: self.used,
        }
    }
}

pub struct TrackingIdAllocator {
    store: Arc<dyn ShipmentStore>,
    max_attempts: u32,
    suffix_digits: u32,
    reserved: Reserved,
    metrics: Arc<SyncMetrics>,
    clock: Clock,
}

impl TrackingIdAllocator {
    pub fn new(store: Arc<dyn ShipmentStore>, config: &AllocatorConfig) -> Self {
        Self {
            store,
            max_attempts: config.max_attempts.max(1),
            suffix_digits: config.suffix_digits.clamp(1, 9),
            reserved: Arc::new(Mutex::new(HashSet::new())),
            metrics: Arc::new(SyncMetrics::new()),
            clock: Arc::new(Local::now),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the wall clock used for the timestamp prefix.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Local> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Budget of `max_attempts` candidates, for callers that retry on top
    /// of allocation and must stay within the same bound.
    pub fn budget(&self) -> AttemptBudget {
        AttemptBudget::new(self.max_attempts)
    }

    /// Find a tracking identifier that is free right now.
    ///
    /// Gives up with `IdentifierSpaceExhausted` after `max_attempts`
    /// candidates; a storage failure aborts immediately as `StorageUnavailable`.
    pub async fn allocate(&self) -> Result<TrackingReservation, SyncError> {
        self.allocate_within(&mut self.budget()).await
    }

    /// Like [`allocate`](Self::allocate), drawing candidates from a shared budget.
    ///
    /// Every candidate tried is charged, whether it turns out free or not.
    pub async fn allocate_within(
        &self,
        budget: &mut AttemptBudget,
    ) -> Result<TrackingReservation, SyncError> {
        while let Some(attempt) = budget.charge() {
            let candidate = self.candidate();

            let Some(reservation) = self.reserve(&candidate) else {
                debug!(attempt, candidate = %candidate, "Candidate held by a concurrent allocation");
                self.metrics.record_collision();
                continue;
            };

            let taken = self
                .store
                .exists_by_tracking_id(&candidate)
                .await
                .map_err(|e| SyncError::storage("exists_by_tracking_id", None, e))?;

            if taken {
                debug!(attempt, candidate = %candidate, "Candidate already in use");
                self.metrics.record_collision();
                continue;
            }

            self.metrics.record_allocation();
            debug!(attempt, tracking_id = %candidate, "Allocated tracking identifier");
            return Ok(reservation);
        }

        warn!(
            attempts = budget.used(),
            suffix_digits = self.suffix_digits,
            "Tracking identifier allocation exhausted"
        );
        Err(budget.exhausted())
    }

    fn candidate(&self) -> String {
        let prefix = (self.clock)().format(TIMESTAMP_FORMAT);
        let bound = 10u32.pow(self.suffix_digits);
        let suffix = rand::rng().random_range(0..bound);
        format!(
            "{prefix}{suffix:0width$}",
            width = self.suffix_digits as usize
        )
    }

    fn reserve(&self, candidate: &str) -> Option<TrackingReservation> {
        let mut reserved = self.reserved.lock().unwrap_or_else(|p| p.into_inner());
        if !reserved.insert(candidate.to_string()) {
            return None;
        }
        Some(TrackingReservation {
            id: TrackingId::new(candidate),
            reserved: self.reserved.clone(),
        })
    }

    /// Identifiers currently handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.reserved.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorClass, StorageError};
    use crate::storage::MockShipmentStore;
    use chrono::TimeZone;

    fn fixed_clock() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 1, 12, 30, 45).unwrap()
    }

    fn config(max_attempts: u32, suffix_digits: u32) -> AllocatorConfig {
        AllocatorConfig {
            max_attempts,
            suffix_digits,
        }
    }

    #[tokio::test]
    async fn test_candidate_shape() {
        let mut store = MockShipmentStore::new();
        store.expect_exists_by_tracking_id().returning(|_| Ok(false));

        let allocator =
            TrackingIdAllocator::new(Arc::new(store), &config(10, 3)).with_clock(fixed_clock);
        let id = allocator.allocate().await.unwrap().into_tracking_id();

        assert_eq!(id.as_str().len(), 17);
        assert!(id.as_str().starts_with("20240101123045"));
        assert!(id.as_str().chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_bounded_retry_when_every_candidate_is_taken() {
        let mut store = MockShipmentStore::new();
        store
            .expect_exists_by_tracking_id()
            .times(10)
            .returning(|_| Ok(true));

        let allocator = TrackingIdAllocator::new(Arc::new(store), &config(10, 3));
        let err = allocator.allocate().await.unwrap_err();

        assert!(matches!(err, SyncError::IdentifierSpaceExhausted { attempts: 10 }));
        assert_eq!(err.class(), ErrorClass::TransientInfrastructure);
        assert_eq!(allocator.outstanding(), 0);
        assert_eq!(allocator.metrics().get_stats().allocation_collisions, 10);
    }

    #[tokio::test]
    async fn test_retries_until_free_candidate() {
        let mut store = MockShipmentStore::new();
        let mut calls = 0;
        store
            .expect_exists_by_tracking_id()
            .times(3)
            .returning(move |_| {
                calls += 1;
                Ok(calls < 3)
            });

        let allocator = TrackingIdAllocator::new(Arc::new(store), &config(10, 3));
        let reservation = allocator.allocate().await.unwrap();

        assert_eq!(allocator.outstanding(), 1);
        drop(reservation);
        assert_eq!(allocator.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_allocation() {
        let mut store = MockShipmentStore::new();
        store
            .expect_exists_by_tracking_id()
            .times(1)
            .returning(|_| Err(StorageError::unavailable("connection refused")));

        let allocator = TrackingIdAllocator::new(Arc::new(store), &config(10, 3));
        let err = allocator.allocate().await.unwrap_err();

        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");
        assert_eq!(allocator.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_held_reservation_is_never_handed_out_twice() {
        let mut store = MockShipmentStore::new();
        store.expect_exists_by_tracking_id().returning(|_| Ok(false));

        // one-digit suffix and a frozen clock leave ten possible identifiers
        let allocator =
            TrackingIdAllocator::new(Arc::new(store), &config(200, 1)).with_clock(fixed_clock);

        let mut held = Vec::new();
        for _ in 0..10 {
            held.push(allocator.allocate().await.unwrap());
        }
        let distinct: HashSet<_> = held.iter().map(|r| r.as_str().to_string()).collect();
        assert_eq!(distinct.len(), 10);

        let err = allocator.allocate().await.unwrap_err();
        assert!(matches!(err, SyncError::IdentifierSpaceExhausted { attempts: 200 }));
    }

    #[tokio::test]
    async fn test_shared_budget_is_not_refilled_between_calls() {
        let mut store = MockShipmentStore::new();
        let mut checks = 0;
        store
            .expect_exists_by_tracking_id()
            .times(5)
            .returning(move |_| {
                checks += 1;
                Ok(checks != 2)
            });

        let allocator = TrackingIdAllocator::new(Arc::new(store), &config(5, 3));
        let mut budget = allocator.budget();

        let first = allocator.allocate_within(&mut budget).await.unwrap();
        assert_eq!(budget.used(), 2);
        assert_eq!(budget.remaining(), 3);

        let err = allocator.allocate_within(&mut budget).await.unwrap_err();
        assert!(matches!(err, SyncError::IdentifierSpaceExhausted { attempts: 5 }));
        assert_eq!(budget.charge(), None);
        drop(first);
    }

    #[tokio::test]
    async fn test_into_tracking_id_ends_the_reservation() {
        let mut store = MockShipmentStore::new();
        store.expect_exists_by_tracking_id().returning(|_| Ok(false));

        let allocator = TrackingIdAllocator::new(Arc::new(store), &config(10, 3));
        let reservation = allocator.allocate().await.unwrap();
        assert_eq!(allocator.outstanding(), 1);

        let id = reservation.into_tracking_id();
        assert_eq!(allocator.outstanding(), 0);
        assert_eq!(id.as_str().len(), 17);
    }
}
