use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use crate::errors::ErrorClass;

/// Counters for the synchronization core
#[derive(Debug, Default)]
pub struct SyncMetrics {
    pub transitions_applied: AtomicU64,
    pub idempotent_skips: AtomicU64,
    pub run_ids_reconciled: AtomicU64,
    pub allocations: AtomicU64,
    pub allocation_collisions: AtomicU64,
    pub fatal_definition_failures: AtomicU64,
    pub fatal_data_failures: AtomicU64,
    pub transient_failures: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transition(&self, reconciled_run: bool) {
        self.transitions_applied.fetch_add(1, Ordering::Relaxed);
        if reconciled_run {
            self.run_ids_reconciled.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_idempotent_skip(&self) {
        self.idempotent_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allocation(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collision(&self) {
        self.allocation_collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, class: ErrorClass) {
        let counter = match class {
            ErrorClass::FatalDefinition => &self.fatal_definition_failures,
            ErrorClass::FatalData => &self.fatal_data_failures,
            ErrorClass::TransientInfrastructure => &self.transient_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            transitions_applied: self.transitions_applied.load(Ordering::Relaxed),
            idempotent_skips: self.idempotent_skips.load(Ordering::Relaxed),
            run_ids_reconciled: self.run_ids_reconciled.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            allocation_collisions: self.allocation_collisions.load(Ordering::Relaxed),
            fatal_definition_failures: self.fatal_definition_failures.load(Ordering::Relaxed),
            fatal_data_failures: self.fatal_data_failures.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Sync metrics: applied={}, skipped={}, reconciled={}, allocations={}, collisions={}, fatal_definition={}, fatal_data={}, transient={}",
            stats.transitions_applied,
            stats.idempotent_skips,
            stats.run_ids_reconciled,
            stats.allocations,
            stats.allocation_collisions,
            stats.fatal_definition_failures,
            stats.fatal_data_failures,
            stats.transient_failures
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub transitions_applied: u64,
    pub idempotent_skips: u64,
    pub run_ids_reconciled: u64,
    pub allocations: u64,
    pub allocation_collisions: u64,
    pub fatal_definition_failures: u64,
    pub fatal_data_failures: u64,
    pub transient_failures: u64,
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}
