// Shipment Sync Library - workflow step to shipment status synchronization
// This exposes the core components for testing and integration

pub mod allocator;
pub mod config;
pub mod engine;
pub mod errors;
pub mod notify;
pub mod observability;
pub mod registration;
pub mod shipment;
pub mod storage;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use allocator::{AttemptBudget, TrackingIdAllocator, TrackingReservation};
pub use config::{config, init_config, ShipmentSyncConfig};
pub use engine::{EngineSignal, WorkflowStepHandler};
pub use errors::{ErrorClass, StorageError, SyncError};
pub use notify::{LoggingNotifier, StatusChange, StatusChangeNotifier, StatusNotice};
pub use observability::{OperationTimer, SyncMetrics, SyncStats};
pub use registration::ShipmentRegistrar;
pub use shipment::{NewShipment, Shipment, ShipmentId, ShipmentStatus, TrackingId};
pub use storage::{InMemoryShipmentStore, ShipmentStore};
pub use telemetry::{create_sync_span, generate_correlation_id, init_telemetry};
pub use workflows::{
    RunIdUpdate, StatusSynchronizer, StepNotification, SyncAck, VariableValue,
};
