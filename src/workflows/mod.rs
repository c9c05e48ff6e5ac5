// Workflow engine -> shipment record synchronization

pub mod notification;
pub mod record_locks;
pub mod step_map;
pub mod synchronizer;
pub mod variables;

pub use notification::StepNotification;
pub use record_locks::RecordLocks;
pub use step_map::{target_status, STEP_STATUS_TABLE};
pub use synchronizer::{RunIdUpdate, StatusSynchronizer, SyncAck};
pub use variables::{shipment_id_from, CoercionError, VariableValue};
