// Workflow step -> shipment status lookup.
// Every step that reaches the synchronizer is expected to be listed here; a miss
// means the deployed workflow definition and this table have drifted apart.

use crate::shipment::ShipmentStatus;

pub const STEP_RECEIVED: &str = "task_UpdateStatusReceived";
pub const STEP_LOADED_STAGE_1: &str = "task_UpdateStatusLoadedStage1";
pub const STEP_AT_TRANSFER_CENTER: &str = "task_UpdateStatusAtTransferCenter";
pub const STEP_LOADED_STAGE_2: &str = "task_UpdateStatusLoadedStage2";
pub const STEP_AT_DISTRIBUTION_HUB: &str = "task_UpdateStatusAtDistributionHub";
pub const STEP_OUT_FOR_DELIVERY: &str = "task_UpdateStatusOutForDelivery";
pub const STEP_DELIVERED: &str = "task_UpdateStatusDelivered";
pub const STEP_CANCELLED: &str = "task_UpdateStatusCancelled";

/// All mapped steps in forward order.
pub const STEP_STATUS_TABLE: [(&str, ShipmentStatus); 8] = [
    (STEP_RECEIVED, ShipmentStatus::Received),
    (STEP_LOADED_STAGE_1, ShipmentStatus::LoadedStage1),
    (STEP_AT_TRANSFER_CENTER, ShipmentStatus::AtTransferCenter),
    (STEP_LOADED_STAGE_2, ShipmentStatus::LoadedStage2),
    (STEP_AT_DISTRIBUTION_HUB, ShipmentStatus::AtDistributionHub),
    (STEP_OUT_FOR_DELIVERY, ShipmentStatus::OutForDelivery),
    (STEP_DELIVERED, ShipmentStatus::Delivered),
    (STEP_CANCELLED, ShipmentStatus::Cancelled),
];

/// Resolve the status a workflow step moves a shipment into.
pub fn target_status(step_id: &str) -> Option<ShipmentStatus> {
    STEP_STATUS_TABLE
        .iter()
        .find(|(step, _)| *step == step_id)
        .map(|(_, status)| *status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_known_steps_resolve() {
        assert_eq!(target_status(STEP_RECEIVED), Some(ShipmentStatus::Received));
        assert_eq!(target_status(STEP_DELIVERED), Some(ShipmentStatus::Delivered));
        assert_eq!(target_status(STEP_CANCELLED), Some(ShipmentStatus::Cancelled));
    }

    #[test]
    fn test_unknown_and_near_miss_steps_are_absent() {
        assert_eq!(target_status("no_such_step"), None);
        assert_eq!(target_status(""), None);
        assert_eq!(target_status("task_updatestatusreceived"), None);
        assert_eq!(target_status(" task_UpdateStatusReceived"), None);
    }

    #[test]
    fn test_every_status_but_pending_has_exactly_one_step() {
        let targets: Vec<_> = STEP_STATUS_TABLE.iter().map(|(_, s)| *s).collect();
        let unique: HashSet<_> = targets.iter().copied().collect();
        assert_eq!(unique.len(), targets.len());

        for status in ShipmentStatus::ALL {
            let mapped = unique.contains(&status);
            assert_eq!(mapped, status != ShipmentStatus::Pending, "{status}");
        }
    }
}
