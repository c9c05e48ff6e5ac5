//! Shipment records and the closed status enumeration they move through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Internal numeric identity of a shipment. Assigned by the store, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentId(pub i64);

impl ShipmentId {
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ShipmentId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Human-facing tracking identifier, e.g. `20240101123045712`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(String);

impl TrackingId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shipment status. Declaration order is the expected forward progression;
/// `Cancelled` is an absorbing side state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    Received,
    #[serde(rename = "LOADED_STAGE_1")]
    LoadedStage1,
    AtTransferCenter,
    #[serde(rename = "LOADED_STAGE_2")]
    LoadedStage2,
    AtDistributionHub,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 9] = [
        ShipmentStatus::Pending,
        ShipmentStatus::Received,
        ShipmentStatus::LoadedStage1,
        ShipmentStatus::AtTransferCenter,
        ShipmentStatus::LoadedStage2,
        ShipmentStatus::AtDistributionHub,
        ShipmentStatus::OutForDelivery,
        ShipmentStatus::Delivered,
        ShipmentStatus::Cancelled,
    ];

    /// Position on the forward path. `Cancelled` sits off the path and has none.
    pub fn ordinal(self) -> Option<u8> {
        match self {
            ShipmentStatus::Pending => Some(0),
            ShipmentStatus::Received => Some(1),
            ShipmentStatus::LoadedStage1 => Some(2),
            ShipmentStatus::AtTransferCenter => Some(3),
            ShipmentStatus::LoadedStage2 => Some(4),
            ShipmentStatus::AtDistributionHub => Some(5),
            ShipmentStatus::OutForDelivery => Some(6),
            ShipmentStatus::Delivered => Some(7),
            ShipmentStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ShipmentStatus::Delivered | ShipmentStatus::Cancelled)
    }

    /// Whether moving from `from` to `self` follows the advisory order.
    ///
    /// Cancellation is forward of every non-terminal state. Nothing is
    /// forward of a terminal state.
    pub fn is_forward_of(self, from: ShipmentStatus) -> bool {
        if from.is_terminal() {
            return false;
        }
        match (from.ordinal(), self.ordinal()) {
            (_, None) => true,
            (Some(a), Some(b)) => b > a,
            (None, Some(_)) => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "PENDING",
            ShipmentStatus::Received => "RECEIVED",
            ShipmentStatus::LoadedStage1 => "LOADED_STAGE_1",
            ShipmentStatus::AtTransferCenter => "AT_TRANSFER_CENTER",
            ShipmentStatus::LoadedStage2 => "LOADED_STAGE_2",
            ShipmentStatus::AtDistributionHub => "AT_DISTRIBUTION_HUB",
            ShipmentStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            ShipmentStatus::Delivered => "DELIVERED",
            ShipmentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown shipment status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ShipmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShipmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// The durable record of one cargo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub tracking_id: TrackingId,
    pub status: ShipmentStatus,
    pub workflow_run_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A shipment about to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShipment {
    pub tracking_id: TrackingId,
    pub created_at: DateTime<Utc>,
}

impl NewShipment {
    pub fn new(tracking_id: TrackingId) -> Self {
        Self {
            tracking_id,
            created_at: Utc::now(),
        }
    }

    /// New shipments always start awaiting confirmation with no run stamped.
    pub fn into_shipment(self, id: ShipmentId) -> Shipment {
        Shipment {
            id,
            tracking_id: self.tracking_id,
            status: ShipmentStatus::Pending,
            workflow_run_id: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_its_string_form() {
        for status in ShipmentStatus::ALL {
            assert_eq!(status.as_str().parse::<ShipmentStatus>(), Ok(status));
        }
        assert!("SHIPPED".parse::<ShipmentStatus>().is_err());
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&ShipmentStatus::LoadedStage2).unwrap();
        assert_eq!(json, "\"LOADED_STAGE_2\"");
        let json = serde_json::to_string(&ShipmentStatus::AtDistributionHub).unwrap();
        assert_eq!(json, "\"AT_DISTRIBUTION_HUB\"");
    }

    #[test]
    fn test_forward_order() {
        assert!(ShipmentStatus::Received.is_forward_of(ShipmentStatus::Pending));
        assert!(ShipmentStatus::Delivered.is_forward_of(ShipmentStatus::Received));
        assert!(!ShipmentStatus::Received.is_forward_of(ShipmentStatus::OutForDelivery));
        assert!(ShipmentStatus::Cancelled.is_forward_of(ShipmentStatus::LoadedStage1));
        assert!(!ShipmentStatus::Cancelled.is_forward_of(ShipmentStatus::Delivered));
        assert!(!ShipmentStatus::Received.is_forward_of(ShipmentStatus::Cancelled));
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = ShipmentStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![ShipmentStatus::Delivered, ShipmentStatus::Cancelled]);
    }

    #[test]
    fn test_new_shipment_starts_pending_without_run() {
        let shipment = NewShipment::new(TrackingId::new("20240101123045712"))
            .into_shipment(ShipmentId(7));
        assert_eq!(shipment.status, ShipmentStatus::Pending);
        assert_eq!(shipment.workflow_run_id, None);
        assert_eq!(shipment.created_at, shipment.updated_at);
    }
}
