//! Hook fired after a status transition has been durably written.
//!
//! Delivery (e-mail, SMS, ...) lives outside this crate. The synchronizer only
//! tells a [`StatusChangeNotifier`] what changed, once per applied transition.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use tracing::info;

use crate::shipment::{Shipment, ShipmentStatus};

/// A transition that has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub shipment: Shipment,
    pub previous: ShipmentStatus,
}

impl StatusChange {
    pub fn notice(&self) -> StatusNotice {
        StatusNotice::for_status(self.shipment.status)
    }
}

/// Customer-facing copy for a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusNotice {
    pub subject: &'static str,
    pub headline: &'static str,
    /// Share of the forward path completed; `None` for cancellation.
    pub progress_percent: Option<u8>,
}

impl StatusNotice {
    pub fn for_status(status: ShipmentStatus) -> Self {
        let (subject, headline) = match status {
            ShipmentStatus::Pending => (
                "We have your shipment request",
                "Your shipment is awaiting confirmation.",
            ),
            ShipmentStatus::Received => (
                "Shipment received",
                "Your shipment has been received at our facility.",
            ),
            ShipmentStatus::LoadedStage1 => (
                "Shipment on its way",
                "Your shipment has been loaded for the first leg.",
            ),
            ShipmentStatus::AtTransferCenter => (
                "Shipment at transfer center",
                "Your shipment has arrived at a transfer center.",
            ),
            ShipmentStatus::LoadedStage2 => (
                "Shipment on its way",
                "Your shipment has been loaded for the second leg.",
            ),
            ShipmentStatus::AtDistributionHub => (
                "Shipment at distribution hub",
                "Your shipment has reached the distribution hub near you.",
            ),
            ShipmentStatus::OutForDelivery => (
                "Out for delivery",
                "Your shipment is out for delivery today.",
            ),
            ShipmentStatus::Delivered => ("Delivered", "Your shipment has been delivered."),
            ShipmentStatus::Cancelled => ("Shipment cancelled", "Your shipment has been cancelled."),
        };

        let last = ShipmentStatus::Delivered.ordinal().unwrap_or(1).max(1);
        let progress_percent = status
            .ordinal()
            .map(|ord| ((u16::from(ord) * 100) / u16::from(last)) as u8);

        Self {
            subject,
            headline,
            progress_percent,
        }
    }
}

#[async_trait]
pub trait StatusChangeNotifier: Send + Sync {
    async fn status_changed(&self, change: &StatusChange) -> anyhow::Result<()>;
}

/// Notifier that only logs the selected notice.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl StatusChangeNotifier for LoggingNotifier {
    async fn status_changed(&self, change: &StatusChange) -> anyhow::Result<()> {
        let notice = change.notice();
        info!(
            shipment_id = %change.shipment.id,
            tracking_id = %change.shipment.tracking_id,
            from = %change.previous,
            to = %change.shipment.status,
            subject = notice.subject,
            progress = ?notice.progress_percent,
            "Shipment status changed"
        );
        Ok(())
    }
}

/// Notifier that remembers every change; handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    changes: Mutex<Vec<StatusChange>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<StatusChange> {
        self.changes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl StatusChangeNotifier for RecordingNotifier {
    async fn status_changed(&self, change: &StatusChange) -> anyhow::Result<()> {
        self.changes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(change.clone());
        Ok(())
    }
}
