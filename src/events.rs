// 11.0: every committed state change produces an event. handed to the Notifier after commit
// for email and audit side effects. the EventPayload enum lists all event types.
// delivery is best-effort: a notifier failure never touches the ledger.

use crate::ledger::{ShipmentStatus, TransactionKind};
use crate::types::{Money, ShipmentId, Timestamp, TransactionId, UserId};
use crate::workflow::StageCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.payload {
            EventPayload::TransactionCompleted(_) => "transaction_completed",
            EventPayload::DebtsSettled(_) => "debts_settled",
            EventPayload::ShipmentRequested(_) => "shipment_requested",
            EventPayload::ShipmentStatusChanged(_) => "shipment_status_changed",
            EventPayload::StageCompleted(_) => "stage_completed",
            EventPayload::StageBlocked(_) => "stage_blocked",
            EventPayload::StageUnblocked(_) => "stage_unblocked",
            EventPayload::CarrierAssigned(_) => "carrier_assigned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    // Money events
    TransactionCompleted(TransactionCompletedEvent),
    DebtsSettled(DebtsSettledEvent),

    // Delivery events
    ShipmentRequested(ShipmentRequestedEvent),
    ShipmentStatusChanged(ShipmentStatusChangedEvent),
    StageCompleted(StageCompletedEvent),
    StageBlocked(StageBlockedEvent),
    StageUnblocked(StageUnblockedEvent),
    CarrierAssigned(CarrierAssignedEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCompletedEvent {
    pub user_id: UserId,
    pub transaction_id: TransactionId,
    pub kind: TransactionKind,
    pub total_value: Money,
    pub fees: Money,
    pub new_balance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtsSettledEvent {
    pub user_id: UserId,
    pub settled_count: usize,
    pub total_paid: Money,
    pub receipt_id: TransactionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRequestedEvent {
    pub user_id: UserId,
    pub shipment_id: ShipmentId,
    pub item_count: usize,
    pub total_fees: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentStatusChangedEvent {
    pub user_id: UserId,
    pub shipment_id: ShipmentId,
    pub old_status: ShipmentStatus,
    pub new_status: ShipmentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCompletedEvent {
    pub user_id: UserId,
    pub shipment_id: ShipmentId,
    pub stage: StageCode,
    pub by_customer: bool,
    pub activated: Option<StageCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBlockedEvent {
    pub shipment_id: ShipmentId,
    pub stage: StageCode,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageUnblockedEvent {
    pub shipment_id: ShipmentId,
    pub stage: StageCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierAssignedEvent {
    pub shipment_id: ShipmentId,
    pub carrier: String,
    pub tracking_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Fire-and-forget sink for committed events.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &Event) -> Result<(), NotifyError>;
}

/// Keeps every event in memory. used by tests and the simulation binary.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<Event>>,
    failing: AtomicBool,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    // every notify call fails while set. nothing is recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Notifier for EventCollector {
    fn notify(&self, event: &Event) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("collector switched off".to_string()));
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Writes each event to the tracing log. default sink when nothing else is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &Event) -> Result<(), NotifyError> {
        info!(event_id = event.id.0, kind = event.kind(), payload = ?event.payload, "notify");
        Ok(())
    }
}
