// 8.5 engine/admin.rs: operations the back office drives. stage blocking, coarse shipment
// status, carrier assignment, free-form history entries.
// callers are trusted admins; authorization happens before these are reached.

use super::core::Engine;
use super::delivery::stage_name;
use super::results::{EngineError, StageProgress};
use crate::events::{
    CarrierAssignedEvent, EventPayload, ShipmentStatusChangedEvent, StageBlockedEvent, StageCompletedEvent,
    StageUnblockedEvent,
};
use crate::ledger::{ItemStatus, LedgerTx, Shipment, ShipmentEvent, ShipmentStatus};
use crate::types::{ShipmentId, Timestamp};
use crate::workflow::{self, StageCode};
use tracing::info;

const ADMIN_UPDATE: &str = "Admin Update";
const ADMIN_ASSIGNMENT: &str = "Admin Assignment";

fn load(tx: &LedgerTx<'_>, shipment_id: ShipmentId) -> Result<Shipment, EngineError> {
    tx.shipment(shipment_id)
        .cloned()
        .ok_or_else(|| EngineError::not_found("shipment", shipment_id))
}

fn push_event(
    tx: &mut LedgerTx<'_>,
    shipment: &mut Shipment,
    description: String,
    location: Option<String>,
    now: Timestamp,
) {
    shipment.events.push(ShipmentEvent {
        id: tx.next_shipment_event_id(),
        status: shipment.status,
        description,
        location,
        timestamp: now,
    });
    shipment.updated_at = now;
}

impl Engine {
    pub fn block_stage(&self, shipment_id: ShipmentId, code: StageCode, reason: &str) -> Result<Shipment, EngineError> {
        let result = self.try_block_stage(shipment_id, code, reason);
        self.finish("block_stage", shipment_id, result)
    }

    fn try_block_stage(&self, shipment_id: ShipmentId, code: StageCode, reason: &str) -> Result<Shipment, EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::InvalidRequest("A reason is required to block a stage".to_string()));
        }
        let now = self.now();

        let shipment = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut shipment = load(tx, shipment_id)?;
            workflow::block_stage(&mut shipment.stages, code, reason, now)?;
            shipment.updated_at = now;
            tx.put_shipment(shipment.clone())?;
            Ok(shipment)
        })?;

        info!(shipment = %shipment_id, stage = %code, reason, "stage blocked");
        self.emit(EventPayload::StageBlocked(StageBlockedEvent {
            shipment_id,
            stage: code,
            reason: reason.to_string(),
        }));
        Ok(shipment)
    }

    pub fn unblock_stage(&self, shipment_id: ShipmentId, code: StageCode) -> Result<Shipment, EngineError> {
        let now = self.now();
        let result = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut shipment = load(tx, shipment_id)?;
            workflow::unblock_stage(&mut shipment.stages, code)?;
            shipment.updated_at = now;
            tx.put_shipment(shipment.clone())?;
            Ok(shipment)
        });

        if result.is_ok() {
            info!(shipment = %shipment_id, stage = %code, "stage unblocked");
            self.emit(EventPayload::StageUnblocked(StageUnblockedEvent {
                shipment_id,
                stage: code,
            }));
        }
        self.finish("unblock_stage", shipment_id, result)
    }

    /// Back office completes whatever stage is active, customer-action or not.
    pub fn admin_complete_stage(&self, shipment_id: ShipmentId) -> Result<StageProgress, EngineError> {
        let now = self.now();
        let result = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut shipment = load(tx, shipment_id)?;
            let advance = workflow::complete_active_stage(&mut shipment.stages, now)?;
            let name = stage_name(&shipment, advance.completed);
            push_event(
                tx,
                &mut shipment,
                format!("Stage '{name}' completed"),
                Some(ADMIN_UPDATE.to_string()),
                now,
            );
            tx.put_shipment(shipment.clone())?;
            Ok(StageProgress {
                shipment,
                completed: advance.completed,
                activated: advance.activated,
            })
        });

        if let Ok(progress) = &result {
            info!(shipment = %shipment_id, stage = %progress.completed, next = ?progress.activated, "stage completed by admin");
            self.emit(EventPayload::StageCompleted(StageCompletedEvent {
                user_id: progress.shipment.user_id,
                shipment_id,
                stage: progress.completed,
                by_customer: false,
                activated: progress.activated,
            }));
        }
        self.finish("admin_complete_stage", shipment_id, result)
    }

    /// Move the coarse shipment status. Delivered and Failed are final.
    pub fn update_shipment_status(
        &self,
        shipment_id: ShipmentId,
        status: ShipmentStatus,
        description: Option<&str>,
        location: Option<&str>,
    ) -> Result<Shipment, EngineError> {
        let result = self.try_update_status(shipment_id, status, description, location);
        self.finish("update_shipment_status", shipment_id, result)
    }

    fn try_update_status(
        &self,
        shipment_id: ShipmentId,
        status: ShipmentStatus,
        description: Option<&str>,
        location: Option<&str>,
    ) -> Result<Shipment, EngineError> {
        let now = self.now();

        let (shipment, old_status) = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut shipment = load(tx, shipment_id)?;
            let old_status = shipment.status;
            if old_status.is_terminal() {
                return Err(EngineError::InvalidRequest(format!(
                    "Shipment {shipment_id} is already {old_status} and cannot change status"
                )));
            }

            shipment.status = status;
            let description = description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Status updated from {old_status} to {status}"));
            let location = location
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or(ADMIN_UPDATE)
                .to_string();
            push_event(tx, &mut shipment, description, Some(location), now);
            tx.put_shipment(shipment.clone())?;

            // holdings follow the parcel
            let cascade = match status {
                ShipmentStatus::Delivered => Some(ItemStatus::Delivered),
                s if s.is_moving() => Some(ItemStatus::InTransit),
                _ => None,
            };
            if let Some(item_status) = cascade {
                let items: Vec<_> = tx.items_in_shipment(shipment_id).into_iter().cloned().collect();
                for mut item in items {
                    item.status = item_status;
                    tx.put_item(item)?;
                }
            }

            Ok((shipment, old_status))
        })?;

        info!(shipment = %shipment_id, from = %old_status, to = %status, "shipment status updated");
        self.emit(EventPayload::ShipmentStatusChanged(ShipmentStatusChangedEvent {
            user_id: shipment.user_id,
            shipment_id,
            old_status,
            new_status: status,
        }));
        Ok(shipment)
    }

    /// Tracking numbers are unique across all shipments; a duplicate is a Conflict.
    pub fn assign_carrier(
        &self,
        shipment_id: ShipmentId,
        carrier: &str,
        tracking_number: &str,
    ) -> Result<Shipment, EngineError> {
        let result = self.try_assign_carrier(shipment_id, carrier, tracking_number);
        self.finish("assign_carrier", shipment_id, result)
    }

    fn try_assign_carrier(&self, shipment_id: ShipmentId, carrier: &str, tracking_number: &str) -> Result<Shipment, EngineError> {
        let carrier = carrier.trim().to_ascii_lowercase();
        let tracking = tracking_number.trim().to_string();
        if carrier.is_empty() {
            return Err(EngineError::InvalidRequest("Carrier is required".to_string()));
        }
        if tracking.is_empty() {
            return Err(EngineError::InvalidRequest("Tracking number is required".to_string()));
        }
        let now = self.now();

        let shipment = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut shipment = load(tx, shipment_id)?;
            let taken = tx
                .shipment_by_tracking(&tracking)
                .is_some_and(|other| other.id != shipment_id);
            if taken {
                return Err(EngineError::Conflict(format!(
                    "Tracking number {tracking} is already assigned to another shipment"
                )));
            }

            shipment.carrier = carrier.clone();
            shipment.tracking_number = Some(tracking.clone());
            push_event(
                tx,
                &mut shipment,
                format!("Carrier assigned: {carrier}, Tracking: {tracking}"),
                Some(ADMIN_ASSIGNMENT.to_string()),
                now,
            );
            // the store enforces uniqueness too
            tx.put_shipment(shipment.clone())?;
            Ok(shipment)
        })?;

        info!(shipment = %shipment_id, %carrier, tracking = %tracking, "carrier assigned");
        self.emit(EventPayload::CarrierAssigned(CarrierAssignedEvent {
            shipment_id,
            carrier,
            tracking_number: tracking,
        }));
        Ok(shipment)
    }

    /// Free-form history entry. never changes status.
    pub fn add_event(
        &self,
        shipment_id: ShipmentId,
        description: &str,
        location: Option<&str>,
    ) -> Result<Shipment, EngineError> {
        let now = self.now();
        let description = description.trim();
        let result = if description.is_empty() {
            Err(EngineError::InvalidRequest("Description is required".to_string()))
        } else {
            self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
                let mut shipment = load(tx, shipment_id)?;
                let location = location.map(str::trim).filter(|l| !l.is_empty()).map(str::to_string);
                push_event(tx, &mut shipment, description.to_string(), location, now);
                tx.put_shipment(shipment.clone())?;
                Ok(shipment)
            })
        };
        self.finish("add_event", shipment_id, result)
    }
}
