// 8.4 engine/delivery.rs: turning vaulted holdings into a shipment, and the customer side
// of the shipment workflow.

use super::core::Engine;
use super::results::{DeliveryQuote, DeliveryResult, EngineError, StageProgress, WorkflowView};
use crate::events::{EventPayload, ShipmentRequestedEvent, StageCompletedEvent};
use crate::ledger::{
    Destination, ItemStatus, NewTransaction, PortfolioItem, Shipment, ShipmentEvent, ShipmentStatus,
    TransactionKind,
};
use crate::types::{Money, PortfolioItemId, Price, ShipmentId, UserId, Weight};
use crate::workflow::{self, StageCode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

const REQUEST_RECEIVED: &str = "Physical delivery request received and processing initiated.";
const CUSTOMER_PORTAL: &str = "Customer Portal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLine {
    pub item_id: PortfolioItemId,
    // checked against the holding; the whole holding ships
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub items: Vec<DeliveryLine>,
    pub carrier: String,
    pub destination: Destination,
}

impl Engine {
    pub fn request_delivery(&self, user_id: UserId, request: DeliveryRequest) -> Result<DeliveryResult, EngineError> {
        let result = self.try_request_delivery(user_id, request);
        self.finish("request_delivery", user_id, result)
    }

    fn validate_request(&self, request: &DeliveryRequest) -> Result<String, EngineError> {
        if request.items.is_empty() {
            return Err(EngineError::InvalidRequest("At least one item is required".to_string()));
        }
        let max = self.config.delivery.max_items_per_request;
        if request.items.len() > max {
            return Err(EngineError::InvalidRequest(format!(
                "A delivery request can carry at most {max} items"
            )));
        }

        let mut seen = HashSet::new();
        for line in &request.items {
            if !seen.insert(line.item_id) {
                return Err(EngineError::InvalidRequest(format!(
                    "Portfolio item {} is listed more than once",
                    line.item_id
                )));
            }
            if line.quantity == 0 {
                return Err(EngineError::InvalidRequest(format!(
                    "Quantity for item {} must be at least 1",
                    line.item_id
                )));
            }
        }

        let carrier = request.carrier.trim().to_ascii_lowercase();
        if carrier.is_empty() {
            return Err(EngineError::InvalidRequest("Carrier is required".to_string()));
        }
        if let Some(field) = request.destination.missing_field() {
            return Err(EngineError::InvalidRequest(format!("Destination {field} is required")));
        }
        Ok(carrier)
    }

    /// Fees for shipping `items` with `carrier` at the given prices.
    pub(super) fn quote_delivery(&self, items: &[(PortfolioItem, Price)], carrier: &str) -> DeliveryQuote {
        let fees = &self.config.fees;
        let aggregate_value: Money = items
            .iter()
            .map(|(item, price)| item.weight.value_at(*price))
            .sum::<Money>()
            .round_cents();
        let total_weight: Weight = items.iter().map(|(item, _)| item.weight).sum();

        let handling_fee = fees.handling_fee(items.len()).round_cents();
        let shipping_fee = fees.shipping_fee(carrier).round_cents();
        let insurance_fee = fees.insurance().of(aggregate_value).round_cents();

        DeliveryQuote {
            handling_fee,
            shipping_fee,
            insurance_fee,
            total_fees: handling_fee.add(shipping_fee).add(insurance_fee),
            aggregate_value,
            total_weight,
        }
    }

    fn try_request_delivery(&self, user_id: UserId, request: DeliveryRequest) -> Result<DeliveryResult, EngineError> {
        let carrier = self.validate_request(&request)?;

        // read phase: every line must name a vaulted holding of the caller
        let lines: Vec<(PortfolioItem, String)> = self.ledger.read(|s| {
            request
                .items
                .iter()
                .map(|line| {
                    let item = s
                        .item(line.item_id)
                        .filter(|i| i.owned_by(user_id))
                        .ok_or_else(|| {
                            EngineError::InvalidRequest(format!("Portfolio item {} not found", line.item_id))
                        })?;
                    if !item.is_vaulted() {
                        return Err(EngineError::InvalidRequest(format!(
                            "Portfolio item {} is not in the vault",
                            line.item_id
                        )));
                    }
                    if line.quantity > item.quantity {
                        return Err(EngineError::InvalidRequest(format!(
                            "Insufficient quantity for item {}",
                            line.item_id
                        )));
                    }
                    let symbol = s
                        .metal(item.metal_id)
                        .map(|m| m.symbol.clone())
                        .ok_or_else(|| EngineError::Internal(format!("{} references missing {}", item.id, item.metal_id)))?;
                    Ok((item.clone(), symbol))
                })
                .collect::<Result<Vec<_>, EngineError>>()
        })?;

        let mut prices: HashMap<String, Price> = HashMap::new();
        let mut priced = Vec::with_capacity(lines.len());
        for (item, symbol) in lines {
            let price = match prices.get(&symbol) {
                Some(p) => *p,
                None => {
                    let p = self.oracle.current_price(&symbol)?;
                    prices.insert(symbol, p);
                    p
                }
            };
            priced.push((item, price));
        }

        let quote = self.quote_delivery(&priced, &carrier);
        let primary_metal = priced[0].0.metal_id;
        let now = self.now();
        let origin = self.config.delivery.origin_location.clone();

        let (transaction, shipment, new_balance) = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut wallet = tx
                .wallet(user_id)
                .cloned()
                .ok_or_else(|| EngineError::InvalidRequest("Wallet not found".to_string()))?;

            // a concurrent request or sale may have touched an item since it was priced
            let mut claimed = Vec::with_capacity(priced.len());
            for (priced_item, _) in &priced {
                let current = tx
                    .item(priced_item.id)
                    .filter(|i| i.owned_by(user_id) && i.is_vaulted())
                    .cloned()
                    .ok_or_else(|| {
                        EngineError::Conflict(format!(
                            "Portfolio item {} is no longer available for delivery",
                            priced_item.id
                        ))
                    })?;
                if current.weight != priced_item.weight || current.quantity != priced_item.quantity {
                    return Err(EngineError::Conflict(format!(
                        "Portfolio item {} changed while the delivery was being priced",
                        priced_item.id
                    )));
                }
                claimed.push(current);
            }

            wallet.debit(quote.total_fees, now)?;
            tx.put_wallet(wallet.clone())?;

            let shipment_id = tx.next_shipment_id();
            let stages = workflow::initial_stages(|| tx.next_stage_id());
            let first_event = ShipmentEvent {
                id: tx.next_shipment_event_id(),
                status: ShipmentStatus::Requested,
                description: REQUEST_RECEIVED.to_string(),
                location: Some(origin.clone()),
                timestamp: now,
            };
            let shipment = Shipment {
                id: shipment_id,
                user_id,
                carrier: carrier.clone(),
                status: ShipmentStatus::Requested,
                destination: request.destination.clone(),
                tracking_number: None,
                stages,
                events: vec![first_event],
                created_at: now,
                updated_at: now,
            };
            tx.insert_shipment(shipment.clone())?;

            for mut item in claimed {
                item.status = ItemStatus::InTransit;
                item.shipment_id = Some(shipment_id);
                tx.put_item(item)?;
            }

            let transaction = tx.insert_transaction(
                NewTransaction::cash(
                    user_id,
                    TransactionKind::Withdrawal,
                    quote.aggregate_value.add(quote.total_fees),
                )
                .with_metal(primary_metal, quote.total_weight, None)
                .with_fees(quote.total_fees),
                now,
            )?;

            Ok((transaction, shipment, wallet.cash_balance))
        })?;

        info!(
            user = %user_id,
            shipment = %shipment.id,
            items = priced.len(),
            carrier = %shipment.carrier,
            fees = %quote.total_fees,
            "delivery requested"
        );
        self.emit(EventPayload::ShipmentRequested(ShipmentRequestedEvent {
            user_id,
            shipment_id: shipment.id,
            item_count: priced.len(),
            total_fees: quote.total_fees,
        }));
        self.emit_completed(&transaction, new_balance);

        Ok(DeliveryResult {
            transaction,
            shipment,
            fees: quote,
            new_balance,
        })
    }

    /// Ordered stages and the one in progress, if any.
    pub fn workflow(&self, user_id: UserId, shipment_id: ShipmentId) -> Result<WorkflowView, EngineError> {
        let shipment = self.shipment(user_id, shipment_id)?;
        let active = workflow::active_stage(&shipment.stages).cloned();
        Ok(WorkflowView {
            shipment_id,
            stages: shipment.stages,
            active,
        })
    }

    /// Customer finishes the active stage (address check, paperwork) with a note.
    pub fn complete_stage_action(
        &self,
        user_id: UserId,
        shipment_id: ShipmentId,
        action_note: &str,
    ) -> Result<StageProgress, EngineError> {
        let result = self.try_complete_stage_action(user_id, shipment_id, action_note);
        self.finish("complete_stage_action", user_id, result)
    }

    fn try_complete_stage_action(
        &self,
        user_id: UserId,
        shipment_id: ShipmentId,
        action_note: &str,
    ) -> Result<StageProgress, EngineError> {
        let now = self.now();

        let (shipment, completed, activated) = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut shipment = tx
                .shipment(shipment_id)
                .filter(|s| s.owned_by(user_id))
                .cloned()
                .ok_or_else(|| EngineError::not_found("shipment", shipment_id))?;

            let advance = workflow::complete_customer_action(&mut shipment.stages, action_note, now)?;
            let stage_name = stage_name(&shipment, advance.completed);
            let note = action_note.trim();

            shipment.events.push(ShipmentEvent {
                id: tx.next_shipment_event_id(),
                status: shipment.status,
                description: format!("Customer completed stage '{stage_name}': {note}"),
                location: Some(CUSTOMER_PORTAL.to_string()),
                timestamp: now,
            });
            shipment.updated_at = now;
            tx.put_shipment(shipment.clone())?;

            Ok((shipment, advance.completed, advance.activated))
        })?;

        info!(
            user = %user_id,
            shipment = %shipment_id,
            stage = %completed,
            next = ?activated,
            "customer completed stage"
        );
        self.emit(EventPayload::StageCompleted(StageCompletedEvent {
            user_id,
            shipment_id,
            stage: completed,
            by_customer: true,
            activated,
        }));

        Ok(StageProgress {
            shipment,
            completed,
            activated,
        })
    }
}

pub(super) fn stage_name(shipment: &Shipment, code: StageCode) -> String {
    shipment
        .stages
        .iter()
        .find(|s| s.code == code)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| code.display_name().to_string())
}
