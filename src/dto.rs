// 12.0 dto.rs: response shapes. built from rows the caller already loaded, never by
// re-querying the ledger per field.

use crate::engine::{EngineError, ErrorKind};
use crate::ledger::{
    ItemStatus, Metal, PortfolioItem, Shipment, ShipmentEvent, ShipmentStatus, Transaction, TransactionKind,
    TransactionStatus, Wallet,
};
use crate::types::{Money, Price, Timestamp, Weight};
use crate::workflow::{StageCode, StageStatus, WorkflowStage};
use serde::Serialize;

fn money(value: Money) -> String {
    format!("{:.2}", value.value())
}

fn ounces(value: Weight) -> String {
    format!("{:.4}", value.value())
}

fn price(value: Price) -> String {
    format!("{:.2}", value.value())
}

fn stamp(value: Timestamp) -> String {
    value.to_rfc3339()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletView {
    pub cash_balance: String,
    pub updated_at: String,
}

impl From<&Wallet> for WalletView {
    fn from(wallet: &Wallet) -> Self {
        Self {
            cash_balance: money(wallet.cash_balance),
            updated_at: stamp(wallet.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    pub id: u64,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub metal: Option<String>,
    pub amount: Option<String>,
    pub price_per_unit: Option<String>,
    pub total_value: String,
    pub fees: String,
    pub created_at: String,
}

impl TransactionView {
    /// `metal` is the row for `tx.metal_id`, if the caller has it.
    pub fn new(tx: &Transaction, metal: Option<&Metal>) -> Self {
        Self {
            id: tx.id.0,
            kind: tx.kind,
            status: tx.status,
            metal: metal.map(|m| m.symbol.clone()),
            amount: tx.amount.map(ounces),
            price_per_unit: tx.price_per_unit.map(price),
            total_value: money(tx.total_value),
            fees: money(tx.fees),
            created_at: stamp(tx.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioItemView {
    pub id: u64,
    pub metal: Option<String>,
    pub weight: String,
    pub quantity: u32,
    pub status: ItemStatus,
    pub purchase_price: String,
    pub shipment_id: Option<u64>,
}

impl PortfolioItemView {
    pub fn new(item: &PortfolioItem, metal: Option<&Metal>) -> Self {
        Self {
            id: item.id.0,
            metal: metal.map(|m| m.symbol.clone()),
            weight: ounces(item.weight),
            quantity: item.quantity,
            status: item.status,
            purchase_price: price(item.purchase_price),
            shipment_id: item.shipment_id.map(|s| s.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowStageView {
    pub code: StageCode,
    pub name: String,
    pub order: u32,
    pub status: StageStatus,
    pub requires_customer_action: bool,
    pub customer_action_completed: bool,
    pub customer_action_note: Option<String>,
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
    pub completed_at: Option<String>,
}

impl From<&WorkflowStage> for WorkflowStageView {
    fn from(stage: &WorkflowStage) -> Self {
        Self {
            code: stage.code,
            name: stage.name.clone(),
            order: stage.stage_order,
            status: stage.status,
            requires_customer_action: stage.requires_customer_action,
            customer_action_completed: stage.customer_action_completed,
            customer_action_note: stage.customer_action_note.clone(),
            is_blocked: stage.is_blocked,
            blocked_reason: stage.blocked_reason.clone(),
            completed_at: stage.completed_at.map(stamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipmentEventView {
    pub status: ShipmentStatus,
    pub description: String,
    pub location: Option<String>,
    pub timestamp: String,
}

impl From<&ShipmentEvent> for ShipmentEventView {
    fn from(event: &ShipmentEvent) -> Self {
        Self {
            status: event.status,
            description: event.description.clone(),
            location: event.location.clone(),
            timestamp: stamp(event.timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipmentView {
    pub id: u64,
    pub carrier: String,
    pub status: ShipmentStatus,
    pub tracking_number: Option<String>,
    pub destination: String,
    pub stages: Vec<WorkflowStageView>,
    pub events: Vec<ShipmentEventView>,
    pub created_at: String,
}

impl From<&Shipment> for ShipmentView {
    fn from(shipment: &Shipment) -> Self {
        let dest = &shipment.destination;
        Self {
            id: shipment.id.0,
            carrier: shipment.carrier.clone(),
            status: shipment.status,
            tracking_number: shipment.tracking_number.clone(),
            destination: format!("{}, {}, {} {}", dest.recipient, dest.city, dest.postal_code, dest.country),
            stages: shipment.stages.iter().map(WorkflowStageView::from).collect(),
            events: shipment.events.iter().map(ShipmentEventView::from).collect(),
            created_at: stamp(shipment.created_at),
        }
    }
}

/// Error body for transports. Internal details never leave the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<String>,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        let kind = err.kind();
        Self {
            kind,
            status: kind.status_code(),
            message: err.to_string(),
            shortfall: err.shortfall().map(money),
        }
    }
}
