//! Ledger rows: wallets, holdings, transactions, shipments.
//!
//! Wallets hold cash and only the engine mutates them. Transactions are
//! append-only; the single permitted change is Pending to a terminal status.

use crate::types::{
    MetalId, Money, PortfolioItemId, Price, ProductId, ShipmentEventId, ShipmentId, Timestamp,
    TransactionId, UserId, VaultId, Weight,
};
use crate::workflow::WorkflowStage;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub cash_balance: Money,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Wallet {
    pub fn new(user_id: UserId, timestamp: Timestamp) -> Self {
        Self {
            user_id,
            cash_balance: Money::zero(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn credit(&mut self, amount: Money, timestamp: Timestamp) {
        self.cash_balance = self.cash_balance.add(amount);
        self.updated_at = timestamp;
    }

    pub fn debit(&mut self, amount: Money, timestamp: Timestamp) -> Result<(), WalletError> {
        if amount.value() > self.cash_balance.value() {
            return Err(WalletError::InsufficientBalance {
                requested: amount,
                available: self.cash_balance,
            });
        }
        self.cash_balance = self.cash_balance.sub(amount);
        self.updated_at = timestamp;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Money, available: Money },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Vaulted,
    InTransit,
    Delivered,
}

/// A discrete holding. owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub id: PortfolioItemId,
    pub user_id: UserId,
    pub metal_id: MetalId,
    pub product_id: Option<ProductId>,
    pub weight: Weight,
    pub quantity: u32,
    pub status: ItemStatus,
    pub vault_id: Option<VaultId>,
    pub shipment_id: Option<ShipmentId>,
    pub purchase_price: Price,
    pub created_at: Timestamp,
}

impl PortfolioItem {
    pub fn is_vaulted(&self) -> bool {
        self.status == ItemStatus::Vaulted
    }

    pub fn owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}

/// Everything needed to create a holding; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewPortfolioItem {
    pub user_id: UserId,
    pub metal_id: MetalId,
    pub product_id: Option<ProductId>,
    pub weight: Weight,
    pub quantity: u32,
    pub status: ItemStatus,
    pub vault_id: Option<VaultId>,
    pub purchase_price: Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Buy,
    Sell,
    Convert,
    Deposit,
    Withdrawal,
    StorageFee,
    Tax,
}

impl TransactionKind {
    // storage fees and taxes accrue as pending rows until the customer settles them
    pub fn is_debt(&self) -> bool {
        matches!(self, TransactionKind::StorageFee | TransactionKind::Tax)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Buy => "buy",
            TransactionKind::Sell => "sell",
            TransactionKind::Convert => "convert",
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::StorageFee => "storage_fee",
            TransactionKind::Tax => "tax",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub metal_id: Option<MetalId>,
    pub amount: Option<Weight>,
    pub price_per_unit: Option<Price>,
    pub total_value: Money,
    pub fees: Money,
    pub status: TransactionStatus,
    pub created_at: Timestamp,
}

impl Transaction {
    /// What the customer owes (or paid) in total for this row.
    pub fn amount_due(&self) -> Money {
        self.total_value.add(self.fees)
    }
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub metal_id: Option<MetalId>,
    pub amount: Option<Weight>,
    pub price_per_unit: Option<Price>,
    pub total_value: Money,
    pub fees: Money,
    pub status: TransactionStatus,
}

impl NewTransaction {
    /// A completed cash movement with no metal leg.
    pub fn cash(user_id: UserId, kind: TransactionKind, total_value: Money) -> Self {
        Self {
            user_id,
            kind,
            metal_id: None,
            amount: None,
            price_per_unit: None,
            total_value,
            fees: Money::zero(),
            status: TransactionStatus::Completed,
        }
    }

    pub fn with_metal(mut self, metal_id: MetalId, amount: Weight, price_per_unit: Option<Price>) -> Self {
        self.metal_id = Some(metal_id);
        self.amount = Some(amount);
        self.price_per_unit = price_per_unit;
        self
    }

    pub fn with_fees(mut self, fees: Money) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Requested,
    Preparing,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    Failed,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 7] = [
        ShipmentStatus::Requested,
        ShipmentStatus::Preparing,
        ShipmentStatus::Shipped,
        ShipmentStatus::InTransit,
        ShipmentStatus::OutForDelivery,
        ShipmentStatus::Delivered,
        ShipmentStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Requested => "requested",
            ShipmentStatus::Preparing => "preparing",
            ShipmentStatus::Shipped => "shipped",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::OutForDelivery => "out_for_delivery",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Failed => "failed",
        }
    }

    pub fn parse(status: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == status)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentStatus::Delivered | ShipmentStatus::Failed)
    }

    // statuses during which the metal has physically left the vault
    pub fn is_moving(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Shipped | ShipmentStatus::InTransit | ShipmentStatus::OutForDelivery
        )
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address copied at request time. later address book edits never reach an in-flight shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub recipient: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

impl Destination {
    /// Name of the first required field that is blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("recipient", &self.recipient),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentEvent {
    pub id: ShipmentEventId,
    pub status: ShipmentStatus,
    pub description: String,
    pub location: Option<String>,
    pub timestamp: Timestamp,
}

/// Shipment aggregate: the row plus its ordered stages and append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub user_id: UserId,
    pub carrier: String,
    pub status: ShipmentStatus,
    pub destination: Destination,
    pub tracking_number: Option<String>,
    pub stages: Vec<WorkflowStage>,
    pub events: Vec<ShipmentEvent>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Shipment {
    pub fn owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn wallet_credit_debit() {
        let mut wallet = Wallet::new(UserId(1), Timestamp::from_millis(0));
        wallet.credit(Money::new(dec!(1000)), Timestamp::from_millis(1));
        wallet.debit(Money::new(dec!(300)), Timestamp::from_millis(2)).unwrap();
        assert_eq!(wallet.cash_balance.value(), dec!(700));
        assert_eq!(wallet.updated_at, Timestamp::from_millis(2));
    }

    #[test]
    fn wallet_refuses_overdraft() {
        let mut wallet = Wallet::new(UserId(1), Timestamp::from_millis(0));
        wallet.credit(Money::new(dec!(1000)), Timestamp::from_millis(1));

        let err = wallet.debit(Money::new(dec!(1200)), Timestamp::from_millis(2)).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientBalance { .. }));
        assert_eq!(wallet.cash_balance.value(), dec!(1000));
    }

    #[test]
    fn debt_kinds() {
        assert!(TransactionKind::StorageFee.is_debt());
        assert!(TransactionKind::Tax.is_debt());
        assert!(!TransactionKind::Withdrawal.is_debt());
    }

    #[test]
    fn shipment_status_text() {
        for status in ShipmentStatus::ALL {
            assert_eq!(ShipmentStatus::parse(status.as_str()), Some(status));
        }
        assert!(ShipmentStatus::Delivered.is_terminal());
        assert!(ShipmentStatus::OutForDelivery.is_moving());
        assert!(!ShipmentStatus::Preparing.is_moving());
    }

    #[test]
    fn destination_reports_blank_field() {
        let mut dest = Destination {
            recipient: "Ada".into(),
            line1: "1 Bullion Row".into(),
            line2: None,
            city: "London".into(),
            region: None,
            postal_code: "EC2R 8AH".into(),
            country: "GB".into(),
        };
        assert_eq!(dest.missing_field(), None);

        dest.city = "  ".into();
        assert_eq!(dest.missing_field(), Some("city"));
    }
}
