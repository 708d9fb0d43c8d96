// 8.0.2: result types and errors for engine operations.

use crate::ledger::{PortfolioItem, Shipment, StoreError, Transaction, WalletError};
use crate::pricing::OracleError;
use crate::types::{Money, ShipmentId, Weight};
use crate::workflow::{StageCode, WorkflowError, WorkflowStage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyResult {
    pub transaction: Transaction,
    pub item: PortfolioItem,
    pub new_balance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleResult {
    pub transaction: Transaction,
    pub proceeds: Money,
    // None once the whole holding is gone
    pub remaining_item: Option<PortfolioItem>,
    pub new_balance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositResult {
    pub transaction: Transaction,
    pub new_balance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceAdjustment {
    pub transaction: Transaction,
    pub new_balance: Money,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebtSettlement {
    pub settled_count: usize,
    pub total_paid: Money,
    // None when there was nothing to settle
    pub receipt: Option<Transaction>,
    pub new_balance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtSummary {
    pub count: usize,
    pub total_due: Money,
    pub debts: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryQuote {
    pub handling_fee: Money,
    pub shipping_fee: Money,
    pub insurance_fee: Money,
    pub total_fees: Money,
    pub aggregate_value: Money,
    pub total_weight: Weight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub transaction: Transaction,
    pub shipment: Shipment,
    pub fees: DeliveryQuote,
    pub new_balance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowView {
    pub shipment_id: ShipmentId,
    pub stages: Vec<WorkflowStage>,
    pub active: Option<WorkflowStage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    pub shipment: Shipment,
    pub completed: StageCode,
    pub activated: Option<StageCode>,
}

/// Coarse error class. callers map this to their transport's status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    Forbidden,
    NotFound,
    InsufficientFunds,
    ServiceUnavailable,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidRequest | ErrorKind::InsufficientFunds => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
            ErrorKind::ServiceUnavailable => 503,
        }
    }

    // the engine never retries; this only tells the caller whether trying later can help
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ServiceUnavailable | ErrorKind::Internal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Money, available: Money },

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Conflict(String),

    // detail is for logs only, callers see an opaque message
    #[error("Internal error")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            EngineError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// How much more cash the caller needs. None for anything but InsufficientFunds.
    pub fn shortfall(&self) -> Option<Money> {
        match self {
            EngineError::InsufficientFunds { required, available } => Some(required.sub(*available)),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(msg) => EngineError::Conflict(msg),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<WalletError> for EngineError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientBalance { requested, available } => EngineError::InsufficientFunds {
                required: requested,
                available,
            },
        }
    }
}

impl From<WorkflowError> for EngineError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::StageNotFound(code) => EngineError::not_found("stage", code),
            WorkflowError::Corrupt(detail) => EngineError::Internal(detail),
            other => EngineError::InvalidRequest(other.to_string()),
        }
    }
}

impl From<OracleError> for EngineError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Unavailable(_) => {
                EngineError::ServiceUnavailable("Live prices are temporarily unavailable. Please try again later.".to_string())
            }
            // a listed metal with no price is a platform fault, not the caller's
            OracleError::UnknownSymbol(symbol) => EngineError::Internal(format!("no price for {symbol}")),
        }
    }
}
