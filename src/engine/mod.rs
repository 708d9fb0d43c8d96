// 8.0: settlement engine and delivery orchestrator. every money or custody mutation
// runs inside one ledger transaction; notifications go out only after commit.

mod admin;
mod cash;
mod core;
mod delivery;
mod results;
mod trading;

#[cfg(test)]
pub(crate) mod testing;

pub use cash::parse_amount;
pub use core::{Collaborators, Engine};
pub use delivery::{DeliveryLine, DeliveryRequest};
pub use results::{
    BalanceAdjustment, BuyResult, DebtSettlement, DebtSummary, DeliveryQuote, DeliveryResult, DepositResult,
    EngineError, ErrorKind, SaleResult, StageProgress, WorkflowView,
};
pub use trading::{BuyRequest, DeliveryMethod};
