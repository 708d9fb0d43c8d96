// 2.0: ledger store. owns all monetary and custody state.
// model.rs holds the rows, catalog.rs the reference rows, store.rs the atomicity boundary.

mod catalog;
mod model;
mod store;

pub use catalog::{Metal, Product, ProductType, Vault, VaultStatus};
pub use model::{
    Destination, ItemStatus, NewPortfolioItem, NewTransaction, PortfolioItem, Shipment, ShipmentEvent,
    ShipmentStatus, Transaction, TransactionKind, TransactionStatus, Wallet, WalletError,
};
pub use store::{LedgerState, LedgerStore, LedgerTx, StoreError};
