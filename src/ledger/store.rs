//! Ledger store and its atomicity boundary.
//!
//! All monetary and custody state lives in [`LedgerState`]. The only way to
//! change it is [`LedgerStore::with_transaction`], which runs a closure against
//! a [`LedgerTx`] while holding the store lock. Every write made through the
//! transaction journals the prior row first; if the closure returns `Err`, a
//! write fails, or the closure panics, the journal is replayed backwards and
//! the store is left exactly as it was.

use super::catalog::{Metal, Product, ProductType, Vault, VaultStatus};
use super::model::{
    NewPortfolioItem, NewTransaction, PortfolioItem, Shipment, Transaction, TransactionStatus, Wallet,
};
use crate::types::{
    MetalId, Money, PortfolioItemId, ProductId, ShipmentEventId, ShipmentId, StageId, Timestamp,
    TransactionId, UserId, VaultId, Weight,
};
use crate::workflow;
use std::collections::{BTreeMap, HashSet};
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Check constraint violated: {0}")]
    CheckViolation(String),

    #[error("Row {0} not found")]
    MissingRow(String),

    #[error("Row {0} is immutable")]
    ImmutableRow(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, Clone, Copy, Default)]
struct Sequences {
    metal: u32,
    vault: u32,
    product: u64,
    item: u64,
    transaction: u64,
    shipment: u64,
    stage: u64,
    shipment_event: u64,
}

/// Snapshot of every table. Readable by anyone holding the lock, writable only through [`LedgerTx`].
#[derive(Debug, Default)]
pub struct LedgerState {
    wallets: BTreeMap<UserId, Wallet>,
    items: BTreeMap<PortfolioItemId, PortfolioItem>,
    transactions: BTreeMap<TransactionId, Transaction>,
    shipments: BTreeMap<ShipmentId, Shipment>,
    metals: BTreeMap<MetalId, Metal>,
    products: BTreeMap<ProductId, Product>,
    vaults: BTreeMap<VaultId, Vault>,
    seq: Sequences,
    // writes left before an injected failure. never journaled.
    fault_after: Option<usize>,
}

impl LedgerState {
    pub fn wallet(&self, user_id: UserId) -> Option<&Wallet> {
        self.wallets.get(&user_id)
    }

    pub fn item(&self, id: PortfolioItemId) -> Option<&PortfolioItem> {
        self.items.get(&id)
    }

    pub fn items_for_user(&self, user_id: UserId) -> Vec<&PortfolioItem> {
        self.items.values().filter(|i| i.user_id == user_id).collect()
    }

    pub fn items_in_shipment(&self, shipment_id: ShipmentId) -> Vec<&PortfolioItem> {
        self.items
            .values()
            .filter(|i| i.shipment_id == Some(shipment_id))
            .collect()
    }

    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    /// Newest first.
    pub fn transactions_for_user(&self, user_id: UserId) -> Vec<&Transaction> {
        let mut txs: Vec<&Transaction> = self
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .collect();
        txs.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        txs
    }

    /// Pending storage fee and tax rows, oldest first.
    pub fn pending_debts(&self, user_id: UserId) -> Vec<&Transaction> {
        let mut debts: Vec<&Transaction> = self
            .transactions
            .values()
            .filter(|t| t.user_id == user_id && t.kind.is_debt() && t.status == TransactionStatus::Pending)
            .collect();
        debts.sort_by_key(|t| (t.created_at, t.id));
        debts
    }

    pub fn shipment(&self, id: ShipmentId) -> Option<&Shipment> {
        self.shipments.get(&id)
    }

    pub fn shipments_for_user(&self, user_id: UserId) -> Vec<&Shipment> {
        self.shipments.values().filter(|s| s.user_id == user_id).collect()
    }

    pub fn shipment_by_tracking(&self, tracking_number: &str) -> Option<&Shipment> {
        self.shipments
            .values()
            .find(|s| s.tracking_number.as_deref() == Some(tracking_number))
    }

    pub fn metal(&self, id: MetalId) -> Option<&Metal> {
        self.metals.get(&id)
    }

    pub fn metal_by_symbol(&self, symbol: &str) -> Option<&Metal> {
        self.metals.values().find(|m| m.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn metals(&self) -> impl Iterator<Item = &Metal> {
        self.metals.values()
    }

    pub fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    pub fn vault(&self, id: VaultId) -> Option<&Vault> {
        self.vaults.get(&id)
    }

    /// Sum of every wallet balance.
    pub fn total_cash(&self) -> Money {
        self.wallets.values().map(|w| w.cash_balance).sum()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

enum Undo {
    Wallet(UserId, Option<Wallet>),
    Item(PortfolioItemId, Option<PortfolioItem>),
    Transaction(TransactionId, Option<Transaction>),
    Shipment(ShipmentId, Option<Shipment>),
    Metal(MetalId, Option<Metal>),
    Product(ProductId, Option<Product>),
    Vault(VaultId, Option<Vault>),
}

fn restore<K: Ord, V>(table: &mut BTreeMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(row) => {
            table.insert(key, row);
        }
        None => {
            table.remove(&key);
        }
    }
}

/// One open transaction. Reads go through `Deref` to [`LedgerState`]; writes are journaled.
pub struct LedgerTx<'a> {
    state: &'a mut LedgerState,
    journal: Vec<Undo>,
    seq_at_begin: Sequences,
    committed: bool,
}

impl<'a> Deref for LedgerTx<'a> {
    type Target = LedgerState;

    fn deref(&self) -> &LedgerState {
        self.state
    }
}

impl<'a> LedgerTx<'a> {
    fn begin(state: &'a mut LedgerState) -> Self {
        let seq_at_begin = state.seq;
        Self {
            state,
            journal: Vec::new(),
            seq_at_begin,
            committed: false,
        }
    }

    fn commit(mut self) -> usize {
        self.committed = true;
        self.journal.len()
    }

    fn rollback(&mut self) {
        let writes = self.journal.len();
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Wallet(k, v) => restore(&mut self.state.wallets, k, v),
                Undo::Item(k, v) => restore(&mut self.state.items, k, v),
                Undo::Transaction(k, v) => restore(&mut self.state.transactions, k, v),
                Undo::Shipment(k, v) => restore(&mut self.state.shipments, k, v),
                Undo::Metal(k, v) => restore(&mut self.state.metals, k, v),
                Undo::Product(k, v) => restore(&mut self.state.products, k, v),
                Undo::Vault(k, v) => restore(&mut self.state.vaults, k, v),
            }
        }
        self.state.seq = self.seq_at_begin;
        if writes > 0 {
            debug!(writes, "ledger transaction rolled back");
        }
    }

    fn charge_write(&mut self) -> Result<(), StoreError> {
        match self.state.fault_after {
            Some(0) => {
                self.state.fault_after = None;
                Err(StoreError::WriteFailed("injected storage fault".to_string()))
            }
            Some(n) => {
                self.state.fault_after = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn next_shipment_id(&mut self) -> ShipmentId {
        self.state.seq.shipment += 1;
        ShipmentId(self.state.seq.shipment)
    }

    pub fn next_stage_id(&mut self) -> StageId {
        self.state.seq.stage += 1;
        StageId(self.state.seq.stage)
    }

    pub fn next_shipment_event_id(&mut self) -> ShipmentEventId {
        self.state.seq.shipment_event += 1;
        ShipmentEventId(self.state.seq.shipment_event)
    }

    // wallets

    pub fn put_wallet(&mut self, wallet: Wallet) -> Result<(), StoreError> {
        if wallet.cash_balance.is_negative() {
            return Err(StoreError::CheckViolation(format!(
                "wallet of {} cannot hold a negative balance ({})",
                wallet.user_id, wallet.cash_balance
            )));
        }
        self.charge_write()?;
        let prior = self.state.wallets.insert(wallet.user_id, wallet.clone());
        self.journal.push(Undo::Wallet(wallet.user_id, prior));
        Ok(())
    }

    pub fn create_wallet(&mut self, user_id: UserId, now: Timestamp) -> Result<Wallet, StoreError> {
        if self.state.wallets.contains_key(&user_id) {
            return Err(StoreError::UniqueViolation(format!("wallet for {user_id} already exists")));
        }
        let wallet = Wallet::new(user_id, now);
        self.put_wallet(wallet.clone())?;
        Ok(wallet)
    }

    // holdings

    pub fn insert_item(&mut self, new: NewPortfolioItem, now: Timestamp) -> Result<PortfolioItem, StoreError> {
        self.state.seq.item += 1;
        let item = PortfolioItem {
            id: PortfolioItemId(self.state.seq.item),
            user_id: new.user_id,
            metal_id: new.metal_id,
            product_id: new.product_id,
            weight: new.weight,
            quantity: new.quantity,
            status: new.status,
            vault_id: new.vault_id,
            shipment_id: None,
            purchase_price: new.purchase_price,
            created_at: now,
        };
        Self::check_item(&item)?;
        self.charge_write()?;
        self.state.items.insert(item.id, item.clone());
        self.journal.push(Undo::Item(item.id, None));
        Ok(item)
    }

    pub fn put_item(&mut self, item: PortfolioItem) -> Result<(), StoreError> {
        if !self.state.items.contains_key(&item.id) {
            return Err(StoreError::MissingRow(item.id.to_string()));
        }
        Self::check_item(&item)?;
        self.charge_write()?;
        let prior = self.state.items.insert(item.id, item.clone());
        self.journal.push(Undo::Item(item.id, prior));
        Ok(())
    }

    pub fn delete_item(&mut self, id: PortfolioItemId) -> Result<PortfolioItem, StoreError> {
        if !self.state.items.contains_key(&id) {
            return Err(StoreError::MissingRow(id.to_string()));
        }
        self.charge_write()?;
        let removed = self
            .state
            .items
            .remove(&id)
            .ok_or_else(|| StoreError::MissingRow(id.to_string()))?;
        self.journal.push(Undo::Item(id, Some(removed.clone())));
        Ok(removed)
    }

    // zero-weight rows are deleted, never stored
    fn check_item(item: &PortfolioItem) -> Result<(), StoreError> {
        if item.weight.is_zero() {
            return Err(StoreError::CheckViolation(format!("{} has zero weight", item.id)));
        }
        if item.quantity == 0 {
            return Err(StoreError::CheckViolation(format!("{} has zero quantity", item.id)));
        }
        Ok(())
    }

    // transactions

    pub fn insert_transaction(&mut self, new: NewTransaction, now: Timestamp) -> Result<Transaction, StoreError> {
        self.state.seq.transaction += 1;
        let tx = Transaction {
            id: TransactionId(self.state.seq.transaction),
            user_id: new.user_id,
            kind: new.kind,
            metal_id: new.metal_id,
            amount: new.amount,
            price_per_unit: new.price_per_unit,
            total_value: new.total_value,
            fees: new.fees,
            status: new.status,
            created_at: now,
        };
        self.charge_write()?;
        self.state.transactions.insert(tx.id, tx.clone());
        self.journal.push(Undo::Transaction(tx.id, None));
        Ok(tx)
    }

    /// The one permitted mutation of a transaction row: Pending to Completed or Failed.
    pub fn finalize_transaction(
        &mut self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError> {
        let current = self
            .state
            .transactions
            .get(&id)
            .ok_or_else(|| StoreError::MissingRow(id.to_string()))?;

        if current.status.is_terminal() || !status.is_terminal() {
            return Err(StoreError::ImmutableRow(format!(
                "{id} cannot move from {:?} to {:?}",
                current.status, status
            )));
        }

        let mut updated = current.clone();
        updated.status = status;
        self.charge_write()?;
        let prior = self.state.transactions.insert(id, updated.clone());
        self.journal.push(Undo::Transaction(id, prior));
        Ok(updated)
    }

    // shipments

    pub fn insert_shipment(&mut self, shipment: Shipment) -> Result<(), StoreError> {
        if self.state.shipments.contains_key(&shipment.id) {
            return Err(StoreError::UniqueViolation(format!("{} already exists", shipment.id)));
        }
        self.check_shipment(&shipment)?;
        self.charge_write()?;
        self.journal.push(Undo::Shipment(shipment.id, None));
        self.state.shipments.insert(shipment.id, shipment);
        Ok(())
    }

    pub fn put_shipment(&mut self, shipment: Shipment) -> Result<(), StoreError> {
        let current = self
            .state
            .shipments
            .get(&shipment.id)
            .ok_or_else(|| StoreError::MissingRow(shipment.id.to_string()))?;

        // stage layout is fixed at creation
        let layout = |s: &Shipment| -> Vec<(StageId, u32)> {
            s.stages.iter().map(|st| (st.id, st.stage_order)).collect()
        };
        if layout(current) != layout(&shipment) {
            return Err(StoreError::ImmutableRow(format!("{} stage order", shipment.id)));
        }

        // history is append-only
        if shipment.events.len() < current.events.len()
            || shipment.events[..current.events.len()] != current.events[..]
        {
            return Err(StoreError::ImmutableRow(format!("{} event history", shipment.id)));
        }

        self.check_shipment(&shipment)?;
        self.charge_write()?;
        let prior = self.state.shipments.insert(shipment.id, shipment.clone());
        self.journal.push(Undo::Shipment(shipment.id, prior));
        Ok(())
    }

    fn check_shipment(&self, shipment: &Shipment) -> Result<(), StoreError> {
        let mut orders = HashSet::new();
        let mut codes = HashSet::new();
        for stage in &shipment.stages {
            if !orders.insert(stage.stage_order) {
                return Err(StoreError::UniqueViolation(format!(
                    "{} stage_order {}",
                    shipment.id, stage.stage_order
                )));
            }
            if !codes.insert(stage.code) {
                return Err(StoreError::UniqueViolation(format!("{} stage code {}", shipment.id, stage.code)));
            }
        }
        workflow::validate(&shipment.stages)
            .map_err(|e| StoreError::CheckViolation(format!("{}: {e}", shipment.id)))?;

        if let Some(tracking) = shipment.tracking_number.as_deref() {
            let taken = self
                .state
                .shipments
                .values()
                .any(|s| s.id != shipment.id && s.tracking_number.as_deref() == Some(tracking));
            if taken {
                return Err(StoreError::UniqueViolation(format!(
                    "tracking number {tracking} is already assigned to another shipment"
                )));
            }
        }
        Ok(())
    }

    // catalog

    pub fn insert_metal(&mut self, name: &str, symbol: &str) -> Result<Metal, StoreError> {
        if self.state.metal_by_symbol(symbol).is_some() {
            return Err(StoreError::UniqueViolation(format!("metal symbol {symbol}")));
        }
        self.state.seq.metal += 1;
        let metal = Metal {
            id: MetalId(self.state.seq.metal),
            name: name.to_string(),
            symbol: symbol.to_ascii_uppercase(),
        };
        self.charge_write()?;
        self.state.metals.insert(metal.id, metal.clone());
        self.journal.push(Undo::Metal(metal.id, None));
        Ok(metal)
    }

    pub fn insert_product(
        &mut self,
        metal_id: MetalId,
        name: &str,
        manufacturer: &str,
        product_type: ProductType,
        weight_per_unit: Weight,
        premium_per_unit: Money,
    ) -> Result<Product, StoreError> {
        if !self.state.metals.contains_key(&metal_id) {
            return Err(StoreError::MissingRow(metal_id.to_string()));
        }
        if weight_per_unit.is_zero() {
            return Err(StoreError::CheckViolation(format!("product {name} has zero weight")));
        }
        self.state.seq.product += 1;
        let product = Product {
            id: ProductId(self.state.seq.product),
            metal_id,
            name: name.to_string(),
            manufacturer: manufacturer.to_string(),
            product_type,
            weight_per_unit,
            premium_per_unit,
            is_active: true,
        };
        self.charge_write()?;
        self.state.products.insert(product.id, product.clone());
        self.journal.push(Undo::Product(product.id, None));
        Ok(product)
    }

    pub fn put_product(&mut self, product: Product) -> Result<(), StoreError> {
        if !self.state.products.contains_key(&product.id) {
            return Err(StoreError::MissingRow(product.id.to_string()));
        }
        self.charge_write()?;
        let prior = self.state.products.insert(product.id, product.clone());
        self.journal.push(Undo::Product(product.id, prior));
        Ok(())
    }

    pub fn insert_vault(&mut self, name: &str, city: &str, country: &str) -> Result<Vault, StoreError> {
        self.state.seq.vault += 1;
        let vault = Vault {
            id: VaultId(self.state.seq.vault),
            name: name.to_string(),
            city: city.to_string(),
            country: country.to_string(),
            status: VaultStatus::Active,
        };
        self.charge_write()?;
        self.state.vaults.insert(vault.id, vault.clone());
        self.journal.push(Undo::Vault(vault.id, None));
        Ok(vault)
    }

    pub fn put_vault(&mut self, vault: Vault) -> Result<(), StoreError> {
        if !self.state.vaults.contains_key(&vault.id) {
            return Err(StoreError::MissingRow(vault.id.to_string()));
        }
        self.charge_write()?;
        let prior = self.state.vaults.insert(vault.id, vault.clone());
        self.journal.push(Undo::Vault(vault.id, prior));
        Ok(())
    }
}

impl Drop for LedgerTx<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

/// Shared, durable-for-the-process ledger. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct LedgerStore {
    inner: Mutex<LedgerState>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // a panicking writer already rolled back in LedgerTx::drop, so the state is consistent
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("ledger lock poisoned by a panicked transaction, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `op` as one all-or-nothing unit.
    ///
    /// The lock is held for the whole closure, so a guard check and the writes
    /// that depend on it can never interleave with another transaction. On
    /// `Err` every write made by `op` is undone before the lock is released.
    pub fn with_transaction<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&mut LedgerTx<'_>) -> Result<T, E>,
    {
        let mut guard = self.lock();
        let mut tx = LedgerTx::begin(&mut guard);
        match op(&mut tx) {
            Ok(value) => {
                let writes = tx.commit();
                debug!(writes, "ledger transaction committed");
                Ok(value)
            }
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }

    /// Consistent read under the lock.
    pub fn read<T>(&self, f: impl FnOnce(&LedgerState) -> T) -> T {
        let guard = self.lock();
        f(&guard)
    }

    /// Make the write after the next `after_writes` successful writes fail. Test hook for rollback.
    pub fn inject_write_failure(&self, after_writes: usize) {
        self.lock().fault_after = Some(after_writes);
    }

    pub fn clear_write_failure(&self) {
        self.lock().fault_after = None;
    }
}
