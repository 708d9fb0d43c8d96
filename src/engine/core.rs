// 8.0 engine/core.rs: main engine. holds the ledger and the collaborators every operation consults.

use super::results::EngineError;
use crate::config::EngineConfig;
use crate::events::{Event, EventId, EventPayload, LogNotifier, Notifier};
use crate::features::{Feature, FeatureGate, PlatformSettings};
use crate::identity::{CustomerDirectory, InMemoryDirectory, KycStatus};
use crate::ledger::{
    LedgerStore, LedgerTx, Metal, PortfolioItem, Product, ProductType, Shipment, Transaction, Vault,
    VaultStatus, Wallet,
};
use crate::pricing::{price_board, MetalQuote, PriceOracle};
use crate::types::{MetalId, Money, ProductId, ShipmentId, Timestamp, UserId, VaultId, Weight};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// External collaborators the engine is wired to.
pub struct Collaborators {
    pub oracle: Arc<dyn PriceOracle>,
    pub features: Arc<dyn FeatureGate>,
    pub directory: Arc<dyn CustomerDirectory>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    // everything open, nobody verified, events to the log
    pub fn with_oracle(oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            oracle,
            features: Arc::new(PlatformSettings::default()),
            directory: Arc::new(InMemoryDirectory::default()),
            notifier: Arc::new(LogNotifier),
        }
    }
}

// i64::MIN means "follow the wall clock"
const WALL_CLOCK: i64 = i64::MIN;

/** 8.1: main engine struct. shareable across threads; all mutable state is in the ledger */
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) ledger: Arc<LedgerStore>,
    pub(super) oracle: Arc<dyn PriceOracle>,
    pub(super) features: Arc<dyn FeatureGate>,
    pub(super) directory: Arc<dyn CustomerDirectory>,
    pub(super) notifier: Arc<dyn Notifier>,
    next_event_id: AtomicU64,
    pinned_time: AtomicI64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(config: EngineConfig, ledger: Arc<LedgerStore>, collaborators: Collaborators) -> Self {
        Self {
            config,
            ledger,
            oracle: collaborators.oracle,
            features: collaborators.features,
            directory: collaborators.directory,
            notifier: collaborators.notifier,
            next_event_id: AtomicU64::new(1),
            pinned_time: AtomicI64::new(WALL_CLOCK),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    // pins the clock. simulations and tests use this for reproducible timestamps.
    pub fn set_time(&self, timestamp: Timestamp) {
        self.pinned_time.store(timestamp.as_millis(), Ordering::SeqCst);
    }

    pub fn advance_time(&self, millis: i64) {
        let now = self.now();
        self.set_time(Timestamp::from_millis(now.as_millis() + millis));
    }

    pub fn time(&self) -> Timestamp {
        self.now()
    }

    pub(super) fn now(&self) -> Timestamp {
        match self.pinned_time.load(Ordering::SeqCst) {
            WALL_CLOCK => Timestamp::now(),
            ms => Timestamp::from_millis(ms),
        }
    }

    // catalog

    pub fn add_metal(&self, name: &str, symbol: &str) -> Result<Metal, EngineError> {
        let metal = self.ledger.with_transaction(|tx| tx.insert_metal(name, symbol))?;
        info!(metal = %metal.id, symbol = %metal.symbol, "metal listed");
        Ok(metal)
    }

    pub fn add_product(
        &self,
        metal_id: MetalId,
        name: &str,
        manufacturer: &str,
        product_type: ProductType,
        weight_per_unit: Weight,
        premium_per_unit: Money,
    ) -> Result<Product, EngineError> {
        let product = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            if tx.metal(metal_id).is_none() {
                return Err(EngineError::not_found("metal", metal_id));
            }
            Ok(tx.insert_product(metal_id, name, manufacturer, product_type, weight_per_unit, premium_per_unit)?)
        })?;
        info!(product = %product.id, name, "product listed");
        Ok(product)
    }

    pub fn set_product_active(&self, product_id: ProductId, active: bool) -> Result<Product, EngineError> {
        self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut product = tx
                .product(product_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("product", product_id))?;
            product.is_active = active;
            tx.put_product(product.clone())?;
            Ok(product)
        })
    }

    pub fn add_vault(&self, name: &str, city: &str, country: &str) -> Result<Vault, EngineError> {
        let vault = self.ledger.with_transaction(|tx| tx.insert_vault(name, city, country))?;
        info!(vault = %vault.id, name, "vault registered");
        Ok(vault)
    }

    pub fn set_vault_status(&self, vault_id: VaultId, status: VaultStatus) -> Result<Vault, EngineError> {
        self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut vault = tx
                .vault(vault_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("vault", vault_id))?;
            vault.status = status;
            tx.put_vault(vault.clone())?;
            Ok(vault)
        })
    }

    pub fn price_board(&self) -> Vec<MetalQuote> {
        let metals: Vec<Metal> = self.ledger.read(|s| s.metals().cloned().collect());
        price_board(metals.iter(), self.oracle.as_ref())
    }

    // reads

    pub fn wallet(&self, user_id: UserId) -> Option<Wallet> {
        self.ledger.read(|s| s.wallet(user_id).cloned())
    }

    pub fn balance(&self, user_id: UserId) -> Money {
        self.wallet(user_id).map(|w| w.cash_balance).unwrap_or_else(Money::zero)
    }

    pub fn portfolio(&self, user_id: UserId) -> Vec<PortfolioItem> {
        self.ledger
            .read(|s| s.items_for_user(user_id).into_iter().cloned().collect())
    }

    pub fn transactions(&self, user_id: UserId) -> Vec<Transaction> {
        self.ledger
            .read(|s| s.transactions_for_user(user_id).into_iter().cloned().collect())
    }

    /// A shipment the caller owns. someone else's shipment reads as missing.
    pub fn shipment(&self, user_id: UserId, shipment_id: ShipmentId) -> Result<Shipment, EngineError> {
        self.ledger
            .read(|s| s.shipment(shipment_id).filter(|sh| sh.owned_by(user_id)).cloned())
            .ok_or_else(|| EngineError::not_found("shipment", shipment_id))
    }

    pub fn shipments(&self, user_id: UserId) -> Vec<Shipment> {
        self.ledger
            .read(|s| s.shipments_for_user(user_id).into_iter().cloned().collect())
    }

    /// Explicit replacement for wallet-on-signup: returns the user's wallet, creating an empty one if absent.
    pub fn ensure_wallet(&self, user_id: UserId) -> Result<Wallet, EngineError> {
        let now = self.now();
        self.ledger.with_transaction(|tx| Self::ensure_wallet_in(tx, user_id, now))
    }

    pub(super) fn ensure_wallet_in(tx: &mut LedgerTx<'_>, user_id: UserId, now: Timestamp) -> Result<Wallet, EngineError> {
        if let Some(wallet) = tx.wallet(user_id).cloned() {
            return Ok(wallet);
        }
        debug!(user = %user_id, "creating wallet");
        Ok(tx.create_wallet(user_id, now)?)
    }

    // guards. both are re-read on every call.

    pub(super) fn require_feature(&self, feature: Feature) -> Result<(), EngineError> {
        if self.features.is_enabled(feature) {
            Ok(())
        } else {
            Err(EngineError::ServiceUnavailable(feature.unavailable_message().to_string()))
        }
    }

    pub(super) fn require_verified(&self, user_id: UserId) -> Result<(), EngineError> {
        match self.directory.kyc_status(user_id) {
            Some(KycStatus::Verified) => Ok(()),
            _ => Err(EngineError::Forbidden(
                "KYC verification required before purchasing".to_string(),
            )),
        }
    }

    /// Log the outcome of an operation. guard failures are warnings, storage faults are errors.
    pub(super) fn finish<T>(
        &self,
        op: &'static str,
        subject: impl std::fmt::Display,
        result: Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        if let Err(err) = &result {
            match err {
                EngineError::Internal(detail) => error!(op, %subject, %detail, "operation failed"),
                other => warn!(op, %subject, kind = ?other.kind(), error = %other, "operation rejected"),
            }
        }
        result
    }

    /// Hand a committed event to the notifier. never fails, never panics into the caller.
    pub(super) fn emit(&self, payload: EventPayload) {
        let id = EventId(self.next_event_id.fetch_add(1, Ordering::SeqCst));
        let event = Event::new(id, self.now(), payload);

        match catch_unwind(AssertUnwindSafe(|| self.notifier.notify(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(event_id = id.0, kind = event.kind(), %err, "notifier failed, event dropped"),
            Err(_) => error!(event_id = id.0, kind = event.kind(), "notifier panicked, event dropped"),
        }
    }
}
