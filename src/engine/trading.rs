// 8.2 engine/trading.rs: buy, sell, convert.
// price is read before the ledger transaction opens; every balance and holding check
// runs again inside it, so a concurrent call can never spend the same cash or metal twice.

use super::core::Engine;
use super::results::{BuyResult, EngineError, SaleResult};
use crate::events::{EventPayload, TransactionCompletedEvent};
use crate::features::Feature;
use crate::ledger::{ItemStatus, NewPortfolioItem, NewTransaction, TransactionKind};
use crate::types::{Bps, Money, PortfolioItemId, ProductId, UserId, VaultId, Weight};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Where bought metal goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Vault(VaultId),
    // shipped straight to the customer, never held
    Ship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub delivery: DeliveryMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liquidation {
    Sell,
    Convert,
}

impl Liquidation {
    fn feature(self) -> Feature {
        match self {
            Liquidation::Sell => Feature::Selling,
            Liquidation::Convert => Feature::Converting,
        }
    }

    fn kind(self) -> TransactionKind {
        match self {
            Liquidation::Sell => TransactionKind::Sell,
            Liquidation::Convert => TransactionKind::Convert,
        }
    }

    fn op(self) -> &'static str {
        match self {
            Liquidation::Sell => "sell",
            Liquidation::Convert => "convert",
        }
    }
}

impl Engine {
    pub fn buy(&self, user_id: UserId, request: BuyRequest) -> Result<BuyResult, EngineError> {
        let result = self.try_buy(user_id, request);
        self.finish("buy", user_id, result)
    }

    fn try_buy(&self, user_id: UserId, request: BuyRequest) -> Result<BuyResult, EngineError> {
        self.require_feature(Feature::Buying)?;
        self.require_verified(user_id)?;

        if request.quantity == 0 {
            return Err(EngineError::InvalidRequest("Quantity must be at least 1".to_string()));
        }

        let (product, metal) = self.ledger.read(|s| {
            let product = s.product(request.product_id).filter(|p| p.is_active).cloned();
            let metal = product.as_ref().and_then(|p| s.metal(p.metal_id)).cloned();
            (product, metal)
        });
        let product = product.ok_or_else(|| EngineError::not_found("product", request.product_id))?;
        let metal = metal.ok_or_else(|| {
            EngineError::Internal(format!("{} references missing {}", product.id, product.metal_id))
        })?;

        let spot = self.oracle.current_price(&metal.symbol)?;

        // 8.2.1: cost = weight * (spot + premium), each leg rounded to the cent
        let total_weight = product.weight_per_unit.times(request.quantity);
        let spot_cost = total_weight.value_at(spot).round_cents();
        let premium_cost = product.premium_per_unit.mul(total_weight.value()).round_cents();
        let total_cost = spot_cost.add(premium_cost);

        let now = self.now();
        let (transaction, item, new_balance) = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut wallet = tx.wallet(user_id).cloned().ok_or_else(|| {
                EngineError::InvalidRequest("Wallet not found. Deposit funds before purchasing.".to_string())
            })?;

            let (status, vault_id) = match request.delivery {
                DeliveryMethod::Vault(vault_id) => {
                    let vault = tx.vault(vault_id).ok_or_else(|| EngineError::not_found("vault", vault_id))?;
                    if !vault.accepts_deposits() {
                        return Err(EngineError::InvalidRequest(format!(
                            "Vault {} is not accepting deposits",
                            vault.name
                        )));
                    }
                    (ItemStatus::Vaulted, Some(vault_id))
                }
                DeliveryMethod::Ship => (ItemStatus::Delivered, None),
            };

            wallet.debit(total_cost, now)?;
            tx.put_wallet(wallet.clone())?;

            let item = tx.insert_item(
                NewPortfolioItem {
                    user_id,
                    metal_id: metal.id,
                    product_id: Some(product.id),
                    weight: total_weight,
                    quantity: request.quantity,
                    status,
                    vault_id,
                    purchase_price: spot,
                },
                now,
            )?;

            let transaction = tx.insert_transaction(
                NewTransaction::cash(user_id, TransactionKind::Buy, total_cost)
                    .with_metal(metal.id, total_weight, Some(spot))
                    .with_fees(premium_cost),
                now,
            )?;

            Ok((transaction, item, wallet.cash_balance))
        })?;

        info!(
            user = %user_id,
            transaction = %transaction.id,
            item = %item.id,
            weight = %total_weight,
            total = %total_cost,
            "buy settled"
        );
        self.emit_completed(&transaction, new_balance);

        Ok(BuyResult {
            transaction,
            item,
            new_balance,
        })
    }

    /// Sell metal back at spot less the sell fee.
    pub fn sell(&self, user_id: UserId, item_id: PortfolioItemId, amount: Weight) -> Result<SaleResult, EngineError> {
        let result = self.liquidate(Liquidation::Sell, user_id, item_id, amount);
        self.finish("sell", user_id, result)
    }

    /// Convert metal to cash at spot less the conversion fee.
    pub fn convert(&self, user_id: UserId, item_id: PortfolioItemId, amount: Weight) -> Result<SaleResult, EngineError> {
        let result = self.liquidate(Liquidation::Convert, user_id, item_id, amount);
        self.finish("convert", user_id, result)
    }

    fn fee_for(&self, how: Liquidation) -> Bps {
        match how {
            Liquidation::Sell => self.config.fees.sell_fee(),
            Liquidation::Convert => self.config.fees.convert_fee(),
        }
    }

    fn liquidate(
        &self,
        how: Liquidation,
        user_id: UserId,
        item_id: PortfolioItemId,
        amount: Weight,
    ) -> Result<SaleResult, EngineError> {
        self.require_feature(how.feature())?;

        if amount.is_zero() {
            return Err(EngineError::InvalidRequest("Amount must be greater than zero".to_string()));
        }

        let symbol = self.ledger.read(|s| {
            s.item(item_id)
                .filter(|i| i.owned_by(user_id) && i.is_vaulted())
                .and_then(|i| s.metal(i.metal_id))
                .map(|m| m.symbol.clone())
        });
        let symbol = symbol.ok_or_else(|| EngineError::not_found("portfolio item", item_id))?;
        let price = self.oracle.current_price(&symbol)?;

        let gross = amount.value_at(price).round_cents();
        let fee = self.fee_for(how).of(gross).round_cents();
        let proceeds = gross.sub(fee);

        let now = self.now();
        let (transaction, remaining_item, new_balance) = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            // re-check under the lock; another call may have sold or shipped it meanwhile
            let mut item = tx
                .item(item_id)
                .filter(|i| i.owned_by(user_id) && i.is_vaulted())
                .cloned()
                .ok_or_else(|| EngineError::not_found("portfolio item", item_id))?;

            let remaining = item
                .weight
                .checked_sub(amount)
                .ok_or_else(|| EngineError::InvalidRequest("Insufficient holdings".to_string()))?;

            let mut wallet = tx.wallet(user_id).cloned().ok_or_else(|| {
                EngineError::InvalidRequest("Wallet not found".to_string())
            })?;
            wallet.credit(proceeds, now);
            tx.put_wallet(wallet.clone())?;

            let remaining_item = if remaining.is_zero() {
                tx.delete_item(item_id)?;
                None
            } else {
                item.weight = remaining;
                tx.put_item(item.clone())?;
                Some(item.clone())
            };

            let transaction = tx.insert_transaction(
                NewTransaction::cash(user_id, how.kind(), gross)
                    .with_metal(item.metal_id, amount, Some(price))
                    .with_fees(fee),
                now,
            )?;

            Ok((transaction, remaining_item, wallet.cash_balance))
        })?;

        info!(
            op = how.op(),
            user = %user_id,
            transaction = %transaction.id,
            weight = %amount,
            gross = %gross,
            fee = %fee,
            removed = remaining_item.is_none(),
            "liquidation settled"
        );
        self.emit_completed(&transaction, new_balance);

        Ok(SaleResult {
            transaction,
            proceeds,
            remaining_item,
            new_balance,
        })
    }

    pub(super) fn emit_completed(&self, transaction: &crate::ledger::Transaction, new_balance: Money) {
        self.emit(EventPayload::TransactionCompleted(TransactionCompletedEvent {
            user_id: transaction.user_id,
            transaction_id: transaction.id,
            kind: transaction.kind,
            total_value: transaction.total_value,
            fees: transaction.fees,
            new_balance,
        }));
    }
}
