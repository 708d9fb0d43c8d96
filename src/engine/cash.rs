// 8.3 engine/cash.rs: deposits, debt settlement, admin balance adjustments.

use super::core::Engine;
use super::results::{BalanceAdjustment, DebtSettlement, DebtSummary, DepositResult, EngineError};
use crate::events::{DebtsSettledEvent, EventPayload};
use crate::ledger::{NewTransaction, Transaction, TransactionKind, TransactionStatus};
use crate::types::{Money, UserId};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::info;

/// Parse a caller-supplied cash amount. must be numeric, positive, and whole cents.
pub fn parse_amount(raw: &str) -> Result<Money, EngineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EngineError::InvalidRequest("Amount is required".to_string()));
    }
    let value = Decimal::from_str(raw)
        .map_err(|_| EngineError::InvalidRequest("Invalid amount format".to_string()))?;
    validate_amount(Money::new(value))
}

fn validate_amount(amount: Money) -> Result<Money, EngineError> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidRequest("Amount must be positive".to_string()));
    }
    if amount.value().normalize().scale() > 2 {
        return Err(EngineError::InvalidRequest(
            "Amount cannot have more than 2 decimal places".to_string(),
        ));
    }
    Ok(amount)
}

impl Engine {
    pub fn deposit(&self, user_id: UserId, amount: Money) -> Result<DepositResult, EngineError> {
        let result = self.try_deposit(user_id, amount);
        self.finish("deposit", user_id, result)
    }

    fn try_deposit(&self, user_id: UserId, amount: Money) -> Result<DepositResult, EngineError> {
        let amount = validate_amount(amount)?;
        let now = self.now();

        let (transaction, new_balance) = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut wallet = Self::ensure_wallet_in(tx, user_id, now)?;
            wallet.credit(amount, now);
            tx.put_wallet(wallet.clone())?;
            let transaction =
                tx.insert_transaction(NewTransaction::cash(user_id, TransactionKind::Deposit, amount), now)?;
            Ok((transaction, wallet.cash_balance))
        })?;

        info!(user = %user_id, transaction = %transaction.id, %amount, balance = %new_balance, "deposit settled");
        self.emit_completed(&transaction, new_balance);

        Ok(DepositResult {
            transaction,
            new_balance,
        })
    }

    /// Pending storage fees and taxes, oldest first.
    pub fn outstanding_debts(&self, user_id: UserId) -> DebtSummary {
        let debts: Vec<Transaction> = self
            .ledger
            .read(|s| s.pending_debts(user_id).into_iter().cloned().collect());
        DebtSummary {
            count: debts.len(),
            total_due: debts.iter().map(Transaction::amount_due).sum(),
            debts,
        }
    }

    /// Pay every pending debt in one go, or none of them.
    pub fn settle_outstanding_debts(&self, user_id: UserId) -> Result<DebtSettlement, EngineError> {
        let result = self.try_settle(user_id);
        self.finish("settle_outstanding_debts", user_id, result)
    }

    fn try_settle(&self, user_id: UserId) -> Result<DebtSettlement, EngineError> {
        let now = self.now();

        let settlement = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            // nothing owed: succeed without touching the wallet table
            let debts: Vec<Transaction> = tx.pending_debts(user_id).into_iter().cloned().collect();
            if debts.is_empty() {
                return Ok(DebtSettlement {
                    settled_count: 0,
                    total_paid: Money::zero(),
                    receipt: None,
                    new_balance: tx.wallet(user_id).map(|w| w.cash_balance).unwrap_or_else(Money::zero),
                });
            }

            let mut wallet = Self::ensure_wallet_in(tx, user_id, now)?;

            let total_due: Money = debts.iter().map(Transaction::amount_due).sum();
            wallet.debit(total_due, now)?;
            tx.put_wallet(wallet.clone())?;

            for debt in &debts {
                tx.finalize_transaction(debt.id, TransactionStatus::Completed)?;
            }

            let receipt =
                tx.insert_transaction(NewTransaction::cash(user_id, TransactionKind::Withdrawal, total_due), now)?;

            Ok(DebtSettlement {
                settled_count: debts.len(),
                total_paid: total_due,
                receipt: Some(receipt),
                new_balance: wallet.cash_balance,
            })
        })?;

        if let Some(receipt) = &settlement.receipt {
            info!(
                user = %user_id,
                settled = settlement.settled_count,
                total = %settlement.total_paid,
                receipt = %receipt.id,
                "debts settled"
            );
            self.emit(EventPayload::DebtsSettled(DebtsSettledEvent {
                user_id,
                settled_count: settlement.settled_count,
                total_paid: settlement.total_paid,
                receipt_id: receipt.id,
            }));
            self.emit_completed(receipt, settlement.new_balance);
        }

        Ok(settlement)
    }

    /// Append a pending storage fee or tax. settled later by `settle_outstanding_debts`.
    pub fn record_debt(&self, user_id: UserId, kind: TransactionKind, amount: Money) -> Result<Transaction, EngineError> {
        let result = self.try_record_debt(user_id, kind, amount);
        self.finish("record_debt", user_id, result)
    }

    fn try_record_debt(&self, user_id: UserId, kind: TransactionKind, amount: Money) -> Result<Transaction, EngineError> {
        if !kind.is_debt() {
            return Err(EngineError::InvalidRequest(format!("{kind} is not a debt type")));
        }
        let amount = validate_amount(amount)?;
        let now = self.now();

        let debt = self.ledger.with_transaction(|tx| {
            tx.insert_transaction(
                NewTransaction::cash(user_id, kind, amount).with_status(TransactionStatus::Pending),
                now,
            )
        })?;
        info!(user = %user_id, transaction = %debt.id, %kind, %amount, "debt recorded");
        Ok(debt)
    }

    /// Admin credit (positive) or debit (negative). never takes a wallet below zero.
    pub fn adjust_balance(&self, user_id: UserId, amount: Money, reason: &str) -> Result<BalanceAdjustment, EngineError> {
        let result = self.try_adjust(user_id, amount, reason);
        self.finish("adjust_balance", user_id, result)
    }

    fn try_adjust(&self, user_id: UserId, amount: Money, reason: &str) -> Result<BalanceAdjustment, EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::InvalidRequest("A reason is required for balance adjustments".to_string()));
        }
        if amount.is_zero() {
            return Err(EngineError::InvalidRequest("Adjustment amount cannot be zero".to_string()));
        }
        let magnitude = validate_amount(amount.abs())?;
        let now = self.now();

        let (transaction, new_balance) = self.ledger.with_transaction(|tx| -> Result<_, EngineError> {
            let mut wallet = Self::ensure_wallet_in(tx, user_id, now)?;
            let kind = if amount.is_positive() {
                wallet.credit(magnitude, now);
                TransactionKind::Deposit
            } else {
                wallet.debit(magnitude, now)?;
                TransactionKind::Withdrawal
            };
            tx.put_wallet(wallet.clone())?;
            let transaction = tx.insert_transaction(NewTransaction::cash(user_id, kind, magnitude), now)?;
            Ok((transaction, wallet.cash_balance))
        })?;

        info!(user = %user_id, %amount, reason, balance = %new_balance, "balance adjusted by admin");
        self.emit_completed(&transaction, new_balance);

        Ok(BalanceAdjustment {
            transaction,
            new_balance,
            reason: reason.to_string(),
        })
    }
}
