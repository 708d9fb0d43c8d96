//! Concurrency tests.
//!
//! Many threads share one engine. The ledger lock must keep every guard check and
//! the writes that depend on it together.

mod common;

use common::{Desk, ALICE, BOB};
use rust_decimal_macros::dec;
use std::sync::{Arc, Barrier, Mutex, OnceLock};
use std::thread;
use vault_core::*;

const THREADS: usize = 16;

#[test]
fn racing_buys_never_overdraw() {
    // room for exactly four 1oz bars at 2350
    let desk = Desk::funded(ALICE, dec!(9400));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = desk.engine.clone();
            let barrier = barrier.clone();
            let request = desk.into_vault(desk.gold_bar, 1);
            thread::spawn(move || {
                barrier.wait();
                engine.buy(ALICE, request)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let filled = results.iter().filter(|r| r.is_ok()).count();

    assert_eq!(filled, 4);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.kind() == ErrorKind::InsufficientFunds));
    assert_eq!(desk.engine.balance(ALICE).value(), dec!(0));
    assert_eq!(desk.engine.portfolio(ALICE).len(), 4);
}

#[test]
fn one_item_ships_once() {
    let desk = Desk::funded(ALICE, dec!(100000));
    let item = desk.gold_in_vault(ALICE);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = desk.engine.clone();
            let barrier = barrier.clone();
            let request = desk.delivery(&[item], "fedex");
            thread::spawn(move || {
                barrier.wait();
                engine.request_delivery(ALICE, request)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    // losers either saw it in transit already or lost the race inside the lock
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e.kind(), ErrorKind::InvalidRequest | ErrorKind::Conflict)));

    assert_eq!(desk.engine.shipments(ALICE).len(), 1);
    let withdrawals = desk
        .engine
        .transactions(ALICE)
        .into_iter()
        .filter(|t| t.kind == TransactionKind::Withdrawal)
        .count();
    assert_eq!(withdrawals, 1);
}

#[test]
fn concurrent_sells_cannot_oversell() {
    let desk = Desk::funded(ALICE, dec!(5000));
    let item = desk.gold_in_vault(ALICE);
    let barrier = Arc::new(Barrier::new(THREADS));
    let slice = Weight::new(dec!(0.1)).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = desk.engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.sell(ALICE, item, slice)
            })
        })
        .collect();

    let sold = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_ok())
        .count();

    // ten slices empty the bar; the row is gone after the tenth
    assert_eq!(sold, 10);
    assert!(desk.engine.portfolio(ALICE).is_empty());
}

#[test]
fn separate_users_do_not_interfere() {
    let desk = Desk::funded(ALICE, dec!(23500));
    desk.engine.deposit(BOB, Money::new(dec!(23500))).unwrap();

    let handles: Vec<_> = [ALICE, BOB]
        .into_iter()
        .flat_map(|user| (0..10).map(move |_| user))
        .map(|user| {
            let engine = desk.engine.clone();
            let request = desk.into_vault(desk.gold_bar, 1);
            thread::spawn(move || engine.buy(user, request).unwrap())
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for user in [ALICE, BOB] {
        assert!(desk.engine.balance(user).is_zero());
        assert_eq!(desk.engine.portfolio(user).len(), 10);
    }
    assert!(desk.ledger.read(|s| s.total_cash()).is_zero());
}

/// Oracle that commits a sale of `pending` the first time it is asked for a price,
/// so the sale lands after a delivery read its items but before it writes them.
struct SellsWhilePricing {
    inner: Arc<StaticPriceOracle>,
    engine: OnceLock<Arc<Engine>>,
    pending: Mutex<Option<(PortfolioItemId, Weight)>>,
    proceeds: Mutex<Option<Money>>,
}

impl PriceOracle for SellsWhilePricing {
    fn current_price(&self, symbol: &str) -> Result<Price, OracleError> {
        let pending = self.pending.lock().unwrap().take();
        if let (Some((item, weight)), Some(engine)) = (pending, self.engine.get()) {
            let sale = engine.sell(ALICE, item, weight).unwrap();
            *self.proceeds.lock().unwrap() = Some(sale.proceeds);
        }
        self.inner.current_price(symbol)
    }
}

#[test]
fn sale_between_pricing_and_commit_is_not_undone() {
    let mut front = None;
    let desk = Desk::open_behind(|inner| {
        let oracle = Arc::new(SellsWhilePricing {
            inner,
            engine: OnceLock::new(),
            pending: Mutex::new(None),
            proceeds: Mutex::new(None),
        });
        front = Some(oracle.clone());
        oracle as Arc<dyn PriceOracle>
    });
    let front = front.unwrap();
    let _ = front.engine.set(desk.engine.clone());

    desk.engine.deposit(ALICE, Money::new(dec!(10000))).unwrap();
    let item = desk.gold_in_vault(ALICE);
    let before = desk.engine.balance(ALICE);

    *front.pending.lock().unwrap() = Some((item, Weight::new(dec!(0.5)).unwrap()));
    let err = desk
        .engine
        .request_delivery(ALICE, desk.delivery(&[item], "fedex"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // the sale stands: half the bar sold, proceeds credited, nothing shipped
    let proceeds = front.proceeds.lock().unwrap().unwrap();
    assert_eq!(proceeds.value(), dec!(1144.25));
    assert_eq!(desk.engine.balance(ALICE), before.add(proceeds));
    assert!(desk.engine.shipments(ALICE).is_empty());
    let holding = desk.engine.portfolio(ALICE).pop().unwrap();
    assert_eq!(holding.weight.value(), dec!(0.5));
    assert_eq!(holding.status, ItemStatus::Vaulted);

    // a fresh request prices what is actually left
    let delivery = desk
        .engine
        .request_delivery(ALICE, desk.delivery(&[item], "fedex"))
        .unwrap();
    assert_eq!(delivery.fees.aggregate_value.value(), dec!(1150));
    assert_eq!(delivery.fees.insurance_fee.value(), dec!(11.50));
    assert_eq!(delivery.transaction.amount.unwrap().value(), dec!(0.5));
}
