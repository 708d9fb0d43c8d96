//! Rollback tests.
//!
//! A storage fault injected partway through an operation must leave the ledger
//! exactly as it was, and surface as an opaque Internal error.

mod common;

use common::{Desk, ALICE};
use rust_decimal_macros::dec;
use vault_core::*;

#[derive(Debug, PartialEq)]
struct Snapshot {
    balance: Money,
    transactions: Vec<Transaction>,
    portfolio: Vec<PortfolioItem>,
    shipments: Vec<Shipment>,
}

fn snapshot(desk: &Desk, user: UserId) -> Snapshot {
    Snapshot {
        balance: desk.engine.balance(user),
        transactions: desk.engine.transactions(user),
        portfolio: desk.engine.portfolio(user),
        shipments: desk.engine.shipments(user),
    }
}

#[test]
fn buy_rolls_back_when_the_receipt_write_fails() {
    let desk = Desk::funded(ALICE, dec!(5000));
    let before = snapshot(&desk, ALICE);

    // wallet and holding succeed, the transaction row fails
    desk.ledger.inject_write_failure(2);
    let err = desk
        .engine
        .buy(ALICE, desk.into_vault(desk.gold_bar, 1))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.to_string(), "Internal error");
    assert_eq!(snapshot(&desk, ALICE), before);
    assert!(desk.events.is_empty());

    // the fault fired once; the next attempt goes through
    desk.engine.buy(ALICE, desk.into_vault(desk.gold_bar, 1)).unwrap();
}

#[test]
fn full_sell_rolls_back_the_deletion() {
    let desk = Desk::funded(ALICE, dec!(5000));
    let item = desk.gold_in_vault(ALICE);
    let before = snapshot(&desk, ALICE);

    desk.ledger.inject_write_failure(2);
    let err = desk
        .engine
        .sell(ALICE, item, Weight::new(dec!(1)).unwrap())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(snapshot(&desk, ALICE), before);
    assert_eq!(desk.engine.portfolio(ALICE)[0].weight.value(), dec!(1));
}

#[test]
fn settlement_never_half_finalizes_debts() {
    let desk = Desk::funded(ALICE, dec!(1000));
    desk.engine
        .record_debt(ALICE, TransactionKind::StorageFee, Money::new(dec!(120)))
        .unwrap();
    desk.engine
        .record_debt(ALICE, TransactionKind::Tax, Money::new(dec!(80)))
        .unwrap();
    let before = snapshot(&desk, ALICE);

    // wallet debit and first debt succeed, the second debt fails
    desk.ledger.inject_write_failure(2);
    let err = desk.engine.settle_outstanding_debts(ALICE).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(snapshot(&desk, ALICE), before);
    let owed = desk.engine.outstanding_debts(ALICE);
    assert_eq!(owed.count, 2);
    assert_eq!(owed.total_due.value(), dec!(200));

    let settlement = desk.engine.settle_outstanding_debts(ALICE).unwrap();
    assert_eq!(settlement.settled_count, 2);
}

#[test]
fn delivery_rolls_back_shipment_and_items() {
    let desk = Desk::funded(ALICE, dec!(10000));
    let a = desk.gold_in_vault(ALICE);
    let b = desk.gold_in_vault(ALICE);
    let before = snapshot(&desk, ALICE);

    // fees and shipment written, first item update fails
    desk.ledger.inject_write_failure(2);
    let err = desk
        .engine
        .request_delivery(ALICE, desk.delivery(&[a, b], "fedex"))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(snapshot(&desk, ALICE), before);
    assert!(desk
        .engine
        .portfolio(ALICE)
        .iter()
        .all(|i| i.status == ItemStatus::Vaulted && i.shipment_id.is_none()));

    // sequences were restored too, so the retry reuses the same shipment id
    let shipment = desk
        .engine
        .request_delivery(ALICE, desk.delivery(&[a, b], "fedex"))
        .unwrap()
        .shipment;
    assert_eq!(shipment.id, ShipmentId(1));
}

#[test]
fn failed_first_deposit_leaves_no_wallet() {
    let desk = Desk::open();

    // wallet row created, credit fails
    desk.ledger.inject_write_failure(1);
    let err = desk.engine.deposit(ALICE, Money::new(dec!(100))).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(desk.engine.wallet(ALICE).is_none());
    assert!(desk.engine.transactions(ALICE).is_empty());
}

#[test]
fn status_cascade_is_all_or_nothing() {
    let desk = Desk::funded(ALICE, dec!(10000));
    let a = desk.gold_in_vault(ALICE);
    let b = desk.gold_in_vault(ALICE);
    let shipment = desk
        .engine
        .request_delivery(ALICE, desk.delivery(&[a, b], "fedex"))
        .unwrap()
        .shipment;

    // shipment and first item written, second item fails
    desk.ledger.inject_write_failure(2);
    let err = desk
        .engine
        .update_shipment_status(shipment.id, ShipmentStatus::Delivered, None, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    let unchanged = desk.engine.shipment(ALICE, shipment.id).unwrap();
    assert_eq!(unchanged, shipment);
    assert!(desk
        .engine
        .portfolio(ALICE)
        .iter()
        .all(|i| i.status == ItemStatus::InTransit));
}
