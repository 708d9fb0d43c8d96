//! End-to-end settlement scenarios.
//!
//! Each test drives the public engine API from a fresh desk and checks the
//! ledger afterwards.

mod common;

use common::{Desk, ALICE, BOB};
use rust_decimal_macros::dec;
use vault_core::*;

mod settlement {
    use super::*;

    #[test]
    fn buy_beyond_balance_changes_nothing() {
        let desk = Desk::funded(ALICE, dec!(1000));
        let txs = desk.transaction_count();

        let err = desk
            .engine
            .buy(ALICE, desk.into_vault(desk.half_ounce, 1))
            .unwrap_err();

        assert_eq!(
            err,
            EngineError::InsufficientFunds {
                required: Money::new(dec!(1200)),
                available: Money::new(dec!(1000)),
            }
        );
        assert_eq!(err.shortfall(), Some(Money::new(dec!(200))));
        assert_eq!(desk.engine.balance(ALICE).value(), dec!(1000));
        assert_eq!(desk.transaction_count(), txs);
        assert_eq!(desk.item_count(), 0);
        assert!(desk.events.is_empty());
    }

    #[test]
    fn buy_debits_and_creates_one_holding() {
        let desk = Desk::funded(ALICE, dec!(1000));

        let result = desk.engine.buy(ALICE, desk.into_vault(desk.silver_bar, 1)).unwrap();

        assert_eq!(result.new_balance.value(), dec!(700));
        assert_eq!(desk.engine.balance(ALICE).value(), dec!(700));

        let buys: Vec<_> = desk
            .engine
            .transactions(ALICE)
            .into_iter()
            .filter(|t| t.kind == TransactionKind::Buy)
            .collect();
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].status, TransactionStatus::Completed);
        assert_eq!(buys[0].total_value.value(), dec!(300));

        let portfolio = desk.engine.portfolio(ALICE);
        assert_eq!(portfolio.len(), 1);
        assert_eq!(portfolio[0].weight.value(), dec!(10));
        assert_eq!(portfolio[0].vault_id, Some(desk.vault));
    }

    #[test]
    fn partial_sell_keeps_the_rest() {
        let desk = Desk::funded(ALICE, dec!(5000));
        let item = desk.gold_in_vault(ALICE);
        let before = desk.engine.balance(ALICE);

        let sale = desk
            .engine
            .sell(ALICE, item, Weight::new(dec!(0.5)).unwrap())
            .unwrap();

        assert_eq!(sale.transaction.total_value.value(), dec!(1150));
        assert_eq!(sale.transaction.fees.value(), dec!(5.75));
        assert_eq!(sale.proceeds.value(), dec!(1144.25));
        assert_eq!(sale.remaining_item.as_ref().unwrap().weight.value(), dec!(0.5));
        assert_eq!(desk.engine.balance(ALICE), before.add(Money::new(dec!(1144.25))));
    }

    #[test]
    fn debts_settle_into_one_receipt() {
        let desk = Desk::funded(ALICE, dec!(1000));
        let storage = desk
            .engine
            .record_debt(ALICE, TransactionKind::StorageFee, Money::new(dec!(120)))
            .unwrap();
        let tax = desk
            .engine
            .record_debt(ALICE, TransactionKind::Tax, Money::new(dec!(80)))
            .unwrap();

        let settlement = desk.engine.settle_outstanding_debts(ALICE).unwrap();

        assert_eq!(settlement.settled_count, 2);
        assert_eq!(settlement.new_balance.value(), dec!(800));
        let receipt = settlement.receipt.unwrap();
        assert_eq!(receipt.kind, TransactionKind::Withdrawal);
        assert_eq!(receipt.total_value.value(), dec!(200));
        assert_eq!(receipt.status, TransactionStatus::Completed);

        let history = desk.engine.transactions(ALICE);
        for id in [storage.id, tax.id] {
            let row = history.iter().find(|t| t.id == id).unwrap();
            assert_eq!(row.status, TransactionStatus::Completed);
        }
        assert_eq!(desk.engine.outstanding_debts(ALICE).count, 0);
    }

    #[test]
    fn closed_gate_blocks_before_anything_moves() {
        let desk = Desk::funded(ALICE, dec!(5000));
        let item = desk.gold_in_vault(ALICE);
        desk.settings.set(Feature::Selling, false);
        let txs = desk.transaction_count();

        let err = desk
            .engine
            .sell(ALICE, item, Weight::new(dec!(0.1)).unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert!(err.kind().is_retryable());
        assert_eq!(desk.transaction_count(), txs);

        // convert has its own gate
        desk.engine
            .convert(ALICE, item, Weight::new(dec!(0.1)).unwrap())
            .unwrap();

        desk.settings.set(Feature::Selling, true);
        desk.engine
            .sell(ALICE, item, Weight::new(dec!(0.1)).unwrap())
            .unwrap();
    }
}

mod delivery {
    use super::*;

    #[test]
    fn customer_cannot_act_on_back_office_stage() {
        let desk = Desk::funded(ALICE, dec!(10000));
        let item = desk.gold_in_vault(ALICE);
        let shipment = desk
            .engine
            .request_delivery(ALICE, desk.delivery(&[item], "fedex"))
            .unwrap()
            .shipment;

        assert_eq!(shipment.stages.len(), 8);
        assert_eq!(shipment.stages[0].status, StageStatus::InProgress);
        assert!(!shipment.stages[0].requires_customer_action);

        let err = desk
            .engine
            .complete_stage_action(ALICE, shipment.id, "please hurry")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("does not require customer action"));

        desk.engine.admin_complete_stage(shipment.id).unwrap();

        let err = desk
            .engine
            .complete_stage_action(ALICE, shipment.id, "   ")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let progress = desk
            .engine
            .complete_stage_action(ALICE, shipment.id, "Address confirmed")
            .unwrap();
        assert_eq!(progress.completed, StageCode::AddressVerification);
        assert_eq!(progress.activated, Some(StageCode::CompliancePaperwork));

        let view = desk.engine.workflow(ALICE, shipment.id).unwrap();
        assert_eq!(view.active.unwrap().stage_order, 2);
        let stage = &view.stages[1];
        assert_eq!(stage.status, StageStatus::Completed);
        assert_eq!(stage.customer_action_note.as_deref(), Some("Address confirmed"));
        assert!(stage.customer_action_completed_at.is_some());
    }

    #[test]
    fn full_lifecycle_ends_delivered() {
        let desk = Desk::funded(ALICE, dec!(10000));
        let a = desk.gold_in_vault(ALICE);
        let b = desk.gold_in_vault(ALICE);
        let shipment = desk
            .engine
            .request_delivery(ALICE, desk.delivery(&[a, b], "Brinks"))
            .unwrap()
            .shipment;
        let id = shipment.id;

        desk.engine.admin_complete_stage(id).unwrap();
        desk.engine.complete_stage_action(ALICE, id, "Address confirmed").unwrap();

        desk.engine
            .block_stage(id, StageCode::CompliancePaperwork, "Awaiting ID")
            .unwrap();
        let err = desk.engine.complete_stage_action(ALICE, id, "ID attached").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        desk.engine.unblock_stage(id, StageCode::CompliancePaperwork).unwrap();
        desk.engine.complete_stage_action(ALICE, id, "ID attached").unwrap();

        desk.engine.admin_complete_stage(id).unwrap();
        desk.engine.assign_carrier(id, "brinks", "BRK-1").unwrap();
        desk.engine.admin_complete_stage(id).unwrap();
        for status in [ShipmentStatus::Shipped, ShipmentStatus::InTransit, ShipmentStatus::OutForDelivery] {
            desk.engine.update_shipment_status(id, status, None, None).unwrap();
        }
        desk.engine.admin_complete_stage(id).unwrap();
        desk.engine.admin_complete_stage(id).unwrap();
        desk.engine
            .update_shipment_status(id, ShipmentStatus::Delivered, None, None)
            .unwrap();
        let last = desk.engine.admin_complete_stage(id).unwrap();
        assert_eq!(last.completed, StageCode::DeliveryCompleted);
        assert_eq!(last.activated, None);

        let view = desk.engine.workflow(ALICE, id).unwrap();
        assert!(view.active.is_none());
        assert!(view.stages.iter().all(|s| s.status == StageStatus::Completed));

        let shipment = desk.engine.shipment(ALICE, id).unwrap();
        assert_eq!(shipment.status, ShipmentStatus::Delivered);
        assert_eq!(shipment.tracking_number.as_deref(), Some("BRK-1"));
        assert!(shipment.events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(desk
            .engine
            .portfolio(ALICE)
            .iter()
            .all(|i| i.status == ItemStatus::Delivered));

        // no more stages to finish
        let err = desk.engine.admin_complete_stage(id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn tracking_numbers_are_unique() {
        let desk = Desk::funded(ALICE, dec!(10000));
        desk.engine.deposit(BOB, Money::new(dec!(10000))).unwrap();
        let a = desk.gold_in_vault(ALICE);
        let b = desk.gold_in_vault(BOB);
        let first = desk.engine.request_delivery(ALICE, desk.delivery(&[a], "ups")).unwrap().shipment;
        let second = desk.engine.request_delivery(BOB, desk.delivery(&[b], "ups")).unwrap().shipment;

        desk.engine.assign_carrier(first.id, "ups", "1Z999").unwrap();
        let err = desk.engine.assign_carrier(second.id, "ups", "1Z999").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let untouched = desk.engine.shipment(BOB, second.id).unwrap();
        assert_eq!(untouched.tracking_number, None);
        assert_eq!(untouched.events.len(), 1);
    }

    #[test]
    fn fees_beyond_balance_leave_items_vaulted() {
        let desk = Desk::funded(ALICE, dec!(2400));
        let item = desk.gold_in_vault(ALICE);
        // 50 left; brinks alone costs 500
        let err = desk
            .engine
            .request_delivery(ALICE, desk.delivery(&[item], "brinks"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

        assert!(desk.engine.shipments(ALICE).is_empty());
        let holding = desk.engine.portfolio(ALICE).pop().unwrap();
        assert_eq!(holding.status, ItemStatus::Vaulted);
        assert_eq!(holding.shipment_id, None);
        assert_eq!(desk.engine.balance(ALICE).value(), dec!(50));
    }
}

mod notifications {
    use super::*;

    #[test]
    fn committed_operations_notify() {
        let desk = Desk::funded(ALICE, dec!(10000));
        let item = desk.gold_in_vault(ALICE);
        desk.engine
            .request_delivery(ALICE, desk.delivery(&[item], "fedex"))
            .unwrap();

        let kinds: Vec<&str> = desk.events.events().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec!["transaction_completed", "shipment_requested", "transaction_completed"]
        );
    }

    #[test]
    fn failing_notifier_never_undoes_a_commit() {
        let desk = Desk::funded(ALICE, dec!(1000));
        desk.events.set_failing(true);

        let result = desk.engine.deposit(ALICE, Money::new(dec!(50))).unwrap();
        assert_eq!(result.new_balance.value(), dec!(1050));
        assert_eq!(desk.engine.balance(ALICE).value(), dec!(1050));
        assert!(desk.events.is_empty());
    }
}
