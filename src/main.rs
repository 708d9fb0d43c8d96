//! Vault Core Simulation.
//!
//! Walks the settlement engine through its lifecycle: buying into the vault,
//! selling back, debt settlement, physical delivery and the shipment workflow.

use rust_decimal_macros::dec;
use std::sync::Arc;
use vault_core::telemetry::init_tracing;
use vault_core::*;

struct Desk {
    engine: Arc<Engine>,
    oracle: Arc<StaticPriceOracle>,
    gold_bar: ProductId,
    half_ounce: ProductId,
    silver_bar: ProductId,
    vault: VaultId,
}

fn main() {
    let env = match std::env::var("VAULT_ENV").as_deref() {
        Ok("sandbox") => Environment::Sandbox,
        Ok("production") => Environment::Production,
        _ => Environment::Development,
    };
    let config = match std::env::var("VAULT_CONFIG") {
        Ok(path) => match std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .and_then(|json| EngineConfig::from_json_str(&json))
        {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Cannot load {path}: {e}");
                std::process::exit(1);
            }
        },
        Err(_) => env.config(),
    };
    init_tracing(&config.logging);

    println!("Vault Core Settlement Simulation");
    println!("Environment: {:?}\n", env);

    scenario_a_insufficient_funds(&config);
    scenario_b_buy_into_vault(&config);
    scenario_c_partial_sell(&config);
    scenario_d_debt_settlement(&config);
    scenario_e_delivery_workflow(&config);
    scenario_f_concurrent_buyers(&config);

    println!("\nAll simulations completed successfully.");
}

fn open_desk(config: &EngineConfig, users: &[UserId]) -> Desk {
    let oracle = Arc::new(
        StaticPriceOracle::new()
            .with_price("XAU", Price::new_unchecked(dec!(2300)))
            .with_price("XAG", Price::new_unchecked(dec!(28))),
    );
    oracle.set_usd_to_gbp(Some(dec!(0.79)));

    let collaborators = Collaborators {
        oracle: oracle.clone(),
        features: Arc::new(PlatformSettings::new()),
        directory: Arc::new(InMemoryDirectory::verified(users.iter().copied())),
        notifier: Arc::new(LogNotifier),
    };
    let engine = Arc::new(Engine::new(config.clone(), Arc::new(LedgerStore::new()), collaborators));

    let gold = engine.add_metal("Gold", "XAU").unwrap();
    let silver = engine.add_metal("Silver", "XAG").unwrap();
    let ounce = |oz| Weight::new(oz).unwrap();

    let gold_bar = engine
        .add_product(gold.id, "1oz Gold Bar", "PAMP", ProductType::Bar, ounce(dec!(1)), Money::new(dec!(50)))
        .unwrap();
    let half_ounce = engine
        .add_product(gold.id, "1/2oz Britannia", "Royal Mint", ProductType::Coin, ounce(dec!(0.5)), Money::new(dec!(100)))
        .unwrap();
    let silver_bar = engine
        .add_product(silver.id, "10oz Silver Bar", "Valcambi", ProductType::Bar, ounce(dec!(10)), Money::new(dec!(2)))
        .unwrap();
    let vault = engine.add_vault("London Vault", "London", "GB").unwrap();

    Desk {
        engine,
        oracle,
        gold_bar: gold_bar.id,
        half_ounce: half_ounce.id,
        silver_bar: silver_bar.id,
        vault: vault.id,
    }
}

fn into_vault(desk: &Desk, product_id: ProductId, quantity: u32) -> BuyRequest {
    BuyRequest {
        product_id,
        quantity,
        delivery: DeliveryMethod::Vault(desk.vault),
    }
}

/// A buy that costs more than the wallet holds changes nothing.
fn scenario_a_insufficient_funds(config: &EngineConfig) {
    println!("Scenario A: Insufficient Funds\n");

    let alice = UserId(1);
    let desk = open_desk(config, &[alice]);
    desk.engine.deposit(alice, Money::new(dec!(1000))).unwrap();

    // 0.5oz at 2300 spot + 100 premium per oz = 1200
    let err = desk.engine.buy(alice, into_vault(&desk, desk.half_ounce, 1)).unwrap_err();
    println!("  Alice tries a $1,200 coin with $1,000: {}", err);
    println!("  Shortfall: ${}", err.shortfall().unwrap_or_else(Money::zero));
    println!("  Balance unchanged: ${}\n", desk.engine.balance(alice));
}

/// Silver bar bought into the vault.
fn scenario_b_buy_into_vault(config: &EngineConfig) {
    println!("Scenario B: Buy Into Vault\n");

    let alice = UserId(1);
    let desk = open_desk(config, &[alice]);
    desk.engine.deposit(alice, Money::new(dec!(1000))).unwrap();

    let result = desk.engine.buy(alice, into_vault(&desk, desk.silver_bar, 1)).unwrap();
    println!("  Alice buys 10oz silver at $28 + $2 premium");
    println!("  Paid ${} (premium ${})", result.transaction.total_value, result.transaction.fees);
    println!("  Holding {} of item {}, status {:?}", result.item.weight, result.item.id, result.item.status);
    println!("  Balance: ${}\n", result.new_balance);

    for quote in desk.engine.price_board() {
        println!("  {} {}: ${} (GBP {:?})", quote.symbol, quote.name, quote.price_usd, quote.price_gbp);
    }
    println!();
}

/// Half of a 1oz bar sold back at spot less 0.5%.
fn scenario_c_partial_sell(config: &EngineConfig) {
    println!("Scenario C: Partial Sell\n");

    let alice = UserId(1);
    let desk = open_desk(config, &[alice]);
    desk.engine.deposit(alice, Money::new(dec!(5000))).unwrap();
    let item = desk.engine.buy(alice, into_vault(&desk, desk.gold_bar, 1)).unwrap().item;

    let half = Weight::new(dec!(0.5)).unwrap();
    let sale = desk.engine.sell(alice, item.id, half).unwrap();
    println!("  Alice sells 0.5oz of her 1oz bar at $2,300");
    println!("  Gross ${}, fee ${}, proceeds ${}", sale.transaction.total_value, sale.transaction.fees, sale.proceeds);
    if let Some(remaining) = &sale.remaining_item {
        println!("  Remaining holding: {}", remaining.weight);
    }

    desk.oracle.set_price("XAU", Price::new_unchecked(dec!(2400)));
    let convert = desk.engine.convert(alice, item.id, half).unwrap();
    println!("  Gold moves to $2,400; Alice converts the rest");
    println!("  Proceeds ${} (2% fee ${}), holding removed: {}", convert.proceeds, convert.transaction.fees, convert.remaining_item.is_none());
    println!("  Balance: ${}\n", convert.new_balance);
}

/// Storage fee and tax paid in one consolidated withdrawal.
fn scenario_d_debt_settlement(config: &EngineConfig) {
    println!("Scenario D: Debt Settlement\n");

    let alice = UserId(1);
    let desk = open_desk(config, &[alice]);
    desk.engine.deposit(alice, Money::new(dec!(1000))).unwrap();
    desk.engine
        .record_debt(alice, TransactionKind::StorageFee, Money::new(dec!(120)))
        .unwrap();
    desk.engine.record_debt(alice, TransactionKind::Tax, Money::new(dec!(80))).unwrap();

    let owed = desk.engine.outstanding_debts(alice);
    println!("  Alice owes {} debts totalling ${}", owed.count, owed.total_due);

    let settlement = desk.engine.settle_outstanding_debts(alice).unwrap();
    println!("  Settled {} for ${}", settlement.settled_count, settlement.total_paid);
    if let Some(receipt) = &settlement.receipt {
        println!("  Receipt {} ({})", receipt.id, receipt.kind);
    }
    println!("  Balance: ${}\n", settlement.new_balance);
}

/// Delivery request, then the shipment walked through every stage.
fn scenario_e_delivery_workflow(config: &EngineConfig) {
    println!("Scenario E: Delivery Workflow\n");

    let alice = UserId(1);
    let desk = open_desk(config, &[alice]);
    desk.engine.deposit(alice, Money::new(dec!(10000))).unwrap();
    let a = desk.engine.buy(alice, into_vault(&desk, desk.gold_bar, 1)).unwrap().item;
    let b = desk.engine.buy(alice, into_vault(&desk, desk.gold_bar, 1)).unwrap().item;

    let request = DeliveryRequest {
        items: vec![
            DeliveryLine { item_id: a.id, quantity: 1 },
            DeliveryLine { item_id: b.id, quantity: 1 },
        ],
        carrier: "Brinks".to_string(),
        destination: Destination {
            recipient: "Alice Smith".to_string(),
            line1: "1 Bullion Row".to_string(),
            line2: None,
            city: "London".to_string(),
            region: None,
            postal_code: "EC2R 8AH".to_string(),
            country: "GB".to_string(),
        },
    };
    let delivery = desk.engine.request_delivery(alice, request).unwrap();
    let shipment_id = delivery.shipment.id;
    println!("  Alice ships 2oz with Brinks");
    println!(
        "  Fees: handling ${}, shipping ${}, insurance ${}, total ${}",
        delivery.fees.handling_fee, delivery.fees.shipping_fee, delivery.fees.insurance_fee, delivery.fees.total_fees
    );

    let err = desk
        .engine
        .complete_stage_action(alice, shipment_id, "ready")
        .unwrap_err();
    println!("  Customer action on stage 0 rejected: {}", err);

    desk.engine.admin_complete_stage(shipment_id).unwrap();
    desk.engine
        .complete_stage_action(alice, shipment_id, "Address confirmed")
        .unwrap();
    desk.engine
        .block_stage(shipment_id, StageCode::CompliancePaperwork, "Awaiting ID scan")
        .unwrap();
    println!("  Compliance blocked: {}", desk.engine.complete_stage_action(alice, shipment_id, "ID attached").unwrap_err());
    desk.engine.unblock_stage(shipment_id, StageCode::CompliancePaperwork).unwrap();
    desk.engine
        .complete_stage_action(alice, shipment_id, "ID attached")
        .unwrap();

    desk.engine
        .update_shipment_status(shipment_id, ShipmentStatus::Preparing, None, None)
        .unwrap();
    desk.engine.admin_complete_stage(shipment_id).unwrap();
    desk.engine.assign_carrier(shipment_id, "brinks", "BRK-1001").unwrap();
    desk.engine.admin_complete_stage(shipment_id).unwrap();
    for status in [ShipmentStatus::Shipped, ShipmentStatus::InTransit, ShipmentStatus::OutForDelivery] {
        desk.engine.update_shipment_status(shipment_id, status, None, None).unwrap();
    }
    desk.engine.admin_complete_stage(shipment_id).unwrap();
    desk.engine.admin_complete_stage(shipment_id).unwrap();
    desk.engine
        .update_shipment_status(shipment_id, ShipmentStatus::Delivered, Some("Signed by A. Smith"), Some("London"))
        .unwrap();
    desk.engine.admin_complete_stage(shipment_id).unwrap();

    let view = desk.engine.workflow(alice, shipment_id).unwrap();
    let shipment = desk.engine.shipment(alice, shipment_id).unwrap();
    println!("  Stages completed: {}/{}", view.stages.iter().filter(|s| s.status == StageStatus::Completed).count(), view.stages.len());
    println!("  Shipment {} history:", shipment.status);
    for event in &shipment.events {
        println!("    [{}] {}", event.status, event.description);
    }
    let json = serde_json::to_string_pretty(&dto::ShipmentView::from(&shipment)).unwrap_or_default();
    println!("  Response body is {} bytes of JSON\n", json.len());
}

/// Many buyers hammering one wallet never overdraw it.
fn scenario_f_concurrent_buyers(config: &EngineConfig) {
    println!("Scenario F: Concurrent Buyers\n");

    let alice = UserId(1);
    let desk = open_desk(config, &[alice]);
    desk.engine.deposit(alice, Money::new(dec!(10000))).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = desk.engine.clone();
            let request = into_vault(&desk, desk.gold_bar, 1);
            std::thread::spawn(move || engine.buy(alice, request).is_ok())
        })
        .collect();
    let filled = handles.into_iter().filter_map(|h| h.join().ok()).filter(|ok| *ok).count();

    println!("  8 threads each buy one $2,350 bar with $10,000");
    println!("  Filled: {}, balance: ${}", filled, desk.engine.balance(alice));
    println!("  Holdings: {}", desk.engine.portfolio(alice).len());
}
