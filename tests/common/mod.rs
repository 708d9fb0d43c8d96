//! Shared desk setup for integration tests.

#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use vault_core::*;

pub const ALICE: UserId = UserId(1);
pub const BOB: UserId = UserId(2);

pub struct Desk {
    pub engine: Arc<Engine>,
    pub ledger: Arc<LedgerStore>,
    pub oracle: Arc<StaticPriceOracle>,
    pub settings: Arc<PlatformSettings>,
    pub events: Arc<EventCollector>,
    /// 1oz gold, $50 premium
    pub gold_bar: ProductId,
    /// 0.5oz gold, $100/oz premium: $1,200 at $2,300 spot
    pub half_ounce: ProductId,
    /// 10oz silver, $2/oz premium: $300 at $28 spot
    pub silver_bar: ProductId,
    pub vault: VaultId,
}

impl Desk {
    pub fn open() -> Self {
        Self::open_behind(|oracle| oracle as Arc<dyn PriceOracle>)
    }

    /// Desk whose engine prices through `front`, wrapped around the static oracle.
    pub fn open_behind(front: impl FnOnce(Arc<StaticPriceOracle>) -> Arc<dyn PriceOracle>) -> Self {
        vault_core::telemetry::init_test_tracing();
        let ledger = Arc::new(LedgerStore::new());
        let oracle = Arc::new(
            StaticPriceOracle::new()
                .with_price("XAU", Price::new_unchecked(dec!(2300)))
                .with_price("XAG", Price::new_unchecked(dec!(28))),
        );
        let settings = Arc::new(PlatformSettings::new());
        let events = Arc::new(EventCollector::new());

        let engine = Arc::new(Engine::new(
            EngineConfig::default(),
            ledger.clone(),
            Collaborators {
                oracle: front(oracle.clone()),
                features: settings.clone(),
                directory: Arc::new(InMemoryDirectory::verified([ALICE, BOB])),
                notifier: events.clone(),
            },
        ));
        engine.set_time(Timestamp::from_millis(1_700_000_000_000));

        let gold = engine.add_metal("Gold", "XAU").unwrap();
        let silver = engine.add_metal("Silver", "XAG").unwrap();
        let oz = |v| Weight::new(v).unwrap();
        let gold_bar = engine
            .add_product(gold.id, "1oz Gold Bar", "PAMP", ProductType::Bar, oz(dec!(1)), Money::new(dec!(50)))
            .unwrap();
        let half_ounce = engine
            .add_product(gold.id, "1/2oz Britannia", "Royal Mint", ProductType::Coin, oz(dec!(0.5)), Money::new(dec!(100)))
            .unwrap();
        let silver_bar = engine
            .add_product(silver.id, "10oz Silver Bar", "Valcambi", ProductType::Bar, oz(dec!(10)), Money::new(dec!(2)))
            .unwrap();
        let vault = engine.add_vault("London Vault", "London", "GB").unwrap();

        Self {
            engine,
            ledger,
            oracle,
            settings,
            events,
            gold_bar: gold_bar.id,
            half_ounce: half_ounce.id,
            silver_bar: silver_bar.id,
            vault: vault.id,
        }
    }

    pub fn funded(user: UserId, amount: Decimal) -> Self {
        let desk = Self::open();
        desk.engine.deposit(user, Money::new(amount)).unwrap();
        desk.events.clear();
        desk
    }

    pub fn into_vault(&self, product_id: ProductId, quantity: u32) -> BuyRequest {
        BuyRequest {
            product_id,
            quantity,
            delivery: DeliveryMethod::Vault(self.vault),
        }
    }

    pub fn gold_in_vault(&self, user: UserId) -> PortfolioItemId {
        self.engine.buy(user, self.into_vault(self.gold_bar, 1)).unwrap().item.id
    }

    pub fn delivery(&self, items: &[PortfolioItemId], carrier: &str) -> DeliveryRequest {
        DeliveryRequest {
            items: items
                .iter()
                .map(|id| DeliveryLine {
                    item_id: *id,
                    quantity: 1,
                })
                .collect(),
            carrier: carrier.to_string(),
            destination: address(),
        }
    }

    pub fn transaction_count(&self) -> usize {
        self.ledger.read(|s| s.transaction_count())
    }

    pub fn item_count(&self) -> usize {
        self.ledger.read(|s| s.item_count())
    }
}

pub fn address() -> Destination {
    Destination {
        recipient: "Alice Smith".to_string(),
        line1: "1 Bullion Row".to_string(),
        line2: Some("Floor 3".to_string()),
        city: "London".to_string(),
        region: None,
        postal_code: "EC2R 8AH".to_string(),
        country: "GB".to_string(),
    }
}
