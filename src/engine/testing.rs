// shared fixture for the engine's unit tests: one verified, funded user, gold at 2300,
// a 1oz bar with a 50 premium, one active vault.

use super::{BuyRequest, Collaborators, DeliveryMethod, Engine};
use crate::config::EngineConfig;
use crate::events::EventCollector;
use crate::features::PlatformSettings;
use crate::identity::InMemoryDirectory;
use crate::ledger::{Destination, LedgerStore, ProductType};
use crate::pricing::StaticPriceOracle;
use crate::types::{Money, PortfolioItemId, Price, ProductId, Timestamp, UserId, VaultId, Weight};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub const GOLD_PRICE: Decimal = dec!(2300);

pub struct Harness {
    pub engine: Engine,
    pub user: UserId,
    pub bar: ProductId,
    pub vault: VaultId,
    pub oracle: Arc<StaticPriceOracle>,
    pub settings: Arc<PlatformSettings>,
    pub events: Arc<EventCollector>,
}

impl Harness {
    /// Buy `quantity` bars into the vault and return the holding.
    pub fn vaulted_bar(&self, quantity: u32) -> PortfolioItemId {
        self.engine
            .buy(
                self.user,
                BuyRequest {
                    product_id: self.bar,
                    quantity,
                    delivery: DeliveryMethod::Vault(self.vault),
                },
            )
            .unwrap()
            .item
            .id
    }
}

pub fn funded_engine(balance: Decimal) -> Harness {
    let user = UserId(1);
    let oracle = Arc::new(StaticPriceOracle::new().with_price("XAU", Price::new_unchecked(GOLD_PRICE)));
    let settings = Arc::new(PlatformSettings::new());
    let events = Arc::new(EventCollector::new());

    let engine = Engine::new(
        EngineConfig::default(),
        Arc::new(LedgerStore::new()),
        Collaborators {
            oracle: oracle.clone(),
            features: settings.clone(),
            directory: Arc::new(InMemoryDirectory::verified([user])),
            notifier: events.clone(),
        },
    );

    engine.set_time(Timestamp::from_millis(1_700_000_000_000));

    let gold = engine.add_metal("Gold", "XAU").unwrap();
    let bar = engine
        .add_product(
            gold.id,
            "1oz Gold Bar",
            "PAMP",
            ProductType::Bar,
            Weight::new(dec!(1)).unwrap(),
            Money::new(dec!(50)),
        )
        .unwrap();
    let vault = engine.add_vault("London", "London", "GB").unwrap();

    if balance > Decimal::ZERO {
        engine.deposit(user, Money::new(balance)).unwrap();
    }

    Harness {
        engine,
        user,
        bar: bar.id,
        vault: vault.id,
        oracle,
        settings,
        events,
    }
}

pub fn destination() -> Destination {
    Destination {
        recipient: "Ada Lovelace".into(),
        line1: "1 Bullion Row".into(),
        line2: None,
        city: "London".into(),
        region: None,
        postal_code: "EC2R 8AH".into(),
        country: "GB".into(),
    }
}
