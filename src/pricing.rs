// 9.0 pricing.rs: price oracle seam.
// the engine only ever asks "what is XAU worth right now". where that number comes from
// (a vendor feed, a cache, a test fixture) sits behind PriceOracle.

use crate::ledger::Metal;
use crate::types::{MetalId, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("No price available for metal {0}")]
    UnknownSymbol(String),

    #[error("Price source unavailable: {0}")]
    Unavailable(String),
}

/// Read-only current-price source. the engine trusts whatever it returns.
pub trait PriceOracle: Send + Sync {
    /// USD per troy ounce.
    fn current_price(&self, symbol: &str) -> Result<Price, OracleError>;

    /// Display-only FX rate. never used for settlement.
    fn usd_to_gbp(&self) -> Option<Decimal> {
        None
    }
}

/// Last price pushed for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: Price,
    pub timestamp: Timestamp,
}

/** 9.1: in-process oracle. prices are pushed by whatever ingests the real feed */
#[derive(Debug)]
pub struct StaticPriceOracle {
    prices: RwLock<HashMap<String, PriceUpdate>>,
    usd_to_gbp: RwLock<Option<Decimal>>,
    healthy: AtomicBool,
}

impl Default for StaticPriceOracle {
    fn default() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            usd_to_gbp: RwLock::new(None),
            healthy: AtomicBool::new(true),
        }
    }
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, symbol: &str, price: Price) -> Self {
        self.set_price(symbol, price);
        self
    }

    pub fn set_price(&self, symbol: &str, price: Price) {
        let symbol = symbol.to_ascii_uppercase();
        debug!(%symbol, %price, "price update");
        let update = PriceUpdate {
            symbol: symbol.clone(),
            price,
            timestamp: Timestamp::now(),
        };
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol, update);
    }

    pub fn set_usd_to_gbp(&self, rate: Option<Decimal>) {
        *self.usd_to_gbp.write().unwrap_or_else(PoisonError::into_inner) = rate;
    }

    // simulates the upstream feed going dark
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn last_update(&self, symbol: &str) -> Option<PriceUpdate> {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&symbol.to_ascii_uppercase())
            .cloned()
    }
}

impl PriceOracle for StaticPriceOracle {
    fn current_price(&self, symbol: &str) -> Result<Price, OracleError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(OracleError::Unavailable("price feed offline".to_string()));
        }
        self.last_update(symbol)
            .map(|u| u.price)
            .ok_or_else(|| OracleError::UnknownSymbol(symbol.to_string()))
    }

    fn usd_to_gbp(&self) -> Option<Decimal> {
        *self.usd_to_gbp.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One row of the public price board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetalQuote {
    pub metal_id: MetalId,
    pub symbol: String,
    pub name: String,
    pub price_usd: Price,
    // display only
    pub price_gbp: Option<Decimal>,
}

// metals the oracle cannot price are left off the board rather than failing it
pub fn price_board<'a>(metals: impl IntoIterator<Item = &'a Metal>, oracle: &dyn PriceOracle) -> Vec<MetalQuote> {
    let fx = oracle.usd_to_gbp();
    metals
        .into_iter()
        .filter_map(|metal| match oracle.current_price(&metal.symbol) {
            Ok(price) => Some(MetalQuote {
                metal_id: metal.id,
                symbol: metal.symbol.clone(),
                name: metal.name.clone(),
                price_usd: price,
                price_gbp: fx.map(|rate| (price.value() * rate).round_dp(2)),
            }),
            Err(err) => {
                debug!(symbol = %metal.symbol, %err, "metal left off price board");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gold() -> Metal {
        Metal {
            id: MetalId(1),
            name: "Gold".into(),
            symbol: "XAU".into(),
        }
    }

    #[test]
    fn symbol_lookup_is_case_insensitive() {
        let oracle = StaticPriceOracle::new().with_price("xau", Price::new_unchecked(dec!(2300)));
        assert_eq!(oracle.current_price("XAU").unwrap().value(), dec!(2300));
    }

    #[test]
    fn unknown_and_unhealthy() {
        let oracle = StaticPriceOracle::new().with_price("XAU", Price::new_unchecked(dec!(2300)));
        assert!(matches!(oracle.current_price("XAG"), Err(OracleError::UnknownSymbol(_))));

        oracle.set_healthy(false);
        assert!(matches!(oracle.current_price("XAU"), Err(OracleError::Unavailable(_))));
    }

    #[test]
    fn board_converts_for_display() {
        let oracle = StaticPriceOracle::new().with_price("XAU", Price::new_unchecked(dec!(2300)));
        oracle.set_usd_to_gbp(Some(dec!(0.79)));

        let silver = Metal {
            id: MetalId(2),
            name: "Silver".into(),
            symbol: "XAG".into(),
        };
        let metals = [gold(), silver];
        let board = price_board(metals.iter(), &oracle);

        assert_eq!(board.len(), 1);
        assert_eq!(board[0].price_gbp, Some(dec!(1817.00)));
    }
}
