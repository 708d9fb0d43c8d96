// 7.0 config.rs: all settings in one place. fees, delivery, logging.
// 7.1 FeeConfig holds every charge the engine levies. no volume tiers.

use crate::types::{Bps, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/** 7.2: fee settings. trading fees in bps, delivery charges in USD */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    // Fee on gross value when selling metal
    pub sell_fee_bps: u32,
    // Fee on gross value when converting metal to cash
    pub convert_fee_bps: u32,
    // Flat handling charge per item in a delivery request
    pub handling_fee_per_item: Decimal,
    // Shipping for ordinary carriers
    pub standard_shipping_fee: Decimal,
    // Shipping for armoured carriers
    pub premium_shipping_fee: Decimal,
    // Carriers billed at the premium rate (lowercase)
    pub premium_carriers: Vec<String>,
    // Insurance on aggregate current value of shipped items
    pub insurance_bps: u32,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            sell_fee_bps: 50,     // 0.5%
            convert_fee_bps: 200, // 2%
            handling_fee_per_item: Decimal::new(50, 0),
            standard_shipping_fee: Decimal::new(150, 0),
            premium_shipping_fee: Decimal::new(500, 0),
            premium_carriers: vec!["brinks".to_string()],
            insurance_bps: 100, // 1%
        }
    }
}

impl FeeConfig {
    pub fn sell_fee(&self) -> Bps {
        Bps::new(self.sell_fee_bps as i32)
    }

    pub fn convert_fee(&self) -> Bps {
        Bps::new(self.convert_fee_bps as i32)
    }

    pub fn insurance(&self) -> Bps {
        Bps::new(self.insurance_bps as i32)
    }

    pub fn handling_fee(&self, item_count: usize) -> Money {
        Money::new(self.handling_fee_per_item * Decimal::from(item_count as u64))
    }

    // carrier is matched case-insensitively
    pub fn shipping_fee(&self, carrier: &str) -> Money {
        let premium = self
            .premium_carriers
            .iter()
            .any(|c| c.eq_ignore_ascii_case(carrier.trim()));
        if premium {
            Money::new(self.premium_shipping_fee)
        } else {
            Money::new(self.standard_shipping_fee)
        }
    }
}

// Delivery request limits and defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    // Most distinct items one request may carry
    pub max_items_per_request: usize,
    // Location stamped on the first history entry
    pub origin_location: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_items_per_request: 50,
            origin_location: "Main Vault".to_string(),
        }
    }
}

// tracing-subscriber settings. RUST_LOG wins over `filter` when set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub with_target: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,vault_core=debug".to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fees: FeeConfig,
    pub delivery: DeliveryConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    // Sandbox preset: no delivery charges, quiet logs
    pub fn sandbox() -> Self {
        let mut config = Self::default();
        config.fees.handling_fee_per_item = Decimal::ZERO;
        config.fees.insurance_bps = 0;
        config.logging.filter = "warn".to_string();
        config
    }

    // Production preset: no ansi colours for log shippers
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.filter = "info".to_string();
        config.logging.ansi = false;
        config
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fees = &self.fees;
        if fees.sell_fee_bps >= 10_000 || fees.convert_fee_bps >= 10_000 {
            return Err(ConfigError::InvalidFees {
                reason: "Trading fee must be below 100%".to_string(),
            });
        }

        if fees.insurance_bps > 10_000 {
            return Err(ConfigError::InvalidFees {
                reason: "Insurance cannot exceed item value".to_string(),
            });
        }

        let charges = [
            fees.handling_fee_per_item,
            fees.standard_shipping_fee,
            fees.premium_shipping_fee,
        ];
        if charges.iter().any(|c| *c < Decimal::ZERO) {
            return Err(ConfigError::InvalidFees {
                reason: "Delivery charges cannot be negative".to_string(),
            });
        }

        if self.delivery.max_items_per_request == 0 {
            return Err(ConfigError::InvalidDelivery {
                reason: "Need room for at least 1 item per request".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid fees: {reason}")]
    InvalidFees { reason: String },

    #[error("Invalid delivery settings: {reason}")]
    InvalidDelivery { reason: String },

    #[error("Config parse error: {0}")]
    Parse(String),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Sandbox,
    Production,
}

impl Environment {
    pub fn config(&self) -> EngineConfig {
        match self {
            Environment::Development => EngineConfig::default(),
            Environment::Sandbox => EngineConfig::sandbox(),
            Environment::Production => EngineConfig::production(),
        }
    }
}
