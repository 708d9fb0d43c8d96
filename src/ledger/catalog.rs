// 2.2 catalog.rs: reference rows the engine reads but never trades against directly.
// metals are priced by symbol through the oracle. products say how much metal a unit holds.

use crate::types::{MetalId, Money, ProductId, VaultId, Weight};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metal {
    pub id: MetalId,
    pub name: String,
    // XAU, XAG, XPT, XPD
    pub symbol: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Bar,
    Coin,
    Digital,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub metal_id: MetalId,
    pub name: String,
    pub manufacturer: String,
    pub product_type: ProductType,
    pub weight_per_unit: Weight,
    pub premium_per_unit: Money,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultStatus {
    Active,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub name: String,
    pub city: String,
    pub country: String,
    pub status: VaultStatus,
}

impl Vault {
    pub fn accepts_deposits(&self) -> bool {
        self.status == VaultStatus::Active
    }
}
