// vault-core: precious metals trading and custody core.
// settlement-first architecture: every cash or custody move is one atomic ledger write.
// prices, feature flags, KYC and notifications come from collaborators behind traits.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, Money, Weight, Price, Bps, Timestamp
//   2.x  ledger/: ledger store: rows, catalog, transactional store with rollback
//   6.x  workflow.rs: 8-stage shipment workflow state machine
//   7.x  config.rs: fees, delivery limits, logging, env presets
//   8.x  engine/: settlement engine + delivery orchestrator
//   9.x  pricing.rs: price oracle interface + static oracle
//   9.2  features.rs: buy/sell/convert feature gate
//   9.3  identity.rs: customer directory (KYC status only)
//   11.x events.rs: post-commit notifications
//   12.x dto.rs: response shapes
//   13.x telemetry.rs: tracing subscriber setup

// core settlement modules
pub mod engine;
pub mod events;
pub mod ledger;
pub mod types;
pub mod workflow;

// integration modules
pub mod config;
pub mod dto;
pub mod features;
pub mod identity;
pub mod pricing;
pub mod telemetry;

// re exports for convenience
pub use engine::*;
pub use events::*;
pub use ledger::*;
pub use types::*;
pub use config::{ConfigError, DeliveryConfig, EngineConfig, Environment, FeeConfig, LoggingConfig};
pub use features::{Feature, FeatureGate, PlatformSettings, SettingsSnapshot};
pub use identity::{CustomerDirectory, InMemoryDirectory, KycStatus};
pub use pricing::{MetalQuote, OracleError, PriceOracle, PriceUpdate, StaticPriceOracle};
pub use workflow::{StageCode, StageStatus, WorkflowError, WorkflowStage};
