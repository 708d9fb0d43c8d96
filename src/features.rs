// 9.2 features.rs: trading kill switches.
// flipped out of band by an admin; the engine asks on every call and never caches the answer.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Buying,
    Selling,
    Converting,
}

impl Feature {
    // customer-facing text when the switch is off
    pub fn unavailable_message(&self) -> &'static str {
        match self {
            Feature::Buying => "Purchasing is temporarily unavailable. Please contact an administrator.",
            Feature::Selling => "Selling is temporarily unavailable. Please try again later or contact support.",
            Feature::Converting => "Converting to cash is temporarily unavailable. Please contact an administrator.",
        }
    }
}

pub trait FeatureGate: Send + Sync {
    fn is_enabled(&self, feature: Feature) -> bool;
}

/// Platform-wide flags. all on by default.
#[derive(Debug)]
pub struct PlatformSettings {
    buying: AtomicBool,
    selling: AtomicBool,
    converting: AtomicBool,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            buying: AtomicBool::new(true),
            selling: AtomicBool::new(true),
            converting: AtomicBool::new(true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub metals_buying_enabled: bool,
    pub metals_selling_enabled: bool,
    pub metals_convert_enabled: bool,
}

impl PlatformSettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, feature: Feature) -> &AtomicBool {
        match feature {
            Feature::Buying => &self.buying,
            Feature::Selling => &self.selling,
            Feature::Converting => &self.converting,
        }
    }

    pub fn set(&self, feature: Feature, enabled: bool) {
        let previous = self.flag(feature).swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(?feature, enabled, "platform setting changed");
        }
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            metals_buying_enabled: self.is_enabled(Feature::Buying),
            metals_selling_enabled: self.is_enabled(Feature::Selling),
            metals_convert_enabled: self.is_enabled(Feature::Converting),
        }
    }
}

impl FeatureGate for PlatformSettings {
    fn is_enabled(&self, feature: Feature) -> bool {
        self.flag(feature).load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_on_and_toggle_independently() {
        let settings = PlatformSettings::new();
        assert!(settings.is_enabled(Feature::Buying));

        settings.set(Feature::Selling, false);
        let snap = settings.snapshot();
        assert!(snap.metals_buying_enabled);
        assert!(!snap.metals_selling_enabled);
        assert!(snap.metals_convert_enabled);
    }

    #[test]
    fn messages_name_the_action() {
        assert!(Feature::Converting.unavailable_message().starts_with("Converting to cash"));
    }
}
