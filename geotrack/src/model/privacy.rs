//! PrivacyZone data model, per spec §3.
//!
//! Grounded on `cyrinux-network-dmenu`'s `PrivacyMode` enum, which
//! distinguishes fully excluding a location from merely degrading its
//! precision — the same exclude/obfuscate split spec §4.5 requires.

use serde::{Deserialize, Serialize};

use crate::geo::Point;

/// What happens to a fix matched by a privacy zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyAction {
    Obfuscate,
    Exclude,
}

/// A user-defined region where fixes are excluded or obfuscated before any
/// downstream use (store, event bus, or sync).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyZone {
    pub identifier: String,
    pub center: Point,
    pub radius_m: f64,
    pub action: PrivacyAction,
    pub obfuscation_radius_m: f64,
    pub enabled: bool,
}

impl PrivacyZone {
    pub fn new(identifier: impl Into<String>, center: Point, radius_m: f64, action: PrivacyAction) -> Self {
        Self {
            identifier: identifier.into(),
            center,
            radius_m,
            action,
            obfuscation_radius_m: 500.0,
            enabled: true,
        }
    }

    pub fn with_obfuscation_radius(mut self, radius_m: f64) -> Self {
        self.obfuscation_radius_m = radius_m;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_obfuscation_radius_is_500m() {
        let zone = PrivacyZone::new("home", Point::new(0.0, 0.0), 50.0, PrivacyAction::Obfuscate);
        assert_eq!(zone.obfuscation_radius_m, 500.0);
    }
}
