//! AdaptiveController, per spec §4.6.
//!
//! Grounded directly on `prefetch::adaptive::{config, coordinator,
//! strategy}`'s telemetry-to-configuration decision precedence: the
//! teacher's flight-phase → prefetch-strategy selection is the same shape as
//! this module's speed/battery/activity → acquisition-config selection, down
//! to the debounce-on-no-change behavior from
//! `prefetch::adaptive::phase_detector`.

use std::time::Duration;

use crate::config::DesiredAccuracy;
use crate::model::ActivityType;

/// A named bundle of acquisition parameters selected by speed and battery
/// (spec glossary: "Adaptive tier").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionConfig {
    pub desired_accuracy: DesiredAccuracy,
    pub distance_filter_m: f64,
    pub update_interval: Duration,
    pub heartbeat_interval: Duration,
    pub gps_enabled: bool,
}

/// One row of the speed-tier lookup table (spec §4.6 step 5).
#[derive(Debug, Clone, Copy)]
pub struct SpeedTier {
    pub max_speed_mps: f64,
    pub config: AcquisitionConfig,
}

#[derive(Debug, Clone)]
pub struct SpeedTiers {
    pub stationary: AcquisitionConfig,
    pub walking: SpeedTier,
    pub city: SpeedTier,
    pub suburban: SpeedTier,
    pub highway: AcquisitionConfig,
}

impl Default for SpeedTiers {
    fn default() -> Self {
        let base = AcquisitionConfig {
            desired_accuracy: DesiredAccuracy::Medium,
            distance_filter_m: 10.0,
            update_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(60),
            gps_enabled: true,
        };
        Self {
            stationary: AcquisitionConfig {
                desired_accuracy: DesiredAccuracy::Low,
                distance_filter_m: 0.0,
                update_interval: Duration::from_secs(120),
                heartbeat_interval: Duration::from_secs(300),
                gps_enabled: true,
            },
            walking: SpeedTier {
                max_speed_mps: 2.0,
                config: AcquisitionConfig {
                    distance_filter_m: 5.0,
                    update_interval: Duration::from_secs(10),
                    ..base
                },
            },
            city: SpeedTier {
                max_speed_mps: 14.0,
                config: AcquisitionConfig {
                    desired_accuracy: DesiredAccuracy::High,
                    distance_filter_m: 15.0,
                    update_interval: Duration::from_secs(3),
                    ..base
                },
            },
            suburban: SpeedTier {
                max_speed_mps: 28.0,
                config: AcquisitionConfig {
                    desired_accuracy: DesiredAccuracy::High,
                    distance_filter_m: 25.0,
                    update_interval: Duration::from_secs(2),
                    ..base
                },
            },
            highway: AcquisitionConfig {
                desired_accuracy: DesiredAccuracy::Navigation,
                distance_filter_m: 50.0,
                update_interval: Duration::from_secs(1),
                heartbeat_interval: Duration::from_secs(30),
                gps_enabled: true,
            },
        }
    }
}

impl SpeedTiers {
    fn lookup(&self, speed_mps: f64) -> AcquisitionConfig {
        if speed_mps <= 0.2 {
            self.stationary
        } else if speed_mps <= self.walking.max_speed_mps {
            self.walking.config
        } else if speed_mps <= self.city.max_speed_mps {
            self.city.config
        } else if speed_mps <= self.suburban.max_speed_mps {
            self.suburban.config
        } else {
            self.highway
        }
    }
}

/// Inputs consulted by the decision precedence in spec §4.6.
#[derive(Debug, Clone, Copy)]
pub struct Telemetry {
    pub speed_mps: f64,
    pub battery_pct: u8,
    pub charging: bool,
    pub is_moving: bool,
    pub activity: Option<ActivityType>,
    pub in_geofence: bool,
    pub time_since_stationary: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct AdaptivePolicy {
    pub speed_tiers: SpeedTiers,
    pub critical_battery_threshold: u8,
    pub low_battery_threshold: u8,
    pub stationary_delay: Duration,
    pub stationary_gps_off: bool,
    pub geofence_optimization: bool,
    pub charging_config: AcquisitionConfig,
    pub critical_battery_config: AcquisitionConfig,
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self {
            speed_tiers: SpeedTiers::default(),
            critical_battery_threshold: 10,
            low_battery_threshold: 25,
            stationary_delay: Duration::from_secs(600),
            stationary_gps_off: true,
            geofence_optimization: true,
            charging_config: AcquisitionConfig {
                desired_accuracy: DesiredAccuracy::Navigation,
                distance_filter_m: 5.0,
                update_interval: Duration::from_secs(1),
                heartbeat_interval: Duration::from_secs(30),
                gps_enabled: true,
            },
            critical_battery_config: AcquisitionConfig {
                desired_accuracy: DesiredAccuracy::Lowest,
                distance_filter_m: 100.0,
                update_interval: Duration::from_secs(300),
                heartbeat_interval: Duration::from_secs(900),
                gps_enabled: false,
            },
        }
    }
}

/// Maps telemetry to a target acquisition configuration, debouncing output
/// so the acquisition layer is only reconfigured when something changed.
pub struct AdaptiveController {
    policy: AdaptivePolicy,
    applied: Option<AcquisitionConfig>,
}

impl AdaptiveController {
    pub fn new(policy: AdaptivePolicy) -> Self {
        Self {
            policy,
            applied: None,
        }
    }

    pub fn currently_applied(&self) -> Option<AcquisitionConfig> {
        self.applied
    }

    /// Evaluate telemetry and return `Some(config)` only if it differs from
    /// the currently-applied configuration (spec §4.6 "Debounce").
    pub fn evaluate(&mut self, telemetry: Telemetry) -> Option<AcquisitionConfig> {
        let mut config = self.decide(telemetry);

        if telemetry.battery_pct <= self.policy.low_battery_threshold
            && !telemetry.charging
            && matches!(config.desired_accuracy, DesiredAccuracy::Navigation | DesiredAccuracy::High)
        {
            config.desired_accuracy = DesiredAccuracy::Medium;
        }

        if self.applied == Some(config) {
            None
        } else {
            self.applied = Some(config);
            Some(config)
        }
    }

    fn decide(&self, telemetry: Telemetry) -> AcquisitionConfig {
        // 1. Charging wins outright.
        if telemetry.charging {
            return self.policy.charging_config;
        }

        // 2. Critical battery and not charging.
        if telemetry.battery_pct <= self.policy.critical_battery_threshold {
            return self.policy.critical_battery_config;
        }

        // 3. Long-stationary with GPS-off enabled.
        if !telemetry.is_moving && self.policy.stationary_gps_off {
            if let Some(elapsed) = telemetry.time_since_stationary {
                if elapsed >= self.policy.stationary_delay {
                    let mut config = self.policy.speed_tiers.stationary;
                    config.gps_enabled = false;
                    return config;
                }
            }
        }

        // 4. In geofence with optimization enabled.
        if telemetry.in_geofence && self.policy.geofence_optimization {
            let mut config = self.policy.speed_tiers.stationary;
            config.heartbeat_interval = config.heartbeat_interval.max(Duration::from_secs(600));
            return config;
        }

        // 5. Speed-tier lookup.
        self.policy.speed_tiers.lookup(telemetry.speed_mps)
    }
}
