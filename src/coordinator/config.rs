use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::effect::{EffectType, IntensityTier};
use super::wear::WearConfig;
use crate::performance::{PerformanceLevel, TierTable};

/// Minimum spacing between two effects of the same intensity tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TierSpacing {
    pub low_ms: f64,
    pub medium_ms: f64,
    pub high_ms: f64,
}

impl Default for TierSpacing {
    fn default() -> Self {
        TierSpacing {
            low_ms: 250.0,
            medium_ms: 1_200.0,
            high_ms: 6_000.0,
        }
    }
}

impl TierSpacing {
    pub fn get(&self, tier: IntensityTier) -> f64 {
        match tier {
            IntensityTier::Low => self.low_ms,
            IntensityTier::Medium => self.medium_ms,
            IntensityTier::High => self.high_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoordinatorConfig {
    /// Cap on concurrently active effects.
    pub max_simultaneous: usize,
    /// Cooldown for effect types missing from `type_cooldowns_ms`.
    pub default_cooldown_ms: f64,
    /// Per-type cooldown keyed by canonical effect name (`"TITLE"`, ...).
    pub type_cooldowns_ms: BTreeMap<String, f64>,
    pub tier_spacing: TierSpacing,
    pub medium_threshold: f64,
    pub high_threshold: f64,
    /// Approved effects at or above this raw intensity start a global cooldown.
    pub global_cooldown_threshold: f64,
    pub high_intensity_recovery_ms: f64,
    /// Approved effects at or above this raw intensity trigger a cascade.
    pub cascade_threshold: f64,
    /// Cascades above this intensity put the tube into failure mode.
    pub failure_threshold: f64,
    pub failure_recovery_ms: f64,
    pub cascade_decay_factor: f64,
    /// Cascade level below which the coordinator returns to stable.
    pub cascade_floor: f64,
    pub cascade_decay_min_ms: f64,
    pub cascade_decay_max_ms: f64,
    /// Active effects never completed are dropped after this long.
    pub effect_timeout_ms: f64,
    pub wear_interval_ms: f64,
    pub wear: WearConfig,
    /// Thermal level change that triggers a `thermalChange` broadcast.
    pub thermal_report_step: f64,
    /// Per-tick ripple probability at full power-supply wear.
    pub ripple_chance: f64,
    pub ripple_frequency_hz: f64,
    pub background_base: f64,
    pub tiers: TierTable,
    pub initial_performance: PerformanceLevel,
    /// Fixed RNG seed; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let type_cooldowns_ms = [
            (EffectType::Title, 4_000.0),
            (EffectType::Nav, 1_500.0),
            (EffectType::Background, 8_000.0),
            (EffectType::Ambient, 2_500.0),
            (EffectType::MiniWindow, 3_000.0),
            (EffectType::Scanline, 1_000.0),
        ]
        .into_iter()
        .map(|(t, ms)| (t.as_str().to_string(), ms))
        .collect();

        CoordinatorConfig {
            max_simultaneous: 2,
            default_cooldown_ms: 2_000.0,
            type_cooldowns_ms,
            tier_spacing: TierSpacing::default(),
            medium_threshold: 0.4,
            high_threshold: 0.7,
            global_cooldown_threshold: 0.85,
            high_intensity_recovery_ms: 3_000.0,
            cascade_threshold: 0.9,
            failure_threshold: 0.7,
            failure_recovery_ms: 4_000.0,
            cascade_decay_factor: 0.7,
            cascade_floor: 0.1,
            cascade_decay_min_ms: 2_000.0,
            cascade_decay_max_ms: 5_000.0,
            effect_timeout_ms: 6_000.0,
            wear_interval_ms: 500.0,
            wear: WearConfig::default(),
            thermal_report_step: 0.05,
            ripple_chance: 0.2,
            ripple_frequency_hz: 120.0,
            background_base: 0.35,
            tiers: TierTable::default(),
            initial_performance: PerformanceLevel::High,
            seed: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn cooldown_for(&self, effect: &EffectType) -> f64 {
        self.type_cooldowns_ms
            .get(effect.as_str())
            .copied()
            .unwrap_or(self.default_cooldown_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_simultaneous == 0 {
            return Err("maxSimultaneous must be at least 1".into());
        }
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(format!("{name} must be within [0, 1], got {v}"))
            }
        };
        unit("mediumThreshold", self.medium_threshold)?;
        unit("highThreshold", self.high_threshold)?;
        unit("globalCooldownThreshold", self.global_cooldown_threshold)?;
        unit("cascadeThreshold", self.cascade_threshold)?;
        unit("failureThreshold", self.failure_threshold)?;
        unit("cascadeFloor", self.cascade_floor)?;
        unit("rippleChance", self.ripple_chance)?;
        unit("backgroundBase", self.background_base)?;
        if self.medium_threshold > self.high_threshold {
            return Err("mediumThreshold exceeds highThreshold".into());
        }
        if !(self.cascade_decay_factor > 0.0 && self.cascade_decay_factor < 1.0) {
            return Err("cascadeDecayFactor must be within (0, 1)".into());
        }
        let durations = [
            ("defaultCooldownMs", self.default_cooldown_ms),
            ("highIntensityRecoveryMs", self.high_intensity_recovery_ms),
            ("failureRecoveryMs", self.failure_recovery_ms),
            ("tierSpacing.lowMs", self.tier_spacing.low_ms),
            ("tierSpacing.mediumMs", self.tier_spacing.medium_ms),
            ("tierSpacing.highMs", self.tier_spacing.high_ms),
            ("thermalReportStep", self.thermal_report_step),
            ("rippleFrequencyHz", self.ripple_frequency_hz),
        ];
        if let Some((name, v)) = durations.iter().find(|(_, v)| !(v.is_finite() && *v >= 0.0)) {
            return Err(format!("{name} must be finite and non-negative, got {v}"));
        }
        let (lo, hi) = (self.cascade_decay_min_ms, self.cascade_decay_max_ms);
        if !(lo.is_finite() && hi.is_finite() && lo > 0.0 && lo <= hi) {
            return Err(format!("cascade decay delay range [{lo}, {hi}] is empty"));
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !(positive(self.wear_interval_ms) && positive(self.effect_timeout_ms)) {
            return Err("intervals must be finite and positive".into());
        }
        if let Some((name, ms)) = self
            .type_cooldowns_ms
            .iter()
            .find(|(_, ms)| !(ms.is_finite() && **ms >= 0.0))
        {
            return Err(format!("cooldown for {name} must be finite and non-negative ({ms})"));
        }
        self.wear.validate()?;
        self.tiers.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(CoordinatorConfig::default().validate().is_ok());
    }

    #[test]
    fn unknown_types_use_default_cooldown() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.cooldown_for(&EffectType::Title), 4_000.0);
        assert_eq!(
            config.cooldown_for(&EffectType::Custom("SPARK".into())),
            config.default_cooldown_ms
        );
    }

    #[test]
    fn rejects_bad_decay_range() {
        let config = CoordinatorConfig {
            cascade_decay_min_ms: 6_000.0,
            ..CoordinatorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"maxSimultaneous": 3, "tierSpacing": {"highMs": 10}}"#)
                .unwrap();
        assert_eq!(config.max_simultaneous, 3);
        assert_eq!(config.tier_spacing.high_ms, 10.0);
        assert_eq!(config.tier_spacing.low_ms, 250.0);
        assert_eq!(config.cooldown_for(&EffectType::Nav), 1_500.0);
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut nan_multiplier = CoordinatorConfig::default();
        nan_multiplier.tiers.high.cooldown_multiplier = f64::NAN;
        let mut nan_rate = CoordinatorConfig::default();
        nan_rate.wear.rates.magnetic_wear = f64::NAN;
        let mut nan_initial = CoordinatorConfig::default();
        nan_initial.wear.initial.tracking_wear = f64::NAN;
        let mut nan_cooldown = CoordinatorConfig::default();
        nan_cooldown.type_cooldowns_ms.insert("TITLE".into(), f64::NAN);
        let configs = [
            nan_multiplier,
            nan_rate,
            nan_initial,
            nan_cooldown,
            CoordinatorConfig {
                cascade_decay_min_ms: f64::NAN,
                ..CoordinatorConfig::default()
            },
            CoordinatorConfig {
                cascade_decay_max_ms: f64::INFINITY,
                ..CoordinatorConfig::default()
            },
            CoordinatorConfig {
                effect_timeout_ms: f64::INFINITY,
                ..CoordinatorConfig::default()
            },
            CoordinatorConfig {
                failure_recovery_ms: f64::NAN,
                ..CoordinatorConfig::default()
            },
        ];
        for config in configs {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }
}
