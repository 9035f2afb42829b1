//! Wear simulation: slowly drifting degradation scalars that make effect
//! intensity feel organic over a session.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Inclusive `[min, max]` clamp of one wear scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    pub const fn new(min: f64, max: f64) -> Self {
        Bound { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Largest magnitude reachable inside the bound.
    pub fn magnitude(&self) -> f64 {
        self.min.abs().max(self.max.abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WearPatterns {
    pub magnetic_wear: f64,
    /// Signed: negative is a cold tube, positive an overheated one.
    pub thermal_stress: f64,
    pub power_supply_wear: f64,
    pub convergence_wear: f64,
    pub tracking_wear: f64,
    pub phosphor_decay: f64,
}

impl Default for WearPatterns {
    fn default() -> Self {
        WearPatterns {
            magnetic_wear: 0.05,
            thermal_stress: 0.0,
            power_supply_wear: 0.04,
            convergence_wear: 0.03,
            tracking_wear: 0.06,
            phosphor_decay: 0.02,
        }
    }
}

impl WearPatterns {
    pub fn values(&self) -> [f64; 6] {
        [
            self.magnetic_wear,
            self.thermal_stress,
            self.power_supply_wear,
            self.convergence_wear,
            self.tracking_wear,
            self.phosphor_decay,
        ]
    }

    /// Mean absolute wear across all scalars.
    pub fn global_wear(&self) -> f64 {
        let values = self.values();
        values.iter().map(|v| v.abs()).sum::<f64>() / values.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WearBounds {
    pub magnetic_wear: Bound,
    pub thermal_stress: Bound,
    pub power_supply_wear: Bound,
    pub convergence_wear: Bound,
    pub tracking_wear: Bound,
    pub phosphor_decay: Bound,
}

impl Default for WearBounds {
    fn default() -> Self {
        WearBounds {
            magnetic_wear: Bound::new(0.0, 0.6),
            thermal_stress: Bound::new(-0.5, 0.5),
            power_supply_wear: Bound::new(0.0, 0.5),
            convergence_wear: Bound::new(0.0, 0.4),
            tracking_wear: Bound::new(0.0, 0.7),
            phosphor_decay: Bound::new(0.0, 0.3),
        }
    }
}

impl WearBounds {
    pub fn all(&self) -> [Bound; 6] {
        [
            self.magnetic_wear,
            self.thermal_stress,
            self.power_supply_wear,
            self.convergence_wear,
            self.tracking_wear,
            self.phosphor_decay,
        ]
    }

    pub fn contains(&self, wear: &WearPatterns) -> bool {
        self.all()
            .iter()
            .zip(wear.values())
            .all(|(bound, value)| bound.contains(value))
    }
}

/// Maximum per-tick increments, plus the thermal random walk parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WearRates {
    pub magnetic_wear: f64,
    pub power_supply_wear: f64,
    pub convergence_wear: f64,
    pub tracking_wear: f64,
    pub phosphor_decay: f64,
    /// Largest signed thermal step per tick.
    pub thermal_step: f64,
    /// Fraction of thermal stress shed each tick.
    pub thermal_reversion: f64,
    /// Extra heating per tick at full cascade level.
    pub cascade_heating: f64,
}

impl Default for WearRates {
    fn default() -> Self {
        WearRates {
            magnetic_wear: 0.0004,
            power_supply_wear: 0.0003,
            convergence_wear: 0.0002,
            tracking_wear: 0.0005,
            phosphor_decay: 0.0001,
            thermal_step: 0.02,
            thermal_reversion: 0.05,
            cascade_heating: 0.015,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WearConfig {
    pub initial: WearPatterns,
    pub bounds: WearBounds,
    pub rates: WearRates,
}

impl WearConfig {
    pub fn validate(&self) -> Result<(), String> {
        for bound in self.bounds.all() {
            if !(bound.min.is_finite() && bound.max.is_finite() && bound.min <= bound.max) {
                return Err(format!("wear bound [{}, {}] is not a finite range", bound.min, bound.max));
            }
        }
        if let Some(v) = self.initial.values().into_iter().find(|v| !v.is_finite()) {
            return Err(format!("initial wear must be finite, got {v}"));
        }
        let r = self.rates;
        let rates = [
            r.magnetic_wear,
            r.power_supply_wear,
            r.convergence_wear,
            r.tracking_wear,
            r.phosphor_decay,
            r.thermal_step,
            r.cascade_heating,
        ];
        if let Some(v) = rates.into_iter().find(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(format!("wear rates must be finite and non-negative, got {v}"));
        }
        if !(0.0..=1.0).contains(&self.rates.thermal_reversion) {
            return Err("thermalReversion must be within [0, 1]".into());
        }
        Ok(())
    }
}

/// Owns the wear scalars and advances them once per wear tick.
#[derive(Debug, Clone)]
pub struct WearSimulator {
    wear: WearPatterns,
    bounds: WearBounds,
    rates: WearRates,
    ticks: u64,
}

impl WearSimulator {
    pub fn new(config: &WearConfig) -> Self {
        let mut sim = WearSimulator {
            wear: config.initial,
            bounds: config.bounds,
            rates: config.rates,
            ticks: 0,
        };
        sim.clamp_all();
        sim
    }

    pub fn wear(&self) -> &WearPatterns {
        &self.wear
    }

    pub fn bounds(&self) -> &WearBounds {
        &self.bounds
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn global_wear(&self) -> f64 {
        self.wear.global_wear()
    }

    /// Thermal stress magnitude normalised to `[0, 1]`.
    pub fn thermal_level(&self) -> f64 {
        let magnitude = self.bounds.thermal_stress.magnitude();
        if magnitude <= 0.0 {
            return 0.0;
        }
        (self.wear.thermal_stress.abs() / magnitude).clamp(0.0, 1.0)
    }

    pub fn tick<R: Rng>(&mut self, rng: &mut R, cascade_level: f64) {
        let r = self.rates;
        self.wear.magnetic_wear += rng.gen::<f64>() * r.magnetic_wear;
        self.wear.power_supply_wear += rng.gen::<f64>() * r.power_supply_wear;
        self.wear.convergence_wear += rng.gen::<f64>() * r.convergence_wear;
        self.wear.tracking_wear += rng.gen::<f64>() * r.tracking_wear;
        self.wear.phosphor_decay += rng.gen::<f64>() * r.phosphor_decay;

        let step = (rng.gen::<f64>() * 2.0 - 1.0) * r.thermal_step;
        let reverted = self.wear.thermal_stress * (1.0 - r.thermal_reversion);
        self.wear.thermal_stress =
            reverted + step + cascade_level.clamp(0.0, 1.0) * r.cascade_heating;

        self.clamp_all();
        self.ticks += 1;
    }

    fn clamp_all(&mut self) {
        let b = self.bounds;
        let w = &mut self.wear;
        w.magnetic_wear = b.magnetic_wear.clamp(w.magnetic_wear);
        w.thermal_stress = b.thermal_stress.clamp(w.thermal_stress);
        w.power_supply_wear = b.power_supply_wear.clamp(w.power_supply_wear);
        w.convergence_wear = b.convergence_wear.clamp(w.convergence_wear);
        w.tracking_wear = b.tracking_wear.clamp(w.tracking_wear);
        w.phosphor_decay = b.phosphor_decay.clamp(w.phosphor_decay);
    }
}
