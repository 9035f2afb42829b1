//! Performance tiers and the monitor the coordinator polls.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceLevel {
    Low,
    Medium,
    High,
}

impl PerformanceLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(PerformanceLevel::Low),
            "medium" => Some(PerformanceLevel::Medium),
            "high" => Some(PerformanceLevel::High),
            _ => None,
        }
    }
}

/// How a tier scales effect scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSettings {
    /// Chance that a request survives the random gate.
    pub effect_probability: f64,
    /// Multiplier applied to per-type cooldowns.
    pub cooldown_multiplier: f64,
    /// Multiplier applied to approved intensities.
    pub intensity_multiplier: f64,
    pub target_fps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TierTable {
    pub low: TierSettings,
    pub medium: TierSettings,
    pub high: TierSettings,
}

impl Default for TierTable {
    fn default() -> Self {
        TierTable {
            low: TierSettings {
                effect_probability: 0.35,
                cooldown_multiplier: 2.0,
                intensity_multiplier: 0.6,
                target_fps: 30,
            },
            medium: TierSettings {
                effect_probability: 0.65,
                cooldown_multiplier: 1.4,
                intensity_multiplier: 0.8,
                target_fps: 45,
            },
            high: TierSettings {
                effect_probability: 0.9,
                cooldown_multiplier: 1.0,
                intensity_multiplier: 1.0,
                target_fps: 60,
            },
        }
    }
}

impl TierTable {
    pub fn get(&self, level: PerformanceLevel) -> TierSettings {
        match level {
            PerformanceLevel::Low => self.low,
            PerformanceLevel::Medium => self.medium,
            PerformanceLevel::High => self.high,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, tier) in [("low", self.low), ("medium", self.medium), ("high", self.high)] {
            if !(0.0..=1.0).contains(&tier.effect_probability) {
                return Err(format!("{name}.effectProbability must be within [0, 1]"));
            }
            let cooldown_ok = tier.cooldown_multiplier.is_finite() && tier.cooldown_multiplier > 0.0;
            let intensity_ok =
                tier.intensity_multiplier.is_finite() && tier.intensity_multiplier >= 0.0;
            if !(cooldown_ok && intensity_ok) {
                return Err(format!("{name} multipliers must be finite and positive"));
            }
            if tier.target_fps == 0 {
                return Err(format!("{name}.targetFps must be non-zero"));
            }
        }
        Ok(())
    }
}

/// Source of the device's current performance tier.
pub trait PerformanceMonitor {
    fn performance_level(&self) -> PerformanceLevel;

    fn is_low_end_device(&self) -> bool {
        false
    }

    /// Called once per animation frame with the frame timestamp.
    fn record_frame(&mut self, _now_ms: f64) {}
}

/// Always reports the same tier.
#[derive(Debug, Clone, Copy)]
pub struct FixedPerformance {
    pub level: PerformanceLevel,
    pub low_end: bool,
}

impl FixedPerformance {
    pub fn new(level: PerformanceLevel) -> Self {
        FixedPerformance {
            level,
            low_end: false,
        }
    }
}

impl PerformanceMonitor for FixedPerformance {
    fn performance_level(&self) -> PerformanceLevel {
        self.level
    }

    fn is_low_end_device(&self) -> bool {
        self.low_end
    }
}

/// Classifies the tier from a rolling average of frame intervals.
#[derive(Debug, Clone)]
pub struct FrameRateMonitor {
    samples: VecDeque<f64>,
    capacity: usize,
    last_frame: Option<f64>,
}

impl Default for FrameRateMonitor {
    fn default() -> Self {
        Self::new(60)
    }
}

impl FrameRateMonitor {
    pub fn new(capacity: usize) -> Self {
        FrameRateMonitor {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            last_frame: None,
        }
    }

    /// Average frames per second over the window, if any frames were seen.
    pub fn average_fps(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        (mean > 0.0).then(|| 1000.0 / mean)
    }
}

impl PerformanceMonitor for FrameRateMonitor {
    fn performance_level(&self) -> PerformanceLevel {
        match self.average_fps() {
            None => PerformanceLevel::High,
            Some(fps) if fps >= 50.0 => PerformanceLevel::High,
            Some(fps) if fps >= 30.0 => PerformanceLevel::Medium,
            Some(_) => PerformanceLevel::Low,
        }
    }

    fn record_frame(&mut self, now_ms: f64) {
        if let Some(last) = self.last_frame {
            let delta = now_ms - last;
            // Long gaps are a hidden tab, not a slow device.
            if delta > 0.0 && delta < 1000.0 {
                if self.samples.len() == self.capacity {
                    self.samples.pop_front();
                }
                self.samples.push_back(delta);
            }
        }
        self.last_frame = Some(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels() {
        assert_eq!(PerformanceLevel::parse(" HIGH "), Some(PerformanceLevel::High));
        assert_eq!(PerformanceLevel::parse("ultra"), None);
    }

    #[test]
    fn default_tiers_are_ordered() {
        let table = TierTable::default();
        assert!(table.low.effect_probability < table.medium.effect_probability);
        assert!(table.medium.effect_probability < table.high.effect_probability);
        assert!(table.low.cooldown_multiplier > table.high.cooldown_multiplier);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn frame_rate_monitor_classifies() {
        let mut monitor = FrameRateMonitor::new(10);
        assert_eq!(monitor.performance_level(), PerformanceLevel::High);
        for i in 0..20 {
            monitor.record_frame(i as f64 * 40.0);
        }
        assert_eq!(monitor.performance_level(), PerformanceLevel::Low);
        for i in 20..40 {
            monitor.record_frame(800.0 + (i - 20) as f64 * 25.0);
        }
        assert_eq!(monitor.performance_level(), PerformanceLevel::Medium);
    }

    #[test]
    fn hidden_tab_gaps_are_ignored() {
        let mut monitor = FrameRateMonitor::new(4);
        monitor.record_frame(0.0);
        monitor.record_frame(16.0);
        monitor.record_frame(10_000.0);
        monitor.record_frame(10_016.0);
        let fps = monitor.average_fps().unwrap();
        assert!(fps > 60.0);
    }

    #[test]
    fn nan_multipliers_fail_validation() {
        let mut table = TierTable::default();
        table.high.cooldown_multiplier = f64::NAN;
        assert!(table.validate().is_err());

        let mut table = TierTable::default();
        table.low.intensity_multiplier = f64::INFINITY;
        assert!(table.validate().is_err());
    }
}
