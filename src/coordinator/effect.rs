//! Effect identities, intensity tiers and rejection reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of visual effect a consumer asks to run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectType {
    Title,
    Nav,
    Background,
    Ambient,
    MiniWindow,
    Scanline,
    Custom(String),
}

impl EffectType {
    /// Case-insensitive; unknown names become [`EffectType::Custom`].
    pub fn parse(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase().replace(&['-', ' '][..], "_");
        match upper.as_str() {
            "TITLE" => EffectType::Title,
            "NAV" => EffectType::Nav,
            "BACKGROUND" => EffectType::Background,
            "AMBIENT" => EffectType::Ambient,
            "MINI_WINDOW" | "MINIWINDOW" => EffectType::MiniWindow,
            "SCANLINE" => EffectType::Scanline,
            _ => EffectType::Custom(upper),
        }
    }

    /// Canonical upper-case name, also the key in cooldown tables.
    pub fn as_str(&self) -> &str {
        match self {
            EffectType::Title => "TITLE",
            EffectType::Nav => "NAV",
            EffectType::Background => "BACKGROUND",
            EffectType::Ambient => "AMBIENT",
            EffectType::MiniWindow => "MINI_WINDOW",
            EffectType::Scanline => "SCANLINE",
            EffectType::Custom(name) => name,
        }
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EffectType {
    fn from(name: &str) -> Self {
        EffectType::parse(name)
    }
}

/// Coarse intensity band; each band has its own minimum spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntensityTier {
    Low,
    Medium,
    High,
}

impl IntensityTier {
    pub fn classify(intensity: f64, medium_threshold: f64, high_threshold: f64) -> Self {
        if intensity >= high_threshold {
            IntensityTier::High
        } else if intensity >= medium_threshold {
            IntensityTier::Medium
        } else {
            IntensityTier::Low
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    InvalidIntensity,
    MotionPaused,
    ProbabilityGate,
    GlobalCooldown,
    TypeCooldown,
    IntensityCooldown,
    CapacityReached,
}

/// Key of an entry in the active set. Every approval gets its own `seq`,
/// so repeated runs of one effect never share an entry; within one
/// (type, source, system) the oldest run sorts first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ActiveKey {
    pub effect_type: EffectType,
    pub source: String,
    pub system_id: String,
    pub seq: u64,
}

impl ActiveKey {
    pub fn matches(&self, effect_type: &EffectType, source: &str, system_id: &str) -> bool {
        &self.effect_type == effect_type && self.source == source && self.system_id == system_id
    }
}

/// An approved request that has not completed or timed out yet.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectRequest {
    pub effect_type: EffectType,
    pub intensity: f64,
    pub source: String,
    pub system_id: String,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActiveEffect {
    pub request: EffectRequest,
    /// Intensity after the performance tier's multiplier.
    pub scaled_intensity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(EffectType::parse("title"), EffectType::Title);
        assert_eq!(EffectType::parse("Mini-Window"), EffectType::MiniWindow);
        assert_eq!(
            EffectType::parse("vhs tracking"),
            EffectType::Custom("VHS_TRACKING".into())
        );
        assert_eq!(EffectType::parse("vhs tracking").as_str(), "VHS_TRACKING");
    }

    #[test]
    fn tiers_split_on_thresholds() {
        assert_eq!(IntensityTier::classify(0.1, 0.4, 0.7), IntensityTier::Low);
        assert_eq!(IntensityTier::classify(0.4, 0.4, 0.7), IntensityTier::Medium);
        assert_eq!(IntensityTier::classify(0.95, 0.4, 0.7), IntensityTier::High);
    }
}
