use serde::{Deserialize, Serialize};

use super::wear::WearPatterns;
use crate::performance::PerformanceLevel;

/// Global tube mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Stable,
    Cascade,
    Failure,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Stable => "stable",
            Mode::Cascade => "cascade",
            Mode::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    pub x: f64,
    pub y: f64,
    pub active: bool,
}

/// Shared simulation state read by every engine and consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    pub mode: Mode,
    pub thermal_level: f64,
    pub cascade_level: f64,
    pub background_intensity: f64,
    pub performance_level: PerformanceLevel,
    pub target_fps: u32,
    pub wear: WearPatterns,
    pub global_wear: f64,
    pub cursor: CursorState,
    pub audio_amplitude: f64,
    pub motion_paused: bool,
    /// Highest scaled intensity among currently active effects.
    pub max_active_intensity: f64,
}

impl Default for GlobalState {
    fn default() -> Self {
        GlobalState {
            mode: Mode::Stable,
            thermal_level: 0.0,
            cascade_level: 0.0,
            background_intensity: 0.0,
            performance_level: PerformanceLevel::High,
            target_fps: 60,
            wear: WearPatterns::default(),
            global_wear: 0.0,
            cursor: CursorState::default(),
            audio_amplitude: 0.0,
            motion_paused: false,
            max_active_intensity: 0.0,
        }
    }
}
