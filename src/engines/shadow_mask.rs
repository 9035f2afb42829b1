//! Shadow-mask heating, doming and colour purity.
//!
//! Bright content heats the mask; past a threshold it bows toward the beam
//! ("doming") and beams land on the wrong phosphor.

use serde::{Deserialize, Serialize};

use super::{merge_config, unit_range, EngineFrame, EngineKind, PhysicsEngine};
use crate::coordinator::GlobalState;
use crate::error::{CrtError, Result};
use crate::events::CrtEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaskType {
    ApertureGrille,
    ShadowMask,
    SlotMask,
}

impl MaskType {
    pub const ALL: [MaskType; 3] = [MaskType::ApertureGrille, MaskType::ShadowMask, MaskType::SlotMask];

    pub fn class_name(self) -> &'static str {
        match self {
            MaskType::ApertureGrille => "crt-mask-aperture-grille",
            MaskType::ShadowMask => "crt-mask-shadow-mask",
            MaskType::SlotMask => "crt-mask-slot-mask",
        }
    }

    /// Tensioned grilles resist doming.
    fn doming_factor(self) -> f64 {
        match self {
            MaskType::ApertureGrille => 0.3,
            MaskType::SlotMask => 0.6,
            MaskType::ShadowMask => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ShadowMaskConfig {
    pub mask_type: MaskType,
    pub pitch_px: f64,
    pub opacity_base: f64,
    /// Temperature gained per second at full load.
    pub heating_rate: f64,
    /// Newtonian cooling coefficient, per second.
    pub cooling_rate: f64,
    pub ambient: f64,
    /// Temperature above which the mask starts to dome.
    pub doming_threshold: f64,
    /// Doming displacement at full temperature.
    pub doming_gain_px: f64,
    pub purity_gain: f64,
    pub background_weight: f64,
    pub cascade_weight: f64,
    /// Instant temperature spike per unit of cascade level.
    pub cascade_spike: f64,
}

impl Default for ShadowMaskConfig {
    fn default() -> Self {
        ShadowMaskConfig {
            mask_type: MaskType::ShadowMask,
            pitch_px: 3.0,
            opacity_base: 0.35,
            heating_rate: 0.8,
            cooling_rate: 0.5,
            ambient: 0.0,
            doming_threshold: 0.6,
            doming_gain_px: 1.5,
            purity_gain: 0.8,
            background_weight: 0.7,
            cascade_weight: 1.0,
            cascade_spike: 0.2,
        }
    }
}

impl ShadowMaskConfig {
    fn validate(&self) -> Result<()> {
        unit_range("opacityBase", self.opacity_base)?;
        unit_range("ambient", self.ambient)?;
        unit_range("cascadeSpike", self.cascade_spike)?;
        if !(0.0..1.0).contains(&self.doming_threshold) {
            return Err(CrtError::InvalidConfig(format!(
                "domingThreshold must be within [0, 1), got {}",
                self.doming_threshold
            )));
        }
        if !(self.pitch_px.is_finite() && self.pitch_px > 0.0) {
            return Err(CrtError::InvalidConfig(format!(
                "pitchPx must be finite and positive, got {}",
                self.pitch_px
            )));
        }
        let non_negative = [
            self.heating_rate,
            self.cooling_rate,
            self.doming_gain_px,
            self.purity_gain,
            self.background_weight,
            self.cascade_weight,
        ];
        if non_negative.iter().any(|v| *v < 0.0 || !v.is_finite()) {
            return Err(CrtError::InvalidConfig(
                "mask rates must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskThermalState {
    /// Normalised mask temperature in `[0, 1]`.
    pub temperature: f64,
    pub doming: f64,
    pub purity_error: f64,
}

#[derive(Debug, Clone)]
pub struct ShadowMaskEngine {
    config: ShadowMaskConfig,
    thermal: MaskThermalState,
}

impl ShadowMaskEngine {
    pub fn new(config: ShadowMaskConfig) -> Self {
        ShadowMaskEngine {
            config,
            thermal: MaskThermalState::default(),
        }
    }

    pub fn thermal_state(&self) -> MaskThermalState {
        self.thermal
    }

    pub fn mask_type(&self) -> MaskType {
        self.config.mask_type
    }

    fn load(&self, state: &GlobalState) -> f64 {
        (state.background_intensity * self.config.background_weight
            + state.cascade_level * self.config.cascade_weight
            + state.thermal_level * 0.3)
            .clamp(0.0, 1.0)
    }

    fn settle_doming(&mut self, magnetic_wear: f64) {
        let c = &self.config;
        let excess = ((self.thermal.temperature - c.doming_threshold) / (1.0 - c.doming_threshold)).max(0.0);
        self.thermal.doming = excess * c.doming_gain_px * c.mask_type.doming_factor();
        let normalised = if c.doming_gain_px > 0.0 {
            self.thermal.doming / c.doming_gain_px
        } else {
            0.0
        };
        self.thermal.purity_error = normalised * c.purity_gain * (1.0 + magnetic_wear);
    }
}

impl PhysicsEngine for ShadowMaskEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::ShadowMask
    }

    fn init(&mut self, state: &GlobalState) -> Result<()> {
        self.config.validate()?;
        self.thermal = MaskThermalState {
            temperature: self.config.ambient.max(state.thermal_level * 0.5),
            ..MaskThermalState::default()
        };
        self.settle_doming(state.wear.magnetic_wear);
        Ok(())
    }

    fn configure(&mut self, params: &serde_json::Value) -> Result<()> {
        let next: ShadowMaskConfig = merge_config(&self.config, params)?;
        next.validate()?;
        self.config = next;
        Ok(())
    }

    fn configuration(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn advance(&mut self, frame: &mut EngineFrame<'_>) {
        let dt_s = frame.dt_ms.max(0.0) / 1000.0;
        let state = frame.state;

        let heating = self.config.heating_rate * self.load(state);
        let cooling = self.config.cooling_rate * (self.thermal.temperature - self.config.ambient);
        self.thermal.temperature = (self.thermal.temperature + (heating - cooling) * dt_s).clamp(0.0, 1.0);
        self.settle_doming(state.wear.magnetic_wear);

        let opacity = (self.config.opacity_base * (1.0 + 0.5 * state.wear.phosphor_decay)).clamp(0.0, 1.0);

        let sink = &mut *frame.sink;
        sink.set_length_px("--mask-pitch", self.config.pitch_px);
        sink.set_number("--mask-opacity", opacity);
        sink.set_length_px("--mask-doming", self.thermal.doming);
        sink.set_number("--mask-purity-shift", self.thermal.purity_error);
        for mask in MaskType::ALL {
            sink.set_class(mask.class_name(), mask == self.config.mask_type);
        }
    }

    fn on_event(&mut self, event: &CrtEvent, _out: &mut Vec<CrtEvent>) {
        if let CrtEvent::Cascade(c) = event {
            let spike = c.level.clamp(0.0, 1.0) * self.config.cascade_spike;
            self.thermal.temperature = (self.thermal.temperature + spike).min(1.0);
        }
    }
}
