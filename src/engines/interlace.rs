//! Interlaced field alternation with cursor-driven motion detection.
//!
//! Moving content on an interlaced tube combs: the two fields were scanned
//! 1/60 s apart. Cursor motion stands in for "moving content" here.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{finite, merge_config, non_negative, unit_range, EngineFrame, EngineKind, PhysicsEngine};
use crate::coordinator::GlobalState;
use crate::error::{CrtError, Result};
use crate::events::CrtEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Even,
    Odd,
}

impl Field {
    fn flip(self) -> Self {
        match self {
            Field::Even => Field::Odd,
            Field::Odd => Field::Even,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct InterlaceConfig {
    pub field_rate_hz: f64,
    /// Vertical offset of the odd field.
    pub line_offset_px: f64,
    pub combing_strength: f64,
    /// Motion gained per pixel of cursor travel.
    pub motion_sensitivity: f64,
    /// Exponential decay rate of the motion level, per second.
    pub motion_decay: f64,
    /// Motion level above which the `crt-motion` class is set.
    pub motion_threshold: f64,
    pub flicker_base: f64,
    /// Maximum tracking jitter at full tracking wear.
    pub tracking_jitter_px: f64,
    /// Flicker added per unit of power-supply ripple.
    pub ripple_flicker: f64,
}

impl Default for InterlaceConfig {
    fn default() -> Self {
        InterlaceConfig {
            field_rate_hz: 59.94,
            line_offset_px: 0.5,
            combing_strength: 0.6,
            motion_sensitivity: 0.004,
            motion_decay: 3.0,
            motion_threshold: 0.15,
            flicker_base: 0.03,
            tracking_jitter_px: 1.5,
            ripple_flicker: 0.5,
        }
    }
}

impl InterlaceConfig {
    fn validate(&self) -> Result<()> {
        if !(self.field_rate_hz > 0.0 && self.field_rate_hz <= 240.0) {
            return Err(CrtError::InvalidConfig(format!(
                "fieldRateHz must be within (0, 240], got {}",
                self.field_rate_hz
            )));
        }
        unit_range("combingStrength", self.combing_strength)?;
        unit_range("motionThreshold", self.motion_threshold)?;
        unit_range("flickerBase", self.flicker_base)?;
        non_negative("motionSensitivity", self.motion_sensitivity)?;
        non_negative("motionDecay", self.motion_decay)?;
        non_negative("trackingJitterPx", self.tracking_jitter_px)?;
        non_negative("rippleFlicker", self.ripple_flicker)?;
        finite("lineOffsetPx", self.line_offset_px)
    }
}

#[derive(Debug, Clone)]
pub struct InterlacingEngine {
    config: InterlaceConfig,
    field: Field,
    /// Fractional progress toward the next field.
    phase: f64,
    fields_elapsed: u64,
    motion: f64,
    last_cursor: Option<(f64, f64)>,
    ripple: f64,
}

impl InterlacingEngine {
    pub fn new(config: InterlaceConfig) -> Self {
        InterlacingEngine {
            config,
            field: Field::Even,
            phase: 0.0,
            fields_elapsed: 0,
            motion: 0.0,
            last_cursor: None,
            ripple: 0.0,
        }
    }

    pub fn current_field(&self) -> Field {
        self.field
    }

    pub fn motion_level(&self) -> f64 {
        self.motion
    }

    pub fn is_motion_detected(&self) -> bool {
        self.motion > self.config.motion_threshold
    }

    pub fn fields_elapsed(&self) -> u64 {
        self.fields_elapsed
    }

    fn track_cursor(&mut self, x: f64, y: f64, active: bool) {
        if !active {
            self.last_cursor = None;
            return;
        }
        if let Some((lx, ly)) = self.last_cursor {
            let travel = ((x - lx).powi(2) + (y - ly).powi(2)).sqrt();
            self.motion = (self.motion + travel * self.config.motion_sensitivity).min(1.0);
        }
        self.last_cursor = Some((x, y));
    }
}

impl PhysicsEngine for InterlacingEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Interlacing
    }

    fn init(&mut self, state: &GlobalState) -> Result<()> {
        self.config.validate()?;
        self.field = Field::Even;
        self.phase = 0.0;
        self.motion = 0.0;
        self.last_cursor = state
            .cursor
            .active
            .then_some((state.cursor.x, state.cursor.y));
        Ok(())
    }

    fn configure(&mut self, params: &serde_json::Value) -> Result<()> {
        let next: InterlaceConfig = merge_config(&self.config, params)?;
        next.validate()?;
        self.config = next;
        Ok(())
    }

    fn configuration(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn advance(&mut self, frame: &mut EngineFrame<'_>) {
        let dt_s = frame.dt_ms.max(0.0) / 1000.0;

        self.phase += dt_s * self.config.field_rate_hz;
        let whole = self.phase.floor();
        if whole >= 1.0 {
            self.phase -= whole;
            self.fields_elapsed += whole as u64;
            if (whole as u64) % 2 == 1 {
                self.field = self.field.flip();
            }
        }

        self.motion *= (-self.config.motion_decay * dt_s).exp();
        self.ripple *= (-5.0 * dt_s).exp();

        let state = frame.state;
        let combing = ((self.motion + state.cascade_level * 0.3) * self.config.combing_strength)
            .clamp(0.0, 1.0);
        let flicker = (self.config.flicker_base * (1.0 + state.global_wear)
            + self.ripple * self.config.ripple_flicker)
            .clamp(0.0, 1.0);
        let jitter = if state.wear.tracking_wear > 0.0 {
            frame.rng.gen_range(-1.0_f64..=1.0)
                * state.wear.tracking_wear
                * self.config.tracking_jitter_px
        } else {
            0.0
        };
        let base_offset = match self.field {
            Field::Even => 0.0,
            Field::Odd => self.config.line_offset_px,
        };

        let sink = &mut *frame.sink;
        sink.set_number(
            "--interlace-field",
            if self.field == Field::Odd { 1.0 } else { 0.0 },
        );
        sink.set_length_px("--interlace-offset", base_offset + jitter);
        sink.set_number("--interlace-combing", combing);
        sink.set_number("--interlace-flicker", flicker);
        sink.set_class("crt-field-odd", self.field == Field::Odd);
        sink.set_class("crt-motion", self.is_motion_detected());
    }

    fn on_event(&mut self, event: &CrtEvent, _out: &mut Vec<CrtEvent>) {
        match event {
            CrtEvent::CursorUpdate(c) => self.track_cursor(c.x, c.y, c.active),
            CrtEvent::PowerSupplyRipple(r) => self.ripple = (self.ripple + r.magnitude).min(1.0),
            _ => {}
        }
    }
}
