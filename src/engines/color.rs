//! NTSC colour artefacts: chroma bleeding, dot crawl and thermal hue drift.

use serde::{Deserialize, Serialize};

use super::{finite, merge_config, non_negative, unit_range, EngineFrame, EngineKind, PhysicsEngine};
use crate::coordinator::GlobalState;
use crate::error::{CrtError, Result};
use crate::events::CrtEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ColorConfig {
    pub bleed_base: f64,
    pub bleed_max: f64,
    /// Visible dot-crawl cycle rate; the pattern repeats every four fields.
    pub dot_crawl_hz: f64,
    /// Hue offset in degrees at full thermal level.
    pub hue_drift_deg: f64,
    /// How fast the hue follows its thermal target, per second.
    pub hue_settle_rate: f64,
    pub saturation_base: f64,
    /// Saturation lost at full phosphor decay.
    pub saturation_loss: f64,
    /// Extra bleed per unit of geometry distortion.
    pub geometry_coupling: f64,
    /// Extra bleed per unit of cascade level.
    pub cascade_coupling: f64,
}

impl Default for ColorConfig {
    fn default() -> Self {
        ColorConfig {
            bleed_base: 0.15,
            bleed_max: 0.8,
            dot_crawl_hz: 14.985,
            hue_drift_deg: 12.0,
            hue_settle_rate: 1.5,
            saturation_base: 1.0,
            saturation_loss: 0.4,
            geometry_coupling: 0.5,
            cascade_coupling: 0.4,
        }
    }
}

impl ColorConfig {
    fn validate(&self) -> Result<()> {
        unit_range("bleedBase", self.bleed_base)?;
        unit_range("bleedMax", self.bleed_max)?;
        unit_range("saturationLoss", self.saturation_loss)?;
        if self.bleed_base > self.bleed_max {
            return Err(CrtError::InvalidConfig("bleedBase exceeds bleedMax".into()));
        }
        non_negative("dotCrawlHz", self.dot_crawl_hz)?;
        non_negative("hueSettleRate", self.hue_settle_rate)?;
        non_negative("saturationBase", self.saturation_base)?;
        non_negative("geometryCoupling", self.geometry_coupling)?;
        non_negative("cascadeCoupling", self.cascade_coupling)?;
        finite("hueDriftDeg", self.hue_drift_deg)
    }
}

/// Snapshot of the engine's colour output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChromaState {
    pub bleed: f64,
    pub hue_shift_deg: f64,
    pub dot_crawl_phase: f64,
    pub saturation: f64,
}

#[derive(Debug, Clone)]
pub struct ColorBleedEngine {
    config: ColorConfig,
    crawl_phase: f64,
    hue_shift: f64,
    hue_target: f64,
    /// Last distortion level reported by the geometry engine.
    geometry_level: f64,
    chroma: ChromaState,
}

impl ColorBleedEngine {
    pub fn new(config: ColorConfig) -> Self {
        ColorBleedEngine {
            config,
            crawl_phase: 0.0,
            hue_shift: 0.0,
            hue_target: 0.0,
            geometry_level: 0.0,
            chroma: ChromaState::default(),
        }
    }

    pub fn chroma_state(&self) -> ChromaState {
        self.chroma
    }

    pub fn geometry_level(&self) -> f64 {
        self.geometry_level
    }

    fn bleed_for(&self, state: &GlobalState) -> f64 {
        let c = &self.config;
        (c.bleed_base
            + self.geometry_level * c.geometry_coupling
            + state.cascade_level * c.cascade_coupling
            + state.wear.convergence_wear * 0.3)
            .clamp(0.0, c.bleed_max)
    }
}

impl PhysicsEngine for ColorBleedEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Color
    }

    fn init(&mut self, state: &GlobalState) -> Result<()> {
        self.config.validate()?;
        self.hue_target = state.thermal_level * self.config.hue_drift_deg;
        self.hue_shift = self.hue_target;
        self.crawl_phase = 0.0;
        Ok(())
    }

    fn configure(&mut self, params: &serde_json::Value) -> Result<()> {
        let next: ColorConfig = merge_config(&self.config, params)?;
        next.validate()?;
        self.config = next;
        Ok(())
    }

    fn configuration(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn advance(&mut self, frame: &mut EngineFrame<'_>) {
        let dt_s = frame.dt_ms.max(0.0) / 1000.0;
        self.crawl_phase = (self.crawl_phase + dt_s * self.config.dot_crawl_hz).fract();

        let settle = 1.0 - (-self.config.hue_settle_rate * dt_s).exp();
        self.hue_shift += (self.hue_target - self.hue_shift) * settle;

        let saturation = (self.config.saturation_base
            * (1.0 - frame.state.wear.phosphor_decay * self.config.saturation_loss))
            .max(0.0);

        self.chroma = ChromaState {
            bleed: self.bleed_for(frame.state),
            hue_shift_deg: self.hue_shift,
            dot_crawl_phase: self.crawl_phase,
            saturation,
        };

        let sink = &mut *frame.sink;
        sink.set_number("--ntsc-chroma-bleeding", self.chroma.bleed);
        sink.set_property(
            "--ntsc-hue-shift",
            &format!("{}deg", crate::style::format_number(self.chroma.hue_shift_deg)),
        );
        sink.set_number("--ntsc-dot-crawl", self.chroma.dot_crawl_phase);
        sink.set_number("--ntsc-saturation", self.chroma.saturation);
    }

    fn on_event(&mut self, event: &CrtEvent, _out: &mut Vec<CrtEvent>) {
        match event {
            CrtEvent::GeometryDistortion(g) => self.geometry_level = g.level.clamp(0.0, 1.0),
            CrtEvent::ThermalChange(t) => {
                self.hue_target = t.level.clamp(0.0, 1.0) * self.config.hue_drift_deg
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::testing::run_frames;
    use crate::events::{GeometryDistortion, ThermalChange};

    fn engine() -> ColorBleedEngine {
        let mut engine = ColorBleedEngine::new(ColorConfig::default());
        engine.init(&GlobalState::default()).unwrap();
        engine
    }

    #[test]
    fn bleed_follows_geometry_distortion() {
        let mut engine = engine();
        let state = GlobalState::default();
        run_frames(&mut engine, &state, 1, 16.0);
        let calm = engine.chroma_state().bleed;

        engine.on_event(
            &CrtEvent::GeometryDistortion(GeometryDistortion {
                level: 0.6,
                convergence_x: 0.0,
                convergence_y: 0.0,
            }),
            &mut Vec::new(),
        );
        let (sink, _) = run_frames(&mut engine, &state, 1, 16.0);
        let distorted = engine.chroma_state().bleed;
        assert!((distorted - calm - 0.3).abs() < 1e-9);
        assert!((sink.number("--ntsc-chroma-bleeding").unwrap() - distorted).abs() < 1e-4);
    }

    #[test]
    fn bleed_is_capped() {
        let mut engine = engine();
        let state = GlobalState {
            cascade_level: 1.0,
            ..GlobalState::default()
        };
        engine.on_event(
            &CrtEvent::GeometryDistortion(GeometryDistortion {
                level: 1.0,
                convergence_x: 0.0,
                convergence_y: 0.0,
            }),
            &mut Vec::new(),
        );
        run_frames(&mut engine, &state, 1, 16.0);
        assert_eq!(engine.chroma_state().bleed, 0.8);
    }

    #[test]
    fn hue_settles_toward_thermal_target() {
        let mut engine = engine();
        engine.on_event(
            &CrtEvent::ThermalChange(ThermalChange {
                level: 0.5,
                delta: 0.5,
            }),
            &mut Vec::new(),
        );
        let state = GlobalState::default();
        run_frames(&mut engine, &state, 1, 100.0);
        let early = engine.chroma_state().hue_shift_deg;
        assert!(early > 0.0 && early < 6.0);
        let (sink, _) = run_frames(&mut engine, &state, 200, 50.0);
        assert!((engine.chroma_state().hue_shift_deg - 6.0).abs() < 0.01);
        assert!(sink.property("--ntsc-hue-shift").unwrap().ends_with("deg"));
    }

    #[test]
    fn dot_crawl_wraps() {
        let mut engine = engine();
        run_frames(&mut engine, &GlobalState::default(), 100, 33.0);
        let phase = engine.chroma_state().dot_crawl_phase;
        assert!((0.0..1.0).contains(&phase));
    }

    #[test]
    fn invalid_patch_is_rejected() {
        let mut engine = engine();
        let err = engine
            .configure(&serde_json::json!({"bleedBase": 0.9, "bleedMax": 0.5}))
            .unwrap_err();
        assert!(matches!(err, CrtError::InvalidConfig(_)));
        assert_eq!(engine.configuration()["bleedMax"], 0.8);
    }

    #[test]
    fn non_finite_rates_are_rejected() {
        for config in [
            ColorConfig { dot_crawl_hz: f64::NAN, ..ColorConfig::default() },
            ColorConfig { hue_settle_rate: f64::INFINITY, ..ColorConfig::default() },
            ColorConfig { hue_drift_deg: f64::NAN, ..ColorConfig::default() },
        ] {
            assert!(config.validate().is_err(), "{config:?}");
        }
        assert!(ColorConfig::default().validate().is_ok());
    }
}
