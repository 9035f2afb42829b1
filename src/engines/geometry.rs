//! Raster geometry: barrel distortion, convergence error, picture breathing
//! and magnetic tilt.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::{merge_config, unit_range, EngineFrame, EngineKind, PhysicsEngine};
use crate::coordinator::GlobalState;
use crate::error::{CrtError, Result};
use crate::events::{CrtEvent, GeometryDistortion};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct GeometryConfig {
    /// Barrel coefficient of a fresh tube.
    pub barrel: f64,
    /// Extra barrel at full magnetic wear.
    pub barrel_wear_gain: f64,
    /// Extra barrel at full cascade level.
    pub cascade_warp: f64,
    /// Convergence error at full convergence wear.
    pub convergence_max_px: f64,
    /// Convergence error added at full thermal level.
    pub thermal_drift_px: f64,
    /// Picture scale swing at full ripple.
    pub breathing_depth: f64,
    /// Ripple amplitude decay rate, per second.
    pub breathing_decay: f64,
    /// Beat frequency between supply ripple and refresh.
    pub breathing_hz: f64,
    /// Raster tilt at full magnetic wear.
    pub tilt_max_deg: f64,
    /// Distortion change that triggers a `geometryDistortion` broadcast.
    pub report_threshold: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        GeometryConfig {
            barrel: 0.08,
            barrel_wear_gain: 0.1,
            cascade_warp: 0.15,
            convergence_max_px: 2.5,
            thermal_drift_px: 1.0,
            breathing_depth: 0.012,
            breathing_decay: 4.0,
            breathing_hz: 2.0,
            tilt_max_deg: 0.6,
            report_threshold: 0.05,
        }
    }
}

impl GeometryConfig {
    fn validate(&self) -> Result<()> {
        unit_range("barrel", self.barrel)?;
        unit_range("reportThreshold", self.report_threshold)?;
        unit_range("breathingDepth", self.breathing_depth)?;
        let non_negative = [
            self.barrel_wear_gain,
            self.cascade_warp,
            self.convergence_max_px,
            self.thermal_drift_px,
            self.breathing_decay,
            self.breathing_hz,
            self.tilt_max_deg,
        ];
        if non_negative.iter().any(|v| *v < 0.0 || !v.is_finite()) {
            return Err(CrtError::InvalidConfig(
                "geometry gains must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }

    fn max_convergence(&self) -> f64 {
        (self.convergence_max_px + self.thermal_drift_px).max(f64::EPSILON)
    }
}

#[derive(Debug, Clone)]
pub struct GeometryEngine {
    config: GeometryConfig,
    elapsed_s: f64,
    thermal_level: f64,
    ripple: f64,
    barrel: f64,
    convergence: (f64, f64),
    breathing: f64,
    tilt_deg: f64,
    distortion: f64,
    last_reported: Option<f64>,
}

impl GeometryEngine {
    pub fn new(config: GeometryConfig) -> Self {
        GeometryEngine {
            barrel: config.barrel,
            config,
            elapsed_s: 0.0,
            thermal_level: 0.0,
            ripple: 0.0,
            convergence: (0.0, 0.0),
            breathing: 1.0,
            tilt_deg: 0.0,
            distortion: 0.0,
            last_reported: None,
        }
    }

    /// Red/blue beam misalignment in pixels.
    pub fn convergence_error(&self) -> (f64, f64) {
        self.convergence
    }

    /// Overall distortion in `[0, 1]`.
    pub fn distortion_level(&self) -> f64 {
        self.distortion
    }

    pub fn breathing(&self) -> f64 {
        self.breathing
    }

    fn distortion_for(&self, convergence_px: f64) -> f64 {
        (self.barrel + 0.3 * convergence_px / self.config.max_convergence() + 0.2 * self.ripple)
            .clamp(0.0, 1.0)
    }
}

impl PhysicsEngine for GeometryEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Geometry
    }

    fn init(&mut self, state: &GlobalState) -> Result<()> {
        self.config.validate()?;
        self.thermal_level = state.thermal_level;
        self.barrel = self.config.barrel;
        self.last_reported = None;
        Ok(())
    }

    fn configure(&mut self, params: &serde_json::Value) -> Result<()> {
        let next: GeometryConfig = merge_config(&self.config, params)?;
        next.validate()?;
        self.config = next;
        Ok(())
    }

    fn configuration(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn advance(&mut self, frame: &mut EngineFrame<'_>) {
        let dt_s = frame.dt_ms.max(0.0) / 1000.0;
        self.elapsed_s += dt_s;
        self.ripple *= (-self.config.breathing_decay * dt_s).exp();

        let state = frame.state;
        let c = &self.config;
        self.barrel = (c.barrel
            + state.wear.magnetic_wear * c.barrel_wear_gain
            + state.cascade_level * c.cascade_warp)
            .clamp(0.0, 1.0);

        // The misalignment vector slowly precesses as the yoke warms up.
        let magnitude =
            state.wear.convergence_wear * c.convergence_max_px + self.thermal_level * c.thermal_drift_px;
        let angle = self.elapsed_s * 0.1;
        self.convergence = (magnitude * angle.cos(), magnitude * angle.sin());

        let wobble = (TAU * c.breathing_hz * self.elapsed_s).sin();
        self.breathing =
            1.0 + c.breathing_depth * (self.ripple * wobble + state.background_intensity * 0.3);

        self.tilt_deg = state.wear.magnetic_wear * c.tilt_max_deg * (self.elapsed_s * 0.05).sin();

        self.distortion = self.distortion_for(magnitude);
        let moved = self
            .last_reported
            .map_or(true, |last| (self.distortion - last).abs() >= self.config.report_threshold);
        if moved {
            self.last_reported = Some(self.distortion);
            frame.out.push(CrtEvent::GeometryDistortion(GeometryDistortion {
                level: self.distortion,
                convergence_x: self.convergence.0,
                convergence_y: self.convergence.1,
            }));
        }

        let sink = &mut *frame.sink;
        sink.set_number("--crt-barrel", self.barrel);
        sink.set_length_px("--crt-convergence-x", self.convergence.0);
        sink.set_length_px("--crt-convergence-y", self.convergence.1);
        sink.set_number("--crt-breathing", self.breathing);
        sink.set_property(
            "--crt-tilt",
            &format!("{}deg", crate::style::format_number(self.tilt_deg)),
        );
    }

    fn on_event(&mut self, event: &CrtEvent, _out: &mut Vec<CrtEvent>) {
        match event {
            CrtEvent::PowerSupplyRipple(r) => self.ripple = self.ripple.max(r.magnitude.clamp(0.0, 1.0)),
            CrtEvent::ThermalChange(t) => self.thermal_level = t.level.clamp(0.0, 1.0),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::WearPatterns;
    use crate::engines::testing::run_frames;
    use crate::events::{PowerSupplyRipple, ThermalChange};

    fn engine() -> GeometryEngine {
        let mut engine = GeometryEngine::new(GeometryConfig::default());
        engine.init(&GlobalState::default()).unwrap();
        engine
    }

    fn distortion_events(out: &[CrtEvent]) -> usize {
        out.iter()
            .filter(|e| matches!(e, CrtEvent::GeometryDistortion(_)))
            .count()
    }

    #[test]
    fn first_frame_reports_then_stays_quiet() {
        let mut engine = engine();
        let (_, out) = run_frames(&mut engine, &GlobalState::default(), 30, 16.0);
        assert_eq!(distortion_events(&out), 1);
    }

    #[test]
    fn cascade_warp_is_reported() {
        let mut engine = engine();
        let calm = GlobalState::default();
        run_frames(&mut engine, &calm, 1, 16.0);
        let before = engine.distortion_level();

        let warped = GlobalState {
            cascade_level: 1.0,
            ..GlobalState::default()
        };
        let (sink, out) = run_frames(&mut engine, &warped, 1, 16.0);
        assert_eq!(distortion_events(&out), 1);
        assert!(engine.distortion_level() > before + 0.1);
        assert!(sink.number("--crt-barrel").unwrap() > 0.2);
    }

    #[test]
    fn convergence_grows_with_wear_and_heat() {
        let mut engine = engine();
        let state = GlobalState {
            wear: WearPatterns {
                convergence_wear: 0.4,
                ..WearPatterns::default()
            },
            ..GlobalState::default()
        };
        run_frames(&mut engine, &state, 1, 16.0);
        let (x, y) = engine.convergence_error();
        let cold = (x * x + y * y).sqrt();
        assert!((cold - 1.0).abs() < 1e-9);

        engine.on_event(
            &CrtEvent::ThermalChange(ThermalChange { level: 1.0, delta: 1.0 }),
            &mut Vec::new(),
        );
        run_frames(&mut engine, &state, 1, 16.0);
        let (x, y) = engine.convergence_error();
        assert!(((x * x + y * y).sqrt() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn ripple_makes_the_picture_breathe() {
        let mut engine = engine();
        let state = GlobalState::default();
        engine.on_event(
            &CrtEvent::PowerSupplyRipple(PowerSupplyRipple {
                magnitude: 1.0,
                frequency_hz: 120.0,
            }),
            &mut Vec::new(),
        );
        let mut swing: f64 = 0.0;
        for _ in 0..15 {
            run_frames(&mut engine, &state, 1, 16.0);
            swing = swing.max((engine.breathing() - 1.0).abs());
        }
        assert!(swing > 0.005);

        run_frames(&mut engine, &state, 300, 16.0);
        assert!((engine.breathing() - 1.0).abs() < 0.001);
    }

    #[test]
    fn negative_gain_fails_init() {
        let mut engine = GeometryEngine::new(GeometryConfig {
            tilt_max_deg: -2.0,
            ..GeometryConfig::default()
        });
        assert!(engine.init(&GlobalState::default()).is_err());
    }
}
