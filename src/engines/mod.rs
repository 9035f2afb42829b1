//! Physics engines: independently installable simulations that turn the
//! shared wear/thermal state into CSS output.
//!
//! Engines never call each other. They talk only through [`CrtEvent`]s that
//! the system re-broadcasts, so any subset can be installed.

mod color;
mod geometry;
mod interlace;
mod shadow_mask;

pub use color::{ChromaState, ColorBleedEngine, ColorConfig};
pub use geometry::{GeometryConfig, GeometryEngine};
pub use interlace::{Field, InterlaceConfig, InterlacingEngine};
pub use shadow_mask::{MaskThermalState, MaskType, ShadowMaskConfig, ShadowMaskEngine};

use rand::rngs::SmallRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::coordinator::GlobalState;
use crate::error::{CrtError, Result};
use crate::events::CrtEvent;
use crate::style::StyleSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineKind {
    Interlacing,
    Color,
    Geometry,
    ShadowMask,
}

impl EngineKind {
    pub const ALL: [EngineKind; 4] = [
        EngineKind::Interlacing,
        EngineKind::Color,
        EngineKind::Geometry,
        EngineKind::ShadowMask,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Interlacing => "interlacing",
            EngineKind::Color => "color",
            EngineKind::Geometry => "geometry",
            EngineKind::ShadowMask => "shadowMask",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace(&['-', '_'][..], "").as_str() {
            "interlacing" | "interlace" => Some(EngineKind::Interlacing),
            "color" | "colour" | "ntsc" => Some(EngineKind::Color),
            "geometry" => Some(EngineKind::Geometry),
            "shadowmask" | "mask" => Some(EngineKind::ShadowMask),
            _ => None,
        }
    }
}

/// Everything an engine may read or write during one frame.
pub struct EngineFrame<'a> {
    /// Milliseconds since this engine's previous frame.
    pub dt_ms: f64,
    pub now_ms: f64,
    pub state: &'a GlobalState,
    pub sink: &'a mut dyn StyleSink,
    /// Events to publish on the bus after the frame.
    pub out: &'a mut Vec<CrtEvent>,
    pub rng: &'a mut SmallRng,
}

pub trait PhysicsEngine {
    fn kind(&self) -> EngineKind;

    /// Prepare internal state from the current global state.
    fn init(&mut self, state: &GlobalState) -> Result<()>;

    /// Merge a partial JSON object into the configuration.
    fn configure(&mut self, params: &serde_json::Value) -> Result<()>;

    fn configuration(&self) -> serde_json::Value;

    /// Advance the engine's clock and write its CSS output.
    fn advance(&mut self, frame: &mut EngineFrame<'_>);

    /// React to a cross-engine notification.
    fn on_event(&mut self, _event: &CrtEvent, _out: &mut Vec<CrtEvent>) {}
}

/// Overlay `patch` on `current` and deserialize the result.
///
/// `patch` must be a JSON object; unknown keys are rejected by the target
/// type's `deny_unknown_fields`.
pub fn merge_config<T>(current: &T, patch: &serde_json::Value) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let serde_json::Value::Object(patch) = patch else {
        return Err(CrtError::InvalidConfig(
            "engine parameters must be an object".into(),
        ));
    };
    let mut merged = serde_json::to_value(current)?;
    if let serde_json::Value::Object(base) = &mut merged {
        for (key, value) in patch {
            base.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(merged).map_err(|e| CrtError::InvalidConfig(e.to_string()))
}

pub(crate) fn unit_range(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CrtError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

/// Rejects negative and non-finite values.
pub(crate) fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CrtError::InvalidConfig(format!(
            "{name} must be finite and non-negative, got {value}"
        )))
    }
}

pub(crate) fn finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CrtError::InvalidConfig(format!("{name} must be finite, got {value}")))
    }
}

/// Which engines to install, and their starting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnginesConfig {
    pub interlacing: Option<InterlaceConfig>,
    pub color: Option<ColorConfig>,
    pub geometry: Option<GeometryConfig>,
    pub shadow_mask: Option<ShadowMaskConfig>,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        EnginesConfig {
            interlacing: Some(InterlaceConfig::default()),
            color: Some(ColorConfig::default()),
            geometry: Some(GeometryConfig::default()),
            shadow_mask: Some(ShadowMaskConfig::default()),
        }
    }
}

/// Installed engines; an absent or failed engine is `None`.
#[derive(Default)]
pub struct EngineSet {
    interlacing: Option<InterlacingEngine>,
    color: Option<ColorBleedEngine>,
    geometry: Option<GeometryEngine>,
    shadow_mask: Option<ShadowMaskEngine>,
}

fn install<E: PhysicsEngine>(mut engine: E, state: &GlobalState) -> Option<E> {
    match engine.init(state) {
        Ok(()) => {
            debug!(engine = engine.kind().name(), "engine installed");
            Some(engine)
        }
        Err(err) => {
            warn!(engine = engine.kind().name(), %err, "engine unavailable");
            None
        }
    }
}

impl EngineSet {
    pub fn from_config(config: &EnginesConfig, state: &GlobalState) -> Self {
        let mut set = EngineSet::default();
        if let Some(c) = &config.interlacing {
            set.interlacing = install(InterlacingEngine::new(c.clone()), state);
        }
        if let Some(c) = &config.color {
            set.color = install(ColorBleedEngine::new(c.clone()), state);
        }
        if let Some(c) = &config.geometry {
            set.geometry = install(GeometryEngine::new(c.clone()), state);
        }
        if let Some(c) = &config.shadow_mask {
            set.shadow_mask = install(ShadowMaskEngine::new(c.clone()), state);
        }
        set
    }

    pub fn interlacing(&self) -> Option<&InterlacingEngine> {
        self.interlacing.as_ref()
    }

    pub fn color(&self) -> Option<&ColorBleedEngine> {
        self.color.as_ref()
    }

    pub fn geometry(&self) -> Option<&GeometryEngine> {
        self.geometry.as_ref()
    }

    pub fn shadow_mask(&self) -> Option<&ShadowMaskEngine> {
        self.shadow_mask.as_ref()
    }

    pub fn get(&self, kind: EngineKind) -> Option<&dyn PhysicsEngine> {
        match kind {
            EngineKind::Interlacing => self.interlacing.as_ref().map(|e| e as &dyn PhysicsEngine),
            EngineKind::Color => self.color.as_ref().map(|e| e as &dyn PhysicsEngine),
            EngineKind::Geometry => self.geometry.as_ref().map(|e| e as &dyn PhysicsEngine),
            EngineKind::ShadowMask => self.shadow_mask.as_ref().map(|e| e as &dyn PhysicsEngine),
        }
    }

    pub fn get_mut(&mut self, kind: EngineKind) -> Option<&mut dyn PhysicsEngine> {
        match kind {
            EngineKind::Interlacing => self
                .interlacing
                .as_mut()
                .map(|e| e as &mut dyn PhysicsEngine),
            EngineKind::Color => self.color.as_mut().map(|e| e as &mut dyn PhysicsEngine),
            EngineKind::Geometry => self.geometry.as_mut().map(|e| e as &mut dyn PhysicsEngine),
            EngineKind::ShadowMask => self
                .shadow_mask
                .as_mut()
                .map(|e| e as &mut dyn PhysicsEngine),
        }
    }

    pub fn installed(&self) -> Vec<EngineKind> {
        EngineKind::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_some())
            .collect()
    }

    /// Install (or replace) an engine after start-up.
    pub fn insert_interlacing(&mut self, engine: InterlacingEngine, state: &GlobalState) -> bool {
        self.interlacing = install(engine, state);
        self.interlacing.is_some()
    }

    pub fn insert_color(&mut self, engine: ColorBleedEngine, state: &GlobalState) -> bool {
        self.color = install(engine, state);
        self.color.is_some()
    }

    pub fn insert_geometry(&mut self, engine: GeometryEngine, state: &GlobalState) -> bool {
        self.geometry = install(engine, state);
        self.geometry.is_some()
    }

    pub fn insert_shadow_mask(&mut self, engine: ShadowMaskEngine, state: &GlobalState) -> bool {
        self.shadow_mask = install(engine, state);
        self.shadow_mask.is_some()
    }

    pub fn remove(&mut self, kind: EngineKind) -> bool {
        match kind {
            EngineKind::Interlacing => self.interlacing.take().is_some(),
            EngineKind::Color => self.color.take().is_some(),
            EngineKind::Geometry => self.geometry.take().is_some(),
            EngineKind::ShadowMask => self.shadow_mask.take().is_some(),
        }
    }

    pub fn advance_all(&mut self, frame: &mut EngineFrame<'_>) {
        for kind in EngineKind::ALL {
            if let Some(engine) = self.get_mut(kind) {
                engine.advance(frame);
            }
        }
    }

    pub fn broadcast(&mut self, event: &CrtEvent, out: &mut Vec<CrtEvent>) {
        for kind in EngineKind::ALL {
            if let Some(engine) = self.get_mut(kind) {
                engine.on_event(event, out);
            }
        }
    }
}
