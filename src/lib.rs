//! CRT degradation effects for a static page.
//!
//! The platform-independent core (coordinator, engines, resource registry,
//! event bus) builds and tests on the host. The `wasm` module binds it to the
//! DOM when targeting `wasm32`.

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod engines;
pub mod error;
pub mod events;
pub mod performance;
pub mod resource;
pub mod scheduler;
pub mod style;
pub mod system;

pub use config::CrtConfig;
pub use coordinator::{EffectCoordinator, EffectType, GlobalState, Mode};
pub use engines::{EngineKind, PhysicsEngine};
pub use error::{CrtError, Result};
pub use events::{CrtEvent, EventBus};
pub use resource::{Platform, ResourceKind, ResourceMeta, ResourceRegistry};
pub use system::CrtSystem;

// Only compile wasm-specific code when targeting wasm32.
#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::CrtRuntime;
