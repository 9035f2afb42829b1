#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use crt_wasm::clock::{Clock, ManualClock};
use crt_wasm::coordinator::{CoordinatorConfig, EffectCoordinator};
use crt_wasm::error::{CrtError, Result};
use crt_wasm::events::EventBus;
use crt_wasm::{Platform, ResourceKind};

/// Disposal call log shared between a test and the platform it handed away.
pub type CallLog = Rc<RefCell<Vec<(ResourceKind, String)>>>;

/// Records every disposal primitive call; names listed in `refuse` fail.
#[derive(Debug, Default)]
pub struct SpyPlatform {
    pub log: CallLog,
    pub refuse: Vec<String>,
}

impl SpyPlatform {
    pub fn new() -> (Self, CallLog) {
        let spy = SpyPlatform::default();
        let log = Rc::clone(&spy.log);
        (spy, log)
    }

    fn record(&mut self, kind: ResourceKind, name: String) -> Result<()> {
        self.log.borrow_mut().push((kind, name.clone()));
        if self.refuse.contains(&name) {
            return Err(CrtError::dispose(kind, format!("{name} refused")));
        }
        Ok(())
    }
}

impl Platform for SpyPlatform {
    type Element = String;
    type Listener = String;
    type Observer = String;
    type Worker = String;
    type MediaStream = String;
    type GlContext = String;
    type Callback = Rc<()>;

    fn clear_timeout(&mut self, id: i32) -> Result<()> {
        self.record(ResourceKind::Timer, id.to_string())
    }
    fn clear_interval(&mut self, id: i32) -> Result<()> {
        self.record(ResourceKind::Interval, id.to_string())
    }
    fn cancel_animation_frame(&mut self, id: i32) -> Result<()> {
        self.record(ResourceKind::AnimationFrame, id.to_string())
    }
    fn remove_element(&mut self, element: &String) -> Result<()> {
        self.record(ResourceKind::Element, element.clone())
    }
    fn remove_listener(&mut self, listener: &String) -> Result<()> {
        self.record(ResourceKind::Listener, listener.clone())
    }
    fn disconnect_observer(&mut self, observer: &String) -> Result<()> {
        self.record(ResourceKind::Observer, observer.clone())
    }
    fn terminate_worker(&mut self, worker: &String) -> Result<()> {
        self.record(ResourceKind::Worker, worker.clone())
    }
    fn stop_media_stream(&mut self, stream: &String) -> Result<()> {
        self.record(ResourceKind::MediaStream, stream.clone())
    }
    fn lose_gl_context(&mut self, context: &String) -> Result<()> {
        self.record(ResourceKind::GlContext, context.clone())
    }
}

pub fn count(log: &CallLog, kind: ResourceKind) -> usize {
    log.borrow().iter().filter(|(k, _)| *k == kind).count()
}

/// Seeded config whose high tier never trips the probability gate.
pub fn deterministic_config() -> CoordinatorConfig {
    let mut config = CoordinatorConfig {
        seed: Some(42),
        ..CoordinatorConfig::default()
    };
    config.tiers.high.effect_probability = 1.0;
    config
}

pub fn coordinator(config: CoordinatorConfig) -> (EffectCoordinator, Rc<ManualClock>, Rc<EventBus>) {
    let clock = Rc::new(ManualClock::new(10_000.0));
    let bus = EventBus::new();
    let coordinator =
        EffectCoordinator::new(config, Rc::clone(&bus), Rc::clone(&clock) as Rc<dyn Clock>);
    (coordinator, clock, bus)
}
