//! The explicitly constructed context object that owns every subsystem.
//!
//! `CrtSystem::create` wires the bus, coordinator, engines and resource
//! registry together; `frame` is called once per animation frame; `dispose`
//! tears everything down.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::CrtConfig;
use crate::coordinator::EffectCoordinator;
use crate::engines::{EngineFrame, EngineKind, EngineSet};
use crate::error::{CrtError, Result};
use crate::events::{CrtEvent, EventBus, SubscriptionId, SystemReady};
use crate::performance::PerformanceMonitor;
use crate::resource::{CleanupReport, Platform, ResourceRegistry, ResourceStats};
use crate::scheduler::{FrameThrottle, RepeatingTask};
use crate::style::StyleSink;

/// Engine output can trigger more engine output; stop after this many hops.
const MAX_ROUTING_ROUNDS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatistics {
    pub frames: u64,
    pub engine_frames: u64,
    pub published_events: u64,
    pub active_effects: usize,
    pub registered_systems: usize,
    pub engines: Vec<EngineKind>,
    pub resources: ResourceStats,
    pub disposed: bool,
}

pub struct CrtSystem<P: Platform> {
    config: CrtConfig,
    clock: Rc<dyn Clock>,
    bus: Rc<EventBus>,
    coordinator: EffectCoordinator,
    engines: EngineSet,
    resources: ResourceRegistry<P>,
    monitor: Box<dyn PerformanceMonitor>,
    perf_task: RepeatingTask,
    throttle: FrameThrottle,
    rng: SmallRng,
    inbox: Rc<RefCell<VecDeque<CrtEvent>>>,
    router: Option<SubscriptionId>,
    frames: u64,
    engine_frames: u64,
    disposed: bool,
}

impl<P: Platform> CrtSystem<P> {
    pub fn create(
        config: CrtConfig,
        platform: P,
        clock: Rc<dyn Clock>,
        monitor: Box<dyn PerformanceMonitor>,
    ) -> Result<Self> {
        Self::create_with_bus(config, EventBus::new(), platform, clock, monitor)
    }

    /// Like [`create`](Self::create), on a bus the caller already subscribed
    /// to, so `SystemReady` is observable.
    pub fn create_with_bus(
        config: CrtConfig,
        bus: Rc<EventBus>,
        platform: P,
        clock: Rc<dyn Clock>,
        monitor: Box<dyn PerformanceMonitor>,
    ) -> Result<Self> {
        config.validate()?;
        let now = clock.now_ms();

        let inbox = Rc::new(RefCell::new(VecDeque::new()));
        let router = {
            let inbox = Rc::clone(&inbox);
            bus.subscribe(move |event: &CrtEvent| {
                if event.is_engine_relevant() {
                    inbox.borrow_mut().push_back(event.clone());
                }
            })
        };

        let mut coordinator =
            EffectCoordinator::new(config.coordinator.clone(), Rc::clone(&bus), Rc::clone(&clock));
        coordinator.update_performance_settings(monitor.as_ref());

        let engines = EngineSet::from_config(&config.engines, coordinator.state());
        let resources = ResourceRegistry::new(platform, Rc::clone(&clock));

        let mut perf_task = RepeatingTask::new(config.performance_poll_ms);
        perf_task.start(now);
        let throttle = FrameThrottle::new(coordinator.state().target_fps);
        let rng = match config.coordinator.seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(1)),
            None => SmallRng::from_entropy(),
        };

        let installed = engines.installed();
        info!(engines = ?installed, "crt system ready");
        bus.publish(CrtEvent::SystemReady(SystemReady {
            engines: installed,
            time: now,
        }));

        Ok(CrtSystem {
            config,
            clock,
            bus,
            coordinator,
            engines,
            resources,
            monitor,
            perf_task,
            throttle,
            rng,
            inbox,
            router: Some(router),
            frames: 0,
            engine_frames: 0,
            disposed: false,
        })
    }

    pub fn config(&self) -> &CrtConfig {
        &self.config
    }

    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn coordinator(&self) -> &EffectCoordinator {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut EffectCoordinator {
        &mut self.coordinator
    }

    pub fn engines(&self) -> &EngineSet {
        &self.engines
    }

    pub fn resources(&self) -> &ResourceRegistry<P> {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceRegistry<P> {
        &mut self.resources
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Follow the page's motion flag. While paused engines stop advancing
    /// and the wear and performance jobs are suspended.
    pub fn set_motion_paused(&mut self, paused: bool) {
        if self.disposed || paused == self.coordinator.state().motion_paused {
            return;
        }
        let now = self.clock.now_ms();
        self.coordinator.set_motion_paused(paused);
        if paused {
            self.perf_task.pause(now);
        } else {
            self.perf_task.resume(now);
            self.throttle.reset();
        }
    }

    /// One animation frame.
    pub fn frame(&mut self, sink: &mut dyn StyleSink) {
        if self.disposed {
            return;
        }
        self.frames += 1;
        let now = self.clock.now_ms();
        self.monitor.record_frame(now);
        self.coordinator.pump();

        if self.perf_task.poll(now) {
            self.coordinator
                .update_performance_settings(self.monitor.as_ref());
        }

        if !self.coordinator.state().motion_paused {
            if let Some(dt_ms) = self.throttle.ready(now) {
                self.engine_frames += 1;
                let mut out = Vec::new();
                let mut frame = EngineFrame {
                    dt_ms,
                    now_ms: now,
                    state: self.coordinator.state(),
                    sink: &mut *sink,
                    out: &mut out,
                    rng: &mut self.rng,
                };
                self.engines.advance_all(&mut frame);
                for event in out {
                    self.bus.publish(event);
                }
            }
        }

        self.coordinator.write_styles(sink);
        self.route_events();
    }

    /// Deliver queued cross-engine events to every installed engine.
    fn route_events(&mut self) {
        for _ in 0..MAX_ROUTING_ROUNDS {
            let batch: Vec<CrtEvent> = self.inbox.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                return;
            }
            let mut out = Vec::new();
            for event in &batch {
                if let CrtEvent::FrameRateChange(change) = event {
                    self.throttle.set_fps(change.fps);
                }
                self.engines.broadcast(event, &mut out);
            }
            for event in out {
                self.bus.publish(event);
            }
        }
        let dropped = self.inbox.borrow().len();
        if dropped > 0 {
            warn!(dropped, "engine event routing did not settle");
            self.inbox.borrow_mut().clear();
        }
    }

    pub fn configure_engine(&mut self, kind: EngineKind, params: &serde_json::Value) -> Result<()> {
        let engine = self.engines.get_mut(kind).ok_or_else(|| {
            CrtError::InvalidConfig(format!("engine {} is not installed", kind.name()))
        })?;
        engine.configure(params)?;
        debug!(engine = kind.name(), "engine reconfigured");
        Ok(())
    }

    pub fn engine_configuration(&self, kind: EngineKind) -> Option<serde_json::Value> {
        self.engines.get(kind).map(|e| e.configuration())
    }

    pub fn statistics(&self) -> SystemStatistics {
        SystemStatistics {
            frames: self.frames,
            engine_frames: self.engine_frames,
            published_events: self.bus.published(),
            active_effects: self.coordinator.active_count(),
            registered_systems: self.coordinator.systems().count(),
            engines: self.engines.installed(),
            resources: self.resources.statistics(),
            disposed: self.disposed,
        }
    }

    /// Release every resource, stop periodic jobs and drop all subscribers.
    /// Later calls are no-ops.
    pub fn dispose(&mut self) -> CleanupReport {
        if self.disposed {
            return CleanupReport::default();
        }
        self.disposed = true;
        let report = self.resources.cleanup_all();
        self.coordinator.shutdown();
        self.perf_task.cancel();
        if let Some(id) = self.router.take() {
            self.bus.unsubscribe(id);
        }
        self.bus.clear();
        self.inbox.borrow_mut().clear();
        info!(
            cleaned = report.cleaned,
            errors = report.errors,
            "crt system disposed"
        );
        report
    }
}

impl<P: Platform> std::fmt::Debug for CrtSystem<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrtSystem")
            .field("coordinator", &self.coordinator)
            .field("engines", &self.engines.installed())
            .field("resources", &self.resources.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}
