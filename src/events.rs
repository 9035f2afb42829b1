//! Typed event bus shared by the coordinator, the physics engines and the
//! page.
//!
//! Every message kind has its own payload struct. In the browser each event
//! is re-dispatched as a `CustomEvent` on `document` under [`CrtEvent::name`]
//! with the payload as `detail`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use serde::Serialize;

use crate::coordinator::{Mode, RejectReason, WearPatterns};
use crate::engines::EngineKind;
use crate::performance::{PerformanceLevel, TierSettings};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemReady {
    pub engines: Vec<EngineKind>,
    pub time: f64,
}

/// Identity of an effect request as seen by listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectNotice {
    pub effect_type: String,
    pub intensity: f64,
    pub source: String,
    pub system_id: String,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectRejected {
    #[serde(flatten)]
    pub notice: EffectNotice,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectComplete {
    pub effect_type: String,
    pub source: String,
    pub system_id: String,
    pub max_active_intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cascade {
    pub level: f64,
    pub origin: String,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recovery {
    pub mode: Mode,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRateChange {
    pub fps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceUpdate {
    pub level: PerformanceLevel,
    pub settings: TierSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WearUpdate {
    pub wear: WearPatterns,
    pub global_wear: f64,
    pub thermal_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdate {
    pub x: f64,
    pub y: f64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioUpdate {
    pub amplitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryDistortion {
    pub level: f64,
    pub convergence_x: f64,
    pub convergence_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermalChange {
    pub level: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerSupplyRipple {
    pub magnitude: f64,
    pub frequency_hz: f64,
}

/// Every message that travels over the bus.
///
/// Serializes untagged, i.e. as the bare payload, which is what ends up in
/// a DOM event's `detail`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CrtEvent {
    SystemReady(SystemReady),
    EffectRequest(EffectNotice),
    EffectApproved(EffectNotice),
    EffectRejected(EffectRejected),
    EffectComplete(EffectComplete),
    Cascade(Cascade),
    Recovery(Recovery),
    FrameRateChange(FrameRateChange),
    PerformanceUpdate(PerformanceUpdate),
    WearUpdate(WearUpdate),
    CursorUpdate(CursorUpdate),
    AudioUpdate(AudioUpdate),
    GeometryDistortion(GeometryDistortion),
    ThermalChange(ThermalChange),
    PowerSupplyRipple(PowerSupplyRipple),
}

impl CrtEvent {
    /// DOM event name.
    pub fn name(&self) -> &'static str {
        match self {
            CrtEvent::SystemReady(_) => "crtSystemReady",
            CrtEvent::EffectRequest(_) => "effectRequest",
            CrtEvent::EffectApproved(_) => "effectApproved",
            CrtEvent::EffectRejected(_) => "effectRejected",
            CrtEvent::EffectComplete(_) => "effectComplete",
            CrtEvent::Cascade(_) => "crtCascade",
            CrtEvent::Recovery(_) => "crtRecovery",
            CrtEvent::FrameRateChange(_) => "frameRateChange",
            CrtEvent::PerformanceUpdate(_) => "performanceUpdate",
            CrtEvent::WearUpdate(_) => "wearUpdate",
            CrtEvent::CursorUpdate(_) => "cursorUpdate",
            CrtEvent::AudioUpdate(_) => "crtAudioUpdate",
            CrtEvent::GeometryDistortion(_) => "geometryDistortion",
            CrtEvent::ThermalChange(_) => "thermalChange",
            CrtEvent::PowerSupplyRipple(_) => "powerSupplyRipple",
        }
    }

    /// Events the system forwards to physics engines.
    pub fn is_engine_relevant(&self) -> bool {
        matches!(
            self,
            CrtEvent::Cascade(_)
                | CrtEvent::CursorUpdate(_)
                | CrtEvent::FrameRateChange(_)
                | CrtEvent::GeometryDistortion(_)
                | CrtEvent::ThermalChange(_)
                | CrtEvent::PowerSupplyRipple(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Rc<RefCell<Box<dyn FnMut(&CrtEvent)>>>;

/// Single-threaded publish/subscribe channel.
///
/// Publishing from inside a handler does not recurse: the event is queued
/// and delivered after the current one, so every subscriber sees events in
/// publication order.
#[derive(Default)]
pub struct EventBus {
    subscribers: RefCell<Vec<(SubscriptionId, Handler)>>,
    queue: RefCell<VecDeque<CrtEvent>>,
    dispatching: Cell<bool>,
    next_id: Cell<u64>,
    published: Cell<u64>,
}

impl EventBus {
    pub fn new() -> Rc<Self> {
        Rc::new(EventBus::default())
    }

    pub fn subscribe(&self, handler: impl FnMut(&CrtEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.subscribers
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(Box::new(handler)))));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.borrow_mut();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Total events published since creation.
    pub fn published(&self) -> u64 {
        self.published.get()
    }

    pub fn publish(&self, event: CrtEvent) {
        self.published.set(self.published.get() + 1);
        self.queue.borrow_mut().push_back(event);
        if self.dispatching.replace(true) {
            return;
        }
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(event) = next else { break };
            let handlers: Vec<Handler> = self
                .subscribers
                .borrow()
                .iter()
                .map(|(_, h)| Rc::clone(h))
                .collect();
            for handler in handlers {
                // A handler is never re-entered; nested publishes are queued.
                if let Ok(mut f) = handler.try_borrow_mut() {
                    f(&event);
                }
            }
        }
        self.dispatching.set(false);
    }

    /// Drop every subscriber and pending event.
    pub fn clear(&self) {
        self.subscribers.borrow_mut().clear();
        self.queue.borrow_mut().clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.published())
            .finish()
    }
}

/// Subscriber that just records events; used by tests and by the system's
/// engine router.
pub fn collector(bus: &EventBus) -> (SubscriptionId, Rc<RefCell<Vec<CrtEvent>>>) {
    let sink = Rc::new(RefCell::new(Vec::new()));
    let inner = Rc::clone(&sink);
    let id = bus.subscribe(move |event| inner.borrow_mut().push(event.clone()));
    (id, sink)
}
