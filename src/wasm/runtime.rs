use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use js_sys::{Array, Function, Object};
use tracing::{info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, EventTarget, MouseEvent, MutationObserver, MutationObserverInit};

use super::dom::{self, DomStyleSink};
use super::monitor::JsPerformanceMonitor;
use super::platform::{ListenerBinding, ListenerOptions, ObserverBinding, WebPlatform};
use super::to_js;
use crate::clock::{Clock, PerformanceClock};
use crate::config::CrtConfig;
use crate::coordinator::EffectType;
use crate::engines::EngineKind;
use crate::error::CrtError;
use crate::events::{CrtEvent, EventBus};
use crate::performance::{FrameRateMonitor, PerformanceLevel, PerformanceMonitor};
use crate::resource::{ResourceId, ResourceMeta};
use crate::system::CrtSystem;

struct Inner {
    system: CrtSystem<WebPlatform>,
    sink: DomStyleSink,
}

/// State reachable from every callback the runtime hands to the browser.
#[derive(Clone)]
struct Shared {
    inner: Rc<RefCell<Inner>>,
    /// Bus events waiting to be dispatched on `document`.
    outbound: Rc<RefCell<VecDeque<CrtEvent>>>,
    /// One-shot callbacks that already ran and can be retired.
    fired: Rc<RefCell<Vec<ResourceId>>>,
    document: Document,
}

impl Shared {
    /// Run `f` against the system, then dispatch whatever it published.
    /// DOM listeners run after the borrow is released, so they may call
    /// back into the runtime.
    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> Result<R, JsValue> {
        let result = {
            let mut inner = self.inner.try_borrow_mut().map_err(|_| busy())?;
            f(&mut inner)
        };
        self.flush();
        Ok(result)
    }

    /// Read-only access. Page code may run while a frame holds the system
    /// (monitor callbacks), so this reports busy instead of panicking.
    fn read<R>(&self, f: impl FnOnce(&Inner) -> R) -> Result<R, JsValue> {
        let inner = self.inner.try_borrow().map_err(|_| busy())?;
        Ok(f(&inner))
    }

    fn flush(&self) {
        loop {
            let next = self.outbound.borrow_mut().pop_front();
            let Some(event) = next else { break };
            dom::dispatch(&self.document, &event);
        }
    }

    fn tick(&self) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            let Inner { system, sink } = &mut *inner;
            let fired: Vec<ResourceId> = self.fired.borrow_mut().drain(..).collect();
            for id in fired {
                system.resources_mut().retire(id);
            }
            system.set_motion_paused(sink.motion_paused());
            system.frame(sink);
        }
        self.flush();
    }

    fn window(&self) -> Result<web_sys::Window, JsValue> {
        web_sys::window().ok_or_else(|| CrtError::MissingDom("window".into()).into())
    }
}

fn busy() -> JsValue {
    JsValue::from_str("CrtRuntime is busy")
}

fn meta(created_by: Option<String>, purpose: Option<String>, default_purpose: &str) -> ResourceMeta {
    ResourceMeta::new(
        created_by.unwrap_or_else(|| "js".to_string()),
        purpose.unwrap_or_else(|| default_purpose.to_string()),
    )
}

/// `None` for JS `null`/`undefined`, an error for a value of another type.
fn handle<T: JsCast>(value: JsValue, expected: &str) -> Result<Option<T>, JsValue> {
    if value.is_null() || value.is_undefined() {
        return Ok(None);
    }
    value
        .dyn_into::<T>()
        .map(Some)
        .map_err(|_| CrtError::InvalidHandle(expected.to_string()).into())
}

fn id_to_js(id: ResourceId) -> f64 {
    id.raw() as f64
}

fn parse_engine(kind: &str) -> Result<EngineKind, JsValue> {
    EngineKind::parse(kind)
        .ok_or_else(|| CrtError::InvalidConfig(format!("unknown engine {kind}")).into())
}

/// The page-facing runtime: owns a [`CrtSystem`] bound to the DOM and drives
/// it from `requestAnimationFrame`.
#[wasm_bindgen]
pub struct CrtRuntime {
    shared: Shared,
    frame_loop: Rc<RefCell<Option<Closure<dyn FnMut()>>>>,
    frame_handle: Rc<Cell<i32>>,
    started: Cell<bool>,
}

#[wasm_bindgen]
impl CrtRuntime {
    /// `config` is a partial `CrtConfig` object; `monitor` an optional
    /// object with `getPerformanceLevel()` / `isLowEndDevice()`.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue, monitor: JsValue) -> Result<CrtRuntime, JsValue> {
        let config: CrtConfig = if config.is_undefined() || config.is_null() {
            CrtConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)
                .map_err(|e| CrtError::InvalidConfig(e.to_string()))?
        };
        let window = web_sys::window().ok_or_else(|| CrtError::MissingDom("window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| CrtError::MissingDom("document".into()))?;
        let sink = DomStyleSink::new(&document)?;

        let monitor: Box<dyn PerformanceMonitor> = if monitor.is_object() {
            Box::new(JsPerformanceMonitor::new(monitor))
        } else {
            Box::new(FrameRateMonitor::default())
        };

        let bus = EventBus::new();
        let outbound = Rc::new(RefCell::new(VecDeque::new()));
        {
            let outbound = Rc::clone(&outbound);
            bus.subscribe(move |event: &CrtEvent| outbound.borrow_mut().push_back(event.clone()));
        }

        let clock: Rc<dyn Clock> = Rc::new(PerformanceClock);
        let system = CrtSystem::create_with_bus(
            config,
            bus,
            WebPlatform::new(window),
            clock,
            monitor,
        )?;

        let shared = Shared {
            inner: Rc::new(RefCell::new(Inner { system, sink })),
            outbound,
            fired: Rc::new(RefCell::new(Vec::new())),
            document,
        };
        shared.flush();

        Ok(CrtRuntime {
            shared,
            frame_loop: Rc::new(RefCell::new(None)),
            frame_handle: Rc::new(Cell::new(0)),
            started: Cell::new(false),
        })
    }

    /// Attach input listeners, the motion observer and the frame loop.
    /// Calling it again is a no-op.
    pub fn start(&self) -> Result<(), JsValue> {
        if self.started.replace(true) {
            return Ok(());
        }
        self.shared.with(|inner| inner.sink.invalidate())?;
        self.attach_cursor()?;
        self.attach_motion_observer()?;
        self.start_loop()?;
        info!("crt runtime started");
        Ok(())
    }

    fn attach_cursor(&self) -> Result<(), JsValue> {
        let window = self.shared.window()?;

        let on_move = {
            let shared = self.shared.clone();
            Closure::wrap(Box::new(move |event: web_sys::Event| {
                if let Some(mouse) = event.dyn_ref::<MouseEvent>() {
                    let (x, y) = (mouse.client_x() as f64, mouse.client_y() as f64);
                    let _ = shared.with(|inner| inner.system.coordinator_mut().set_cursor(x, y, true));
                }
            }) as Box<dyn FnMut(web_sys::Event)>)
        };
        let on_leave = {
            let shared = self.shared.clone();
            Closure::wrap(Box::new(move |_event: web_sys::Event| {
                let _ = shared.with(|inner| {
                    let cursor = inner.system.coordinator().state().cursor;
                    inner
                        .system
                        .coordinator_mut()
                        .set_cursor(cursor.x, cursor.y, false)
                });
            }) as Box<dyn FnMut(web_sys::Event)>)
        };

        let moving =
            ListenerBinding::attach(window.into(), "mousemove", on_move, ListenerOptions::passive())?;
        let leaving = ListenerBinding::attach(
            self.shared.document.clone().into(),
            "mouseleave",
            on_leave,
            ListenerOptions::passive(),
        )?;
        self.shared.with(|inner| {
            let resources = inner.system.resources_mut();
            resources.register_listener(moving, ResourceMeta::new("CrtRuntime", "cursor tracking"));
            resources.register_listener(leaving, ResourceMeta::new("CrtRuntime", "cursor exit"));
        })
    }

    fn attach_motion_observer(&self) -> Result<(), JsValue> {
        let callback = {
            let shared = self.shared.clone();
            Closure::wrap(Box::new(move |_records: Array, _observer: JsValue| {
                let _ = shared.with(|inner| {
                    let paused = inner.sink.motion_paused();
                    inner.system.set_motion_paused(paused);
                });
            }) as Box<dyn FnMut(Array, JsValue)>)
        };
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
        let init = MutationObserverInit::new();
        init.set_attributes(true);
        init.set_attribute_filter(&Array::of1(&JsValue::from_str("data-motion")));
        let root = self.shared.read(|inner| inner.sink.root().clone())?;
        observer.observe_with_options(&root, &init)?;

        let binding = ObserverBinding {
            observer: observer.unchecked_into::<Object>(),
            callback: Some(callback),
        };
        self.shared.with(|inner| {
            inner
                .system
                .resources_mut()
                .register_observer(binding, ResourceMeta::new("CrtRuntime", "motion flag"));
        })
    }

    fn start_loop(&self) -> Result<(), JsValue> {
        // The loop closure re-requests itself through `f`; `g` keeps the
        // outer handle used for the first request and for teardown.
        let f = Rc::clone(&self.frame_loop);
        let g = Rc::clone(&self.frame_loop);
        let shared = self.shared.clone();
        let handle = Rc::clone(&self.frame_handle);
        *g.borrow_mut() = Some(Closure::wrap(Box::new(move || {
            shared.tick();
            let Some(window) = web_sys::window() else { return };
            if let Some(callback) = f.borrow().as_ref() {
                match window.request_animation_frame(callback.as_ref().unchecked_ref()) {
                    Ok(id) => handle.set(id),
                    Err(err) => warn!(?err, "animation frame request failed"),
                }
            }
        }) as Box<dyn FnMut()>));

        let window = self.shared.window()?;
        let id = match g.borrow().as_ref() {
            Some(callback) => window.request_animation_frame(callback.as_ref().unchecked_ref())?,
            None => return Ok(()),
        };
        self.frame_handle.set(id);
        Ok(())
    }

    fn stop_loop(&self) {
        let id = self.frame_handle.replace(0);
        if id > 0 {
            if let Some(window) = web_sys::window() {
                let _ = window.cancel_animation_frame(id);
            }
        }
        self.frame_loop.borrow_mut().take();
    }

    // ------------------------------------------------------------------
    // Coordination
    // ------------------------------------------------------------------

    #[wasm_bindgen(js_name = requestEffect)]
    pub fn request_effect(
        &self,
        effect_type: &str,
        intensity: f64,
        source: Option<String>,
        system_id: Option<String>,
    ) -> Result<bool, JsValue> {
        let effect = EffectType::parse(effect_type);
        self.shared.with(|inner| {
            inner.system.coordinator_mut().request_effect(
                &effect,
                intensity,
                source.as_deref().unwrap_or("js"),
                system_id.as_deref().unwrap_or("page"),
            )
        })
    }

    #[wasm_bindgen(js_name = completeEffect)]
    pub fn complete_effect(
        &self,
        effect_type: &str,
        source: Option<String>,
        system_id: Option<String>,
    ) -> Result<bool, JsValue> {
        let effect = EffectType::parse(effect_type);
        self.shared.with(|inner| {
            inner.system.coordinator_mut().complete_effect(
                &effect,
                source.as_deref().unwrap_or("js"),
                system_id.as_deref().unwrap_or("page"),
            )
        })
    }

    #[wasm_bindgen(js_name = canRunEffect)]
    pub fn can_run_effect(&self, effect_type: &str, intensity: f64) -> Result<bool, JsValue> {
        let effect = EffectType::parse(effect_type);
        self.shared
            .with(|inner| inner.system.coordinator_mut().can_run_effect(&effect, intensity))
    }

    #[wasm_bindgen(js_name = triggerCascade)]
    pub fn trigger_cascade(&self, intensity: f64, origin: Option<String>) -> Result<(), JsValue> {
        self.shared.with(|inner| {
            inner
                .system
                .coordinator_mut()
                .trigger_cascade(intensity, origin.as_deref().unwrap_or("js"))
        })
    }

    #[wasm_bindgen(js_name = triggerGlobalCooldown)]
    pub fn trigger_global_cooldown(&self, duration_ms: f64) -> Result<(), JsValue> {
        self.shared
            .with(|inner| inner.system.coordinator_mut().trigger_global_cooldown(duration_ms))
    }

    #[wasm_bindgen(js_name = registerSystem)]
    pub fn register_system(
        &self,
        id: &str,
        initial_state: JsValue,
    ) -> Result<bool, JsValue> {
        let state: serde_json::Value = if initial_state.is_undefined() {
            serde_json::Value::Null
        } else {
            serde_wasm_bindgen::from_value(initial_state)
                .map_err(|e| CrtError::Serialization(e.to_string()))?
        };
        self.shared
            .with(|inner| inner.system.coordinator_mut().register_system(id, state))
    }

    #[wasm_bindgen(js_name = unregisterSystem)]
    pub fn unregister_system(&self, id: &str) -> Result<bool, JsValue> {
        self.shared
            .with(|inner| inner.system.coordinator_mut().unregister_system(id))
    }

    #[wasm_bindgen(js_name = setAudioAmplitude)]
    pub fn set_audio_amplitude(&self, amplitude: f64) -> Result<(), JsValue> {
        self.shared
            .with(|inner| inner.system.coordinator_mut().set_audio_amplitude(amplitude))
    }

    #[wasm_bindgen(js_name = setPerformanceLevel)]
    pub fn set_performance_level(&self, level: &str) -> Result<bool, JsValue> {
        let level = PerformanceLevel::parse(level)
            .ok_or_else(|| CrtError::InvalidConfig(format!("unknown performance level {level}")))?;
        self.shared
            .with(|inner| inner.system.coordinator_mut().set_performance_level(level))
    }

    #[wasm_bindgen(js_name = configureEngine)]
    pub fn configure_engine(&self, kind: &str, params: JsValue) -> Result<(), JsValue> {
        let kind = parse_engine(kind)?;
        let params: serde_json::Value = serde_wasm_bindgen::from_value(params)
            .map_err(|e| CrtError::InvalidConfig(e.to_string()))?;
        self.shared
            .with(|inner| inner.system.configure_engine(kind, &params))?
            .map_err(JsValue::from)
    }

    #[wasm_bindgen(js_name = getEngineConfiguration)]
    pub fn engine_configuration(&self, kind: &str) -> Result<JsValue, JsValue> {
        let kind = parse_engine(kind)?;
        let config = self
            .shared
            .read(|inner| inner.system.engine_configuration(kind))?;
        match config {
            Some(config) => Ok(to_js(&config)?),
            None => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(js_name = getState)]
    pub fn state(&self) -> Result<JsValue, JsValue> {
        self.shared
            .read(|inner| to_js(inner.system.coordinator().state()))?
            .map_err(JsValue::from)
    }

    #[wasm_bindgen(js_name = getStatistics)]
    pub fn statistics(&self) -> Result<JsValue, JsValue> {
        let stats = self.shared.read(|inner| inner.system.statistics())?;
        Ok(to_js(&stats)?)
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    /// `setTimeout` whose timer is tracked; returns the resource id.
    #[wasm_bindgen(js_name = setTimeout)]
    pub fn set_timeout(
        &self,
        callback: Function,
        delay_ms: i32,
        created_by: Option<String>,
        purpose: Option<String>,
    ) -> Result<f64, JsValue> {
        let slot: Rc<Cell<Option<ResourceId>>> = Rc::new(Cell::new(None));
        let closure = {
            let slot = Rc::clone(&slot);
            let fired = Rc::clone(&self.shared.fired);
            Closure::wrap(Box::new(move || {
                if let Err(err) = callback.call0(&JsValue::NULL) {
                    warn!(?err, "timeout callback threw");
                }
                if let Some(id) = slot.get() {
                    fired.borrow_mut().push(id);
                }
            }) as Box<dyn FnMut()>)
        };
        let window = self.shared.window()?;
        self.shared.with(|inner| {
            let handle = window.set_timeout_with_callback_and_timeout_and_arguments_0(
                closure.as_ref().unchecked_ref(),
                delay_ms,
            )?;
            let id = inner
                .system
                .resources_mut()
                .register_timer_with_callback(handle, closure, meta(created_by, purpose, "timeout"))
                .ok_or_else(|| JsValue::from_str("null timer handle"))?;
            slot.set(Some(id));
            Ok(id_to_js(id))
        })?
    }

    #[wasm_bindgen(js_name = setInterval)]
    pub fn set_interval(
        &self,
        callback: Function,
        interval_ms: i32,
        created_by: Option<String>,
        purpose: Option<String>,
    ) -> Result<f64, JsValue> {
        let closure = Closure::wrap(Box::new(move || {
            if let Err(err) = callback.call0(&JsValue::NULL) {
                warn!(?err, "interval callback threw");
            }
        }) as Box<dyn FnMut()>);
        let window = self.shared.window()?;
        self.shared.with(|inner| {
            let handle = window.set_interval_with_callback_and_timeout_and_arguments_0(
                closure.as_ref().unchecked_ref(),
                interval_ms,
            )?;
            inner
                .system
                .resources_mut()
                .register_interval_with_callback(handle, closure, meta(created_by, purpose, "interval"))
                .map(id_to_js)
                .ok_or_else(|| JsValue::from_str("null interval handle"))
        })?
    }

    #[wasm_bindgen(js_name = requestAnimationFrame)]
    pub fn request_animation_frame(
        &self,
        callback: Function,
        created_by: Option<String>,
        purpose: Option<String>,
    ) -> Result<f64, JsValue> {
        let slot: Rc<Cell<Option<ResourceId>>> = Rc::new(Cell::new(None));
        let closure = {
            let slot = Rc::clone(&slot);
            let fired = Rc::clone(&self.shared.fired);
            Closure::wrap(Box::new(move || {
                let now = JsValue::from_f64(PerformanceClock.now_ms());
                if let Err(err) = callback.call1(&JsValue::NULL, &now) {
                    warn!(?err, "animation frame callback threw");
                }
                if let Some(id) = slot.get() {
                    fired.borrow_mut().push(id);
                }
            }) as Box<dyn FnMut()>)
        };
        let window = self.shared.window()?;
        self.shared.with(|inner| {
            let handle = window.request_animation_frame(closure.as_ref().unchecked_ref())?;
            let id = inner
                .system
                .resources_mut()
                .register_animation_with_callback(handle, closure, meta(created_by, purpose, "animation frame"))
                .ok_or_else(|| JsValue::from_str("null animation frame handle"))?;
            slot.set(Some(id));
            Ok(id_to_js(id))
        })?
    }

    #[wasm_bindgen(js_name = addEventListener)]
    pub fn add_event_listener(
        &self,
        target: EventTarget,
        event: &str,
        callback: Function,
        options: JsValue,
        created_by: Option<String>,
    ) -> Result<f64, JsValue> {
        let closure = Closure::wrap(Box::new(move |e: web_sys::Event| {
            if let Err(err) = callback.call1(&JsValue::NULL, &e) {
                warn!(?err, "listener threw");
            }
        }) as Box<dyn FnMut(web_sys::Event)>);
        let binding =
            ListenerBinding::attach(target, event, closure, ListenerOptions::from_js(&options))?;
        let purpose = format!("{event} listener");
        self.shared.with(|inner| {
            id_to_js(
                inner
                    .system
                    .resources_mut()
                    .register_listener(binding, meta(created_by, Some(purpose), "listener")),
            )
        })
    }

    /// Create an element, append it to `parent` (or `body`) and track it.
    #[wasm_bindgen(js_name = createElement)]
    pub fn create_element(
        &self,
        tag: &str,
        parent: Option<Element>,
        created_by: Option<String>,
    ) -> Result<Element, JsValue> {
        let document = &self.shared.document;
        let element = document.create_element(tag)?;
        match parent {
            Some(parent) => parent.append_child(&element)?,
            None => document
                .body()
                .ok_or_else(|| CrtError::MissingDom("body".into()))?
                .append_child(&element)?,
        };
        let tracked = element.clone();
        self.shared.with(|inner| {
            inner
                .system
                .resources_mut()
                .register_element(tracked, meta(created_by, Some(format!("<{tag}>")), "element"))
        })?;
        Ok(element)
    }

    #[wasm_bindgen(js_name = registerTimer)]
    pub fn register_timer(
        &self,
        handle: i32,
        created_by: Option<String>,
        purpose: Option<String>,
    ) -> Result<Option<f64>, JsValue> {
        self.shared.with(|inner| {
            inner
                .system
                .resources_mut()
                .register_timer(handle, meta(created_by, purpose, "timeout"))
                .map(id_to_js)
        })
    }

    #[wasm_bindgen(js_name = registerInterval)]
    pub fn register_interval(
        &self,
        handle: i32,
        created_by: Option<String>,
        purpose: Option<String>,
    ) -> Result<Option<f64>, JsValue> {
        self.shared.with(|inner| {
            inner
                .system
                .resources_mut()
                .register_interval(handle, meta(created_by, purpose, "interval"))
                .map(id_to_js)
        })
    }

    #[wasm_bindgen(js_name = registerAnimationFrame)]
    pub fn register_animation_frame(
        &self,
        handle: i32,
        created_by: Option<String>,
        purpose: Option<String>,
    ) -> Result<Option<f64>, JsValue> {
        self.shared.with(|inner| {
            inner
                .system
                .resources_mut()
                .register_animation(handle, meta(created_by, purpose, "animation frame"))
                .map(id_to_js)
        })
    }

    /// `null`/`undefined` is a no-op and yields `undefined`.
    #[wasm_bindgen(js_name = registerElement)]
    pub fn register_element(
        &self,
        element: JsValue,
        created_by: Option<String>,
        purpose: Option<String>,
    ) -> Result<Option<f64>, JsValue> {
        let Some(element) = handle::<Element>(element, "an Element")? else {
            return Ok(None);
        };
        self.shared.with(|inner| {
            Some(id_to_js(
                inner
                    .system
                    .resources_mut()
                    .register_element(element, meta(created_by, purpose, "element")),
            ))
        })
    }

    /// Track any observer with a `disconnect()` method.
    #[wasm_bindgen(js_name = registerObserver)]
    pub fn register_observer(
        &self,
        observer: JsValue,
        created_by: Option<String>,
        purpose: Option<String>,
    ) -> Result<Option<f64>, JsValue> {
        let Some(observer) = handle::<Object>(observer, "an observer object")? else {
            return Ok(None);
        };
        let binding = ObserverBinding {
            observer,
            callback: None,
        };
        self.shared.with(|inner| {
            Some(id_to_js(
                inner
                    .system
                    .resources_mut()
                    .register_observer(binding, meta(created_by, purpose, "observer")),
            ))
        })
    }

    #[wasm_bindgen(js_name = registerWorker)]
    pub fn register_worker(
        &self,
        worker: JsValue,
        created_by: Option<String>,
        purpose: Option<String>,
    ) -> Result<Option<f64>, JsValue> {
        let Some(worker) = handle::<web_sys::Worker>(worker, "a Worker")? else {
            return Ok(None);
        };
        self.shared.with(|inner| {
            Some(id_to_js(
                inner
                    .system
                    .resources_mut()
                    .register_worker(worker, meta(created_by, purpose, "worker")),
            ))
        })
    }

    #[wasm_bindgen(js_name = registerMediaStream)]
    pub fn register_media_stream(
        &self,
        stream: JsValue,
        created_by: Option<String>,
        purpose: Option<String>,
    ) -> Result<Option<f64>, JsValue> {
        let Some(stream) = handle::<web_sys::MediaStream>(stream, "a MediaStream")? else {
            return Ok(None);
        };
        self.shared.with(|inner| {
            Some(id_to_js(
                inner
                    .system
                    .resources_mut()
                    .register_media_stream(stream, meta(created_by, purpose, "media stream")),
            ))
        })
    }

    #[wasm_bindgen(js_name = registerGlContext)]
    pub fn register_gl_context(
        &self,
        context: JsValue,
        created_by: Option<String>,
        purpose: Option<String>,
    ) -> Result<Option<f64>, JsValue> {
        if context.is_null() || context.is_undefined() {
            return Ok(None);
        }
        self.shared.with(|inner| {
            Some(id_to_js(
                inner
                    .system
                    .resources_mut()
                    .register_gl_context(context, meta(created_by, purpose, "webgl context")),
            ))
        })
    }

    /// Dispose one tracked resource.
    pub fn release(&self, id: f64) -> Result<bool, JsValue> {
        if !(id.is_finite() && id >= 1.0) {
            return Ok(false);
        }
        let id = ResourceId::from_raw(id as u64);
        self.shared
            .with(|inner| inner.system.resources_mut().release(id))
    }

    /// Dispose every tracked resource; returns how many disposals failed.
    #[wasm_bindgen(js_name = cleanupAll)]
    pub fn cleanup_all(&self) -> Result<u32, JsValue> {
        self.shared
            .with(|inner| inner.system.resources_mut().cleanup_all().errors as u32)
    }

    /// Stop the frame loop and tear the system down. Safe to call twice.
    pub fn dispose(&self) -> Result<JsValue, JsValue> {
        self.stop_loop();
        let stats = self.shared.with(|inner| {
            inner.system.dispose();
            inner.system.statistics()
        })?;
        self.shared.outbound.borrow_mut().clear();
        self.shared.fired.borrow_mut().clear();
        Ok(to_js(&stats)?)
    }
}

impl Drop for CrtRuntime {
    fn drop(&mut self) {
        self.stop_loop();
    }
}
