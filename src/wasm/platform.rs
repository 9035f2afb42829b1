use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{AddEventListenerOptions, Element, EventTarget, Window};

use crate::error::{CrtError, Result};
use crate::resource::{Platform, ResourceKind};

/// The third argument of `addEventListener`: either a bare `capture` flag
/// or an `{ capture, passive, once }` object. Anything else means defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    /// `None` leaves the browser's per-event default in place.
    pub passive: Option<bool>,
    pub once: bool,
}

impl ListenerOptions {
    pub fn passive() -> Self {
        ListenerOptions {
            passive: Some(true),
            ..ListenerOptions::default()
        }
    }

    pub fn from_js(value: &JsValue) -> Self {
        if let Some(capture) = value.as_bool() {
            return ListenerOptions {
                capture,
                ..ListenerOptions::default()
            };
        }
        if !value.is_object() {
            return ListenerOptions::default();
        }
        let flag = |name: &str| {
            Reflect::get(value, &JsValue::from_str(name))
                .ok()
                .and_then(|v| v.as_bool())
        };
        ListenerOptions {
            capture: flag("capture").unwrap_or(false),
            passive: flag("passive"),
            once: flag("once").unwrap_or(false),
        }
    }

    fn to_js(self) -> AddEventListenerOptions {
        let options = AddEventListenerOptions::new();
        options.set_capture(self.capture);
        options.set_once(self.once);
        if let Some(passive) = self.passive {
            options.set_passive(passive);
        }
        options
    }
}

/// An `addEventListener` registration, kept so it can be removed with the
/// exact same arguments. Only `capture` takes part in matching on removal.
pub struct ListenerBinding {
    pub target: EventTarget,
    pub event: String,
    pub callback: Closure<dyn FnMut(web_sys::Event)>,
    pub options: ListenerOptions,
}

impl ListenerBinding {
    pub fn attach(
        target: EventTarget,
        event: &str,
        callback: Closure<dyn FnMut(web_sys::Event)>,
        options: ListenerOptions,
    ) -> std::result::Result<Self, JsValue> {
        target.add_event_listener_with_callback_and_add_event_listener_options(
            event,
            callback.as_ref().unchecked_ref(),
            &options.to_js(),
        )?;
        Ok(ListenerBinding {
            target,
            event: event.to_string(),
            callback,
            options,
        })
    }
}

/// Any observer exposing `disconnect()`, plus the callback it invokes.
pub struct ObserverBinding {
    pub observer: Object,
    pub callback: Option<Closure<dyn FnMut(js_sys::Array, JsValue)>>,
}

pub struct WebPlatform {
    window: Window,
}

impl WebPlatform {
    pub fn new(window: Window) -> Self {
        WebPlatform { window }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

fn js_err(kind: ResourceKind) -> impl Fn(JsValue) -> CrtError {
    move |err| CrtError::dispose(kind, format!("{err:?}"))
}

/// Call `target[method]()` if it is a function. Goes through `Reflect` so a
/// throwing or missing method becomes an error instead of unwinding.
fn call_method(target: &JsValue, method: &str, kind: ResourceKind) -> Result<JsValue> {
    let func = Reflect::get(target, &JsValue::from_str(method)).map_err(js_err(kind))?;
    let func: Function = func
        .dyn_into()
        .map_err(|_| CrtError::dispose(kind, format!("{method} is not a function")))?;
    func.call0(target).map_err(js_err(kind))
}

impl Platform for WebPlatform {
    type Element = Element;
    type Listener = ListenerBinding;
    type Observer = ObserverBinding;
    type Worker = web_sys::Worker;
    type MediaStream = web_sys::MediaStream;
    type GlContext = JsValue;
    type Callback = Closure<dyn FnMut()>;

    fn clear_timeout(&mut self, id: i32) -> Result<()> {
        self.window.clear_timeout_with_handle(id);
        Ok(())
    }

    fn clear_interval(&mut self, id: i32) -> Result<()> {
        self.window.clear_interval_with_handle(id);
        Ok(())
    }

    fn cancel_animation_frame(&mut self, id: i32) -> Result<()> {
        self.window
            .cancel_animation_frame(id)
            .map_err(js_err(ResourceKind::AnimationFrame))
    }

    fn remove_element(&mut self, element: &Element) -> Result<()> {
        call_method(element, "remove", ResourceKind::Element).map(|_| ())
    }

    fn remove_listener(&mut self, listener: &ListenerBinding) -> Result<()> {
        listener
            .target
            .remove_event_listener_with_callback_and_bool(
                &listener.event,
                listener.callback.as_ref().unchecked_ref(),
                listener.options.capture,
            )
            .map_err(js_err(ResourceKind::Listener))
    }

    fn disconnect_observer(&mut self, observer: &ObserverBinding) -> Result<()> {
        call_method(&observer.observer, "disconnect", ResourceKind::Observer).map(|_| ())
    }

    fn terminate_worker(&mut self, worker: &web_sys::Worker) -> Result<()> {
        call_method(worker, "terminate", ResourceKind::Worker).map(|_| ())
    }

    /// Stops every track; one failing track does not keep the rest running.
    fn stop_media_stream(&mut self, stream: &web_sys::MediaStream) -> Result<()> {
        let kind = ResourceKind::MediaStream;
        let tracks: Array = call_method(stream, "getTracks", kind)?
            .dyn_into()
            .map_err(|_| CrtError::dispose(kind, "getTracks did not return an array"))?;
        let mut first_err = None;
        for track in tracks.iter() {
            if let Err(err) = call_method(&track, "stop", kind) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn lose_gl_context(&mut self, context: &JsValue) -> Result<()> {
        let kind = ResourceKind::GlContext;
        let get_extension = Reflect::get(context, &JsValue::from_str("getExtension"))
            .map_err(js_err(kind))?
            .dyn_into::<Function>()
            .map_err(|_| CrtError::dispose(kind, "not a WebGL context"))?;
        let extension = get_extension
            .call1(context, &JsValue::from_str("WEBGL_lose_context"))
            .map_err(js_err(kind))?;
        if extension.is_null() || extension.is_undefined() {
            // Nothing to force; the context goes away with its canvas.
            return Ok(());
        }
        call_method(&extension, "loseContext", kind).map(|_| ())
    }
}
