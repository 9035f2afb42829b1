use js_sys::{Function, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::performance::{FrameRateMonitor, PerformanceLevel, PerformanceMonitor};

/// A page-supplied object with `getPerformanceLevel()` and optionally
/// `isLowEndDevice()`. Frame timing is still tracked locally and used
/// whenever the object's answer is missing or unrecognised.
pub struct JsPerformanceMonitor {
    object: JsValue,
    fallback: FrameRateMonitor,
}

impl JsPerformanceMonitor {
    pub fn new(object: JsValue) -> Self {
        JsPerformanceMonitor {
            object,
            fallback: FrameRateMonitor::default(),
        }
    }

    fn call(&self, method: &str) -> Option<JsValue> {
        let func = Reflect::get(&self.object, &JsValue::from_str(method)).ok()?;
        let func: Function = func.dyn_into().ok()?;
        func.call0(&self.object).ok()
    }
}

impl PerformanceMonitor for JsPerformanceMonitor {
    fn performance_level(&self) -> PerformanceLevel {
        self.call("getPerformanceLevel")
            .and_then(|v| v.as_string())
            .and_then(|s| PerformanceLevel::parse(&s))
            .unwrap_or_else(|| self.fallback.performance_level())
    }

    fn is_low_end_device(&self) -> bool {
        self.call("isLowEndDevice")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    fn record_frame(&mut self, now_ms: f64) {
        self.fallback.record_frame(now_ms);
    }
}
