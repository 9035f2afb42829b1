//! Browser bindings: disposal primitives, the DOM style sink and event
//! bridge, and the exported `CrtRuntime` class.

mod dom;
mod monitor;
mod platform;
mod runtime;

pub use runtime::CrtRuntime;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::error::CrtError;

/// Install the panic hook and route `tracing` output to the console.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
}

impl From<CrtError> for JsValue {
    fn from(err: CrtError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

/// Plain-object serialization: maps become objects rather than `Map`s.
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, CrtError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| CrtError::Serialization(e.to_string()))
}
