use std::collections::HashMap;

use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use web_sys::{CssStyleDeclaration, CustomEvent, CustomEventInit, Document, DomTokenList, HtmlElement};

use super::to_js;
use crate::error::{CrtError, Result};
use crate::events::CrtEvent;
use crate::style::StyleSink;

/// Writes custom properties and classes onto `document.documentElement`,
/// skipping writes whose value did not change since the last frame.
pub struct DomStyleSink {
    root: HtmlElement,
    style: CssStyleDeclaration,
    classes: DomTokenList,
    properties: HashMap<String, String>,
    toggled: HashMap<String, bool>,
}

impl DomStyleSink {
    pub fn new(document: &Document) -> Result<Self> {
        let root: HtmlElement = document
            .document_element()
            .ok_or_else(|| CrtError::MissingDom("documentElement".into()))?
            .dyn_into()
            .map_err(|_| CrtError::MissingDom("documentElement is not an HTML element".into()))?;
        Ok(DomStyleSink {
            style: root.style(),
            classes: root.class_list(),
            root,
            properties: HashMap::new(),
            toggled: HashMap::new(),
        })
    }

    /// `true` when the page asked for reduced motion via `data-motion="paused"`.
    pub fn motion_paused(&self) -> bool {
        self.root.dataset().get("motion").as_deref() == Some("paused")
    }

    pub fn root(&self) -> &HtmlElement {
        &self.root
    }

    /// Forget the write cache, e.g. after another script touched the root.
    pub fn invalidate(&mut self) {
        self.properties.clear();
        self.toggled.clear();
    }
}

impl StyleSink for DomStyleSink {
    fn set_property(&mut self, name: &str, value: &str) {
        if self.properties.get(name).map(String::as_str) == Some(value) {
            return;
        }
        if let Err(err) = self.style.set_property(name, value) {
            debug!(name, ?err, "style write rejected");
            return;
        }
        self.properties.insert(name.to_string(), value.to_string());
    }

    fn set_class(&mut self, class: &str, enabled: bool) {
        if self.toggled.get(class) == Some(&enabled) {
            return;
        }
        if let Err(err) = self.classes.toggle_with_force(class, enabled) {
            debug!(class, ?err, "class toggle rejected");
            return;
        }
        self.toggled.insert(class.to_string(), enabled);
    }
}

/// Re-dispatch a bus event as a DOM `CustomEvent` on `document`.
pub fn dispatch(document: &Document, event: &CrtEvent) {
    let detail = match to_js(event) {
        Ok(detail) => detail,
        Err(err) => {
            warn!(event = event.name(), %err, "event detail not serializable");
            return;
        }
    };
    let init = CustomEventInit::new();
    init.set_detail(&detail);
    match CustomEvent::new_with_event_init_dict(event.name(), &init) {
        Ok(custom) => {
            if let Err(err) = document.dispatch_event(&custom) {
                warn!(event = event.name(), ?err, "event dispatch failed");
            }
        }
        Err(err) => warn!(event = event.name(), ?err, "event construction failed"),
    }
}
