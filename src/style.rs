//! Output side of the effects: CSS custom properties and class toggles on
//! the document root.

use std::collections::{BTreeMap, BTreeSet};

pub trait StyleSink {
    fn set_property(&mut self, name: &str, value: &str);
    fn set_class(&mut self, class: &str, enabled: bool);

    fn set_number(&mut self, name: &str, value: f64) {
        self.set_property(name, &format_number(value));
    }

    fn set_length_px(&mut self, name: &str, value: f64) {
        self.set_property(name, &format!("{}px", format_number(value)));
    }
}

/// Fixed precision keeps property strings stable between frames so the DOM
/// sink can skip unchanged writes.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let s = format!("{value:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    match s {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Sink that keeps the latest value of everything written to it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingSink {
    pub properties: BTreeMap<String, String>,
    pub classes: BTreeSet<String>,
    pub writes: usize,
}

impl RecordingSink {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.property(name)?.trim_end_matches("px").parse().ok()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }
}

impl StyleSink for RecordingSink {
    fn set_property(&mut self, name: &str, value: &str) {
        self.writes += 1;
        self.properties.insert(name.to_string(), value.to_string());
    }

    fn set_class(&mut self, class: &str, enabled: bool) {
        self.writes += 1;
        if enabled {
            self.classes.insert(class.to_string());
        } else {
            self.classes.remove(class);
        }
    }
}
