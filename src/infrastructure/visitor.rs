//! Field visitors for extracting event field values.
//!
//! `FieldVisitor` renders every field to a string; `NumericFieldVisitor`
//! pulls a single numeric field out of an event without allocating.

use std::collections::BTreeMap;
use std::fmt;
use tracing::field::{Field, Visit};

/// A visitor that extracts field values into a BTreeMap.
///
/// The `message` field is kept apart from the others. All values are
/// converted to strings, using `Debug` formatting for non-primitive values.
#[derive(Debug, Default)]
pub(crate) struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl FieldVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the visitor and return the message and the other fields.
    pub fn into_parts(self) -> (Option<String>, BTreeMap<String, String>) {
        (self.message, self.fields)
    }

    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{:?}", value));
    }
}

/// Extracts one numeric field as `f64`.
///
/// Integer values are widened; strings that parse as numbers are accepted.
#[derive(Debug)]
pub(crate) struct NumericFieldVisitor {
    name: &'static str,
    value: Option<f64>,
}

impl NumericFieldVisitor {
    pub fn new(name: &'static str) -> Self {
        Self { name, value: None }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Visit for NumericFieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        if field.name() == self.name {
            self.value = Some(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == self.name {
            self.value = Some(value as f64);
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == self.name {
            self.value = Some(value as f64);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == self.name {
            self.value = value.trim().parse().ok();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == self.name {
            self.value = format!("{:?}", value).trim().parse().ok();
        }
    }
}
