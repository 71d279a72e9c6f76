//! # Reading Publication
//!
//! Output side of the reader. Every reading is addressed by an opaque
//! [`OutputHandle`] handed out by the configuration layer and delivered to a
//! [`ReadingSink`] as either a number or a text.

pub mod bindings;
pub mod custom;
pub mod publisher;

use crate::dsmr::fields::FieldValue;
use std::fmt;

pub use bindings::{Binding, BindingRegistry, CustomFieldBinding, Debounce, OutputKind, StandardBinding};
pub use publisher::ReadingPublisher;

/// Opaque address of one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputHandle(pub u32);

/// A published value.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Number(n) => write!(f, "{n:.3}"),
            ReadingValue::Text(t) => f.write_str(t),
        }
    }
}

impl From<&FieldValue> for ReadingValue {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Text(t) => ReadingValue::Text(t.clone()),
            FieldValue::Fixed(v) => ReadingValue::Number(v.value()),
            FieldValue::TimestampedFixed { value, .. } => ReadingValue::Number(value.value()),
            FieldValue::Int(n) => ReadingValue::Number(*n as f64),
        }
    }
}

/// Receiver of readings.
pub trait ReadingSink {
    fn publish(&mut self, handle: OutputHandle, value: &ReadingValue);

    /// The complete telegram text, for diagnostics.
    fn publish_telegram(&mut self, _telegram: &str) {}
}

/// Sink that keeps everything it is given.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingSink {
    pub readings: Vec<(OutputHandle, ReadingValue)>,
    pub telegrams: Vec<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values published to `handle`, oldest first.
    pub fn values_for(&self, handle: OutputHandle) -> Vec<&ReadingValue> {
        self.readings
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn last(&self, handle: OutputHandle) -> Option<&ReadingValue> {
        self.readings
            .iter()
            .rev()
            .find(|(h, _)| *h == handle)
            .map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.readings.clear();
        self.telegrams.clear();
    }
}

impl ReadingSink for RecordingSink {
    fn publish(&mut self, handle: OutputHandle, value: &ReadingValue) {
        self.readings.push((handle, value.clone()));
    }

    fn publish_telegram(&mut self, telegram: &str) {
        self.telegrams.push(telegram.to_string());
    }
}

/// Names of the outputs, indexed by handle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputTable {
    names: Vec<String>,
}

impl OutputTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next handle for `name`.
    pub fn assign(&mut self, name: &str) -> OutputHandle {
        let handle = OutputHandle(self.names.len() as u32);
        self.names.push(name.to_string());
        handle
    }

    pub fn name(&self, handle: OutputHandle) -> Option<&str> {
        self.names.get(handle.0 as usize).map(String::as_str)
    }

    pub fn handle(&self, name: &str) -> Option<OutputHandle> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| OutputHandle(i as u32))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
