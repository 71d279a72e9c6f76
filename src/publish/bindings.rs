//! # Output Bindings
//!
//! Which registry slot publishes where. Built-in fields get a tri-state
//! [`Binding`]; user declared OBIS codes get a [`CustomFieldBinding`] with
//! its own debounce state. A custom binding on the identifier of a bound
//! built-in field takes that field over: the slot becomes
//! [`Binding::Custom`] and stops publishing on its own. This is resolved
//! once, when the registry is built.

use crate::constants::{CUSTOM_FLOAT_TOLERANCE, CUSTOM_MIN_PUBLISH_INTERVAL_MS};
use crate::dsmr::fields::FieldRegistry;
use crate::dsmr::obis::ObisId;
use crate::publish::OutputHandle;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Value kind of a custom output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Numeric reading
    Sensor,
    /// Free text reading
    TextSensor,
}

/// Publication state of one built-in slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binding {
    #[default]
    Unbound,
    Standard(OutputHandle),
    /// Taken over by the custom binding publishing to this handle
    Custom(OutputHandle),
}

impl Binding {
    /// Handle the slot publishes to itself.
    pub fn standard_handle(&self) -> Option<OutputHandle> {
        match self {
            Binding::Standard(h) => Some(*h),
            _ => None,
        }
    }

    pub fn is_overridden(&self) -> bool {
        matches!(self, Binding::Custom(_))
    }
}

/// A built-in field the user wants published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardBinding {
    pub name: String,
    pub handle: OutputHandle,
}

/// Publish suppression for repeated readings.
#[derive(Debug, Clone, PartialEq)]
pub struct Debounce {
    last_number: Option<f64>,
    last_text: Option<String>,
    last_publish: Option<Instant>,
    min_interval: Duration,
    tolerance: f64,
}

impl Default for Debounce {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(CUSTOM_MIN_PUBLISH_INTERVAL_MS),
            CUSTOM_FLOAT_TOLERANCE,
        )
    }
}

impl Debounce {
    pub fn new(min_interval: Duration, tolerance: f64) -> Self {
        Self {
            last_number: None,
            last_text: None,
            last_publish: None,
            min_interval,
            tolerance,
        }
    }

    fn interval_elapsed(&self, now: Instant) -> bool {
        self.last_publish
            .map_or(true, |last| now.saturating_duration_since(last) >= self.min_interval)
    }

    /// Decide on a numeric reading; records it when it is to be published.
    pub fn offer_number(&mut self, value: f64, now: Instant) -> bool {
        let changed = self
            .last_number
            .map_or(true, |last| (value - last).abs() > self.tolerance);
        if !(changed || self.interval_elapsed(now)) {
            return false;
        }
        self.last_number = Some(value);
        self.last_publish = Some(now);
        true
    }

    /// Decide on a text reading; records it when it is to be published.
    pub fn offer_text(&mut self, value: &str, now: Instant) -> bool {
        let changed = self.last_text.as_deref() != Some(value);
        if !(changed || self.interval_elapsed(now)) {
            return false;
        }
        self.last_text = Some(value.to_string());
        self.last_publish = Some(now);
        true
    }

    pub fn last_publish(&self) -> Option<Instant> {
        self.last_publish
    }
}

/// A user declared OBIS code and where its value goes.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFieldBinding {
    pub id: ObisId,
    pub kind: OutputKind,
    pub handle: OutputHandle,
    pub debounce: Debounce,
}

impl CustomFieldBinding {
    pub fn new(id: ObisId, kind: OutputKind, handle: OutputHandle) -> Self {
        Self {
            id,
            kind,
            handle,
            debounce: Debounce::default(),
        }
    }
}

/// Bindings of all built-in slots plus the custom bindings.
#[derive(Debug, Clone, Default)]
pub struct BindingRegistry {
    standard: Vec<Binding>,
    custom: Vec<CustomFieldBinding>,
}

impl BindingRegistry {
    /// Bind the slots of `registry` and apply custom overrides.
    pub fn resolve(
        registry: &FieldRegistry,
        standard: &[StandardBinding],
        custom: Vec<CustomFieldBinding>,
    ) -> Self {
        let mut slots: Vec<Binding> = registry
            .iter()
            .map(|d| {
                standard
                    .iter()
                    .find(|b| b.name == d.name)
                    .map_or(Binding::Unbound, |b| Binding::Standard(b.handle))
            })
            .collect();

        for binding in &custom {
            for (slot, descriptor) in registry.iter().enumerate() {
                if descriptor.id != binding.id {
                    continue;
                }
                if let Binding::Standard(_) = slots[slot] {
                    log::info!(
                        "Custom sensor for OBIS {} overrides standard sensor '{}'",
                        binding.id,
                        descriptor.name
                    );
                    slots[slot] = Binding::Custom(binding.handle);
                }
            }
        }

        Self {
            standard: slots,
            custom,
        }
    }

    pub fn binding(&self, slot: usize) -> Binding {
        self.standard.get(slot).copied().unwrap_or_default()
    }

    pub fn custom(&self) -> &[CustomFieldBinding] {
        &self.custom
    }

    /// First custom binding for `id`.
    pub fn find_custom_mut(&mut self, id: &ObisId) -> Option<&mut CustomFieldBinding> {
        self.custom.iter_mut().find(|b| b.id == *id)
    }

    pub fn overridden_count(&self) -> usize {
        self.standard.iter().filter(|b| b.is_overridden()).count()
    }
}
