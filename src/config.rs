//! # Reader Configuration
//!
//! [`DsmrConfig`] is the plain data the reader is built from, loadable from
//! JSON:
//!
//! ```json
//! {
//!   "max_telegram_length": 1500,
//!   "receive_timeout_ms": 200,
//!   "crc_check": true,
//!   "decryption_key": "00112233445566778899AABBCCDDEEFF",
//!   "sensors": ["energy_delivered_tariff1", "power_delivered"],
//!   "custom_sensors": [
//!     { "code": "1-0:1.8.0", "name": "total_import", "type": "sensor" }
//!   ],
//!   "telegram": true
//! }
//! ```
//!
//! Problems with individual settings are reported once and the affected
//! capability falls back (default buffer size, decryption disabled, binding
//! skipped); only unreadable or malformed files are hard errors.

use crate::constants::{
    DEFAULT_GAS_MBUS_ID, DEFAULT_MAX_TELEGRAM_LENGTH, DEFAULT_RECEIVE_TIMEOUT_MS,
    DEFAULT_REQUEST_INTERVAL_MS, DEFAULT_SUB_MBUS_ID, DEFAULT_THERMAL_MBUS_ID,
    DEFAULT_WATER_MBUS_ID,
};
use crate::dsmr::acquisition::AcquisitionConfig;
use crate::dsmr::encrypted::{DecryptError, DecryptionKey};
use crate::dsmr::fields::{FieldRegistry, MbusChannels};
use crate::dsmr::obis::ObisId;
use crate::dsmr::telegram::ParseOptions;
use crate::publish::bindings::{CustomFieldBinding, OutputKind, StandardBinding};
use crate::publish::OutputTable;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("max_telegram_length must be greater than zero")]
    ZeroTelegramLength,

    #[error("Invalid decryption key: {0}")]
    InvalidKey(#[from] DecryptError),

    #[error("Invalid OBIS code '{code}' for custom sensor '{name}'")]
    InvalidObisCode { code: String, name: String },
}

/// A user declared OBIS code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSensorConfig {
    pub code: String,
    pub name: String,
    #[serde(rename = "type", default = "default_output_kind")]
    pub kind: OutputKind,
}

fn default_output_kind() -> OutputKind {
    OutputKind::Sensor
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DsmrConfig {
    pub max_telegram_length: usize,
    pub receive_timeout_ms: u64,
    pub request_interval_ms: u64,
    pub crc_check: bool,
    pub decryption_key: Option<String>,
    pub gas_mbus_id: u8,
    pub water_mbus_id: u8,
    pub thermal_mbus_id: u8,
    pub sub_mbus_id: u8,
    /// Built-in fields to publish, by name
    pub sensors: Vec<String>,
    pub custom_sensors: Vec<CustomSensorConfig>,
    /// Publish the raw telegram text
    pub telegram: bool,
    pub unknown_field_error: bool,
}

impl Default for DsmrConfig {
    fn default() -> Self {
        Self {
            max_telegram_length: DEFAULT_MAX_TELEGRAM_LENGTH,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            request_interval_ms: DEFAULT_REQUEST_INTERVAL_MS,
            crc_check: true,
            decryption_key: None,
            gas_mbus_id: DEFAULT_GAS_MBUS_ID,
            water_mbus_id: DEFAULT_WATER_MBUS_ID,
            thermal_mbus_id: DEFAULT_THERMAL_MBUS_ID,
            sub_mbus_id: DEFAULT_SUB_MBUS_ID,
            sensors: Vec::new(),
            custom_sensors: Vec::new(),
            telegram: false,
            unknown_field_error: false,
        }
    }
}

/// Output bindings derived from a configuration.
#[derive(Debug, Clone)]
pub struct OutputBindings {
    pub table: OutputTable,
    pub standard: Vec<StandardBinding>,
    pub custom: Vec<CustomFieldBinding>,
}

impl DsmrConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Settings that are wrong but have a fallback.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut problems = self.validate_settings();
        if let Err(e) = self.decryption_key() {
            problems.push(e);
        }
        problems
    }

    /// Like [`validate`](Self::validate), without the decryption key, which
    /// [`decryption_key`](Self::decryption_key) reports on its own.
    pub fn validate_settings(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();
        if self.max_telegram_length == 0 {
            problems.push(ConfigError::ZeroTelegramLength);
        }
        for sensor in &self.custom_sensors {
            if sensor.code.parse::<ObisId>().is_err() {
                problems.push(ConfigError::InvalidObisCode {
                    code: sensor.code.clone(),
                    name: sensor.name.clone(),
                });
            }
        }
        problems
    }

    /// Buffer capacity, falling back to the default for 0.
    pub fn effective_max_telegram_length(&self) -> usize {
        if self.max_telegram_length == 0 {
            DEFAULT_MAX_TELEGRAM_LENGTH
        } else {
            self.max_telegram_length
        }
    }

    /// The configured key. Absent or empty means no decryption.
    pub fn decryption_key(&self) -> Result<Option<DecryptionKey>, ConfigError> {
        match self.decryption_key.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => Ok(Some(DecryptionKey::from_hex(text)?)),
        }
    }

    pub fn mbus_channels(&self) -> MbusChannels {
        MbusChannels {
            gas: self.gas_mbus_id,
            water: self.water_mbus_id,
            thermal: self.thermal_mbus_id,
            sub: self.sub_mbus_id,
        }
    }

    pub fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            max_telegram_length: self.effective_max_telegram_length(),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            request_interval: Duration::from_millis(self.request_interval_ms),
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            check_crc: self.crc_check,
            unknown_error: self.unknown_field_error,
        }
    }

    pub fn field_registry(&self) -> FieldRegistry {
        FieldRegistry::select(self.mbus_channels(), self.sensors.as_slice())
    }

    /// Assign output handles in declaration order: built-in sensors first,
    /// then custom sensors. Built-in names missing from `registry` and custom
    /// sensors with an unusable code are skipped.
    pub fn bindings(&self, registry: &FieldRegistry) -> OutputBindings {
        let mut table = OutputTable::new();

        let standard = self
            .sensors
            .iter()
            .filter(|name| registry.slot_of(name).is_some())
            .map(|name| StandardBinding {
                name: name.clone(),
                handle: table.assign(name),
            })
            .collect();

        let mut custom = Vec::new();
        for sensor in &self.custom_sensors {
            if let Ok(id) = sensor.code.parse::<ObisId>() {
                custom.push(CustomFieldBinding::new(id, sensor.kind, table.assign(&sensor.name)));
            }
        }

        OutputBindings {
            table,
            standard,
            custom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = DsmrConfig::from_json_str("{}").unwrap();
        assert_eq!(config, DsmrConfig::default());
        assert!(config.validate().is_empty());
        assert_eq!(config.decryption_key().unwrap(), None);
    }

    #[test]
    fn test_zero_length_falls_back() {
        let config = DsmrConfig::from_json_str(r#"{"max_telegram_length": 0}"#).unwrap();
        assert!(matches!(config.validate()[0], ConfigError::ZeroTelegramLength));
        assert_eq!(config.acquisition().max_telegram_length, DEFAULT_MAX_TELEGRAM_LENGTH);
    }

    #[test]
    fn test_handles_in_declaration_order() {
        let config = DsmrConfig::from_json_str(
            r#"{
                "sensors": ["power_delivered", "bogus"],
                "custom_sensors": [
                    {"code": "1-0:99.99.9", "name": "odd", "type": "text_sensor"},
                    {"code": "not-obis", "name": "broken"}
                ]
            }"#,
        )
        .unwrap();
        let bindings = config.bindings(&config.field_registry());
        assert_eq!(bindings.standard.len(), 1);
        assert_eq!(bindings.custom.len(), 1);
        assert_eq!(bindings.table.name(bindings.custom[0].handle), Some("odd"));
        assert_eq!(bindings.custom[0].kind, OutputKind::TextSensor);
        assert_eq!(config.validate().len(), 1);
    }
}
