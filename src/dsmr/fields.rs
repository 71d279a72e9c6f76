//! # P1 Field Registry
//!
//! The fixed set of fields this crate knows how to decode, keyed by OBIS id.
//! Each [`FieldDescriptor`] names a field, gives its identifier and picks one
//! of a handful of value decoders ([`FieldParser`]). A [`FieldRegistry`] is
//! the ordered list of descriptors active for one reader; it is built once
//! and never changes afterwards. Registry order is match priority: when two
//! descriptors share an identifier the earlier one wins.
//!
//! Sub-meter fields (gas, water, thermal, sub) live on an M-Bus channel whose
//! number is the B part of their OBIS id, so the table is instantiated for a
//! given [`MbusChannels`] assignment.

use crate::constants::{
    DEFAULT_GAS_MBUS_ID, DEFAULT_SUB_MBUS_ID, DEFAULT_THERMAL_MBUS_ID, DEFAULT_WATER_MBUS_ID,
    DSMR_FIXED_DECIMALS, DSMR_VALUE_OPEN,
};
use crate::dsmr::obis::ObisId;
use crate::dsmr::parser::{parse_num, parse_raw, parse_string, ParseResult, Parsed};
use chrono::NaiveDateTime;

/// Units as they appear after the `*` separator.
pub mod units {
    pub const NONE: &str = "";
    pub const KWH: &str = "kWh";
    pub const WH: &str = "Wh";
    pub const KW: &str = "kW";
    pub const W: &str = "W";
    pub const V: &str = "V";
    pub const MV: &str = "mV";
    pub const A: &str = "A";
    pub const MA: &str = "mA";
    pub const M3: &str = "m3";
    pub const DM3: &str = "dm3";
    pub const GJ: &str = "GJ";
    pub const MJ: &str = "MJ";
    pub const KVAR: &str = "kvar";
    pub const KVARH: &str = "kvarh";
    pub const KVA: &str = "kVA";
    pub const VA: &str = "VA";
    pub const S: &str = "s";
    pub const HZ: &str = "Hz";
    pub const KHZ: &str = "kHz";
}

/// Length of a DSMR timestamp value, e.g. `230101120000W`.
pub const TIMESTAMP_LEN: usize = 13;

/// Maximum length of one history group in a maximum-demand list.
const LAST_FIXED_GROUP_MAX: usize = 20;

/// A fixed-point reading stored in thousandths of its unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedValue {
    raw: u64,
}

impl FixedValue {
    pub fn from_raw(raw: u64) -> Self {
        Self { raw }
    }

    /// Value in thousandths of the field's primary unit.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn value(&self) -> f64 {
        self.raw as f64 / 1000.0
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Fixed(FixedValue),
    /// Sub-meter reading with the meter's own capture time
    TimestampedFixed { timestamp: String, value: FixedValue },
    Int(u64),
}

impl FieldValue {
    /// Numeric view; `None` for text fields.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Fixed(v) => Some(v.value()),
            FieldValue::TimestampedFixed { value, .. } => Some(value.value()),
            FieldValue::Int(n) => Some(*n as f64),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Capture time of a timestamped reading, when it is well formed.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            FieldValue::TimestampedFixed { timestamp, .. } => parse_timestamp(timestamp),
            _ => None,
        }
    }
}

/// Decoder selection for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldParser {
    /// Rest of the line, verbatim
    Raw,
    /// `(text)` with a length window
    String { min: usize, max: usize },
    /// `(YYMMDDhhmmssX)`
    Timestamp,
    /// `(value*unit)`, falling back to an integer in `int_unit`
    Fixed {
        unit: &'static str,
        int_unit: &'static str,
    },
    /// `(timestamp)(value*unit)`
    TimestampedFixed {
        unit: &'static str,
        int_unit: &'static str,
    },
    /// Fixed value taken from the last of several bracket groups
    LastFixed {
        unit: &'static str,
        int_unit: &'static str,
    },
    /// `(digits[*unit])`
    Int { unit: &'static str },
}

impl FieldParser {
    /// Decode the value part of a line, `[pos, end)`.
    pub fn parse(&self, buf: &[u8], pos: usize, end: usize) -> ParseResult<FieldValue> {
        match *self {
            FieldParser::Raw => parse_raw(buf, pos, end).map(|p| p.map(FieldValue::Text)),
            FieldParser::String { min, max } => {
                parse_string(buf, pos, end, min, max).map(|p| p.map(FieldValue::Text))
            }
            FieldParser::Timestamp => parse_string(buf, pos, end, TIMESTAMP_LEN, TIMESTAMP_LEN)
                .map(|p| p.map(FieldValue::Text)),
            FieldParser::Fixed { unit, int_unit } => {
                parse_fixed(buf, pos, end, unit, int_unit).map(|p| p.map(FieldValue::Fixed))
            }
            FieldParser::TimestampedFixed { unit, int_unit } => {
                let ts = parse_string(buf, pos, end, TIMESTAMP_LEN, TIMESTAMP_LEN)?;
                let value = parse_fixed(buf, ts.next, end, unit, int_unit)?;
                Ok(value.map(|value| FieldValue::TimestampedFixed {
                    timestamp: ts.value,
                    value,
                }))
            }
            FieldParser::LastFixed { unit, int_unit } => {
                let last = last_group_start(buf, pos, end);
                parse_fixed(buf, last, end, unit, int_unit).map(|p| p.map(FieldValue::Fixed))
            }
            FieldParser::Int { unit } => {
                parse_num(buf, pos, end, 0, unit).map(|p| p.map(FieldValue::Int))
            }
        }
    }

    /// Primary unit of numeric fields, empty for text fields.
    pub fn unit(&self) -> &'static str {
        match *self {
            FieldParser::Fixed { unit, .. }
            | FieldParser::TimestampedFixed { unit, .. }
            | FieldParser::LastFixed { unit, .. }
            | FieldParser::Int { unit } => unit,
            _ => units::NONE,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            FieldParser::Raw | FieldParser::String { .. } | FieldParser::Timestamp
        )
    }
}

/// Fixed-point value in `unit`, or an integer in `int_unit` (which is a
/// thousandth of `unit`, e.g. kWh / Wh). A value matching neither is an
/// error, reported as the failure of the primary attempt.
fn parse_fixed(
    buf: &[u8],
    pos: usize,
    end: usize,
    unit: &str,
    int_unit: &str,
) -> ParseResult<FixedValue> {
    match parse_num(buf, pos, end, DSMR_FIXED_DECIMALS, unit) {
        Ok(p) => Ok(p.map(FixedValue::from_raw)),
        Err(primary) => match parse_num(buf, pos, end, 0, int_unit) {
            Ok(p) => Ok(p.map(FixedValue::from_raw)),
            Err(_) => Err(primary),
        },
    }
}

/// Offset of the last well formed `(...)` group in a run of groups.
fn last_group_start(buf: &[u8], pos: usize, end: usize) -> usize {
    let end = end.min(buf.len());
    let mut last = pos;
    let mut cursor = pos;
    while cursor < end && buf[cursor] == DSMR_VALUE_OPEN {
        last = cursor;
        match parse_string(buf, cursor, end, 1, LAST_FIXED_GROUP_MAX) {
            Ok(Parsed { next, .. }) => cursor = next,
            Err(_) => break,
        }
    }
    last
}

/// Convert a DSMR timestamp (`YYMMDDhhmmssX`, X = `S` summer / `W` winter)
/// to a naive local date-time.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if text.len() != TIMESTAMP_LEN || !text.is_ascii() {
        return None;
    }
    let (digits, dst) = text.split_at(TIMESTAMP_LEN - 1);
    if !matches!(dst, "S" | "W" | "s" | "w") {
        return None;
    }
    NaiveDateTime::parse_from_str(digits, "%y%m%d%H%M%S").ok()
}

/// One decodable field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub id: ObisId,
    pub parser: FieldParser,
}

/// M-Bus channel numbers of the sub-meters attached to the P1 meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbusChannels {
    pub gas: u8,
    pub water: u8,
    pub thermal: u8,
    pub sub: u8,
}

impl Default for MbusChannels {
    fn default() -> Self {
        Self {
            gas: DEFAULT_GAS_MBUS_ID,
            water: DEFAULT_WATER_MBUS_ID,
            thermal: DEFAULT_THERMAL_MBUS_ID,
            sub: DEFAULT_SUB_MBUS_ID,
        }
    }
}

const fn fixed(unit: &'static str, int_unit: &'static str) -> FieldParser {
    FieldParser::Fixed { unit, int_unit }
}

const fn string(min: usize, max: usize) -> FieldParser {
    FieldParser::String { min, max }
}

const fn int(unit: &'static str) -> FieldParser {
    FieldParser::Int { unit }
}

/// The complete field table, in match priority order.
pub fn standard_fields(ch: MbusChannels) -> Vec<FieldDescriptor> {
    use units::*;
    use FieldParser::{LastFixed, Raw, Timestamp, TimestampedFixed};

    let f = |name: &'static str, id: ObisId, parser: FieldParser| FieldDescriptor { name, id, parser };
    let o = ObisId::new;

    vec![
        f("identification", ObisId::IDENTIFICATION, Raw),
        f("p1_version", o(1, 3, 0, 2, 8), string(2, 2)),
        f("p1_version_be", o(0, 0, 96, 1, 4), string(2, 96)),
        f("p1_version_ch", o(0, 0, 96, 1, 4), string(2, 96)),
        f("timestamp", o(0, 0, 1, 0, 0), Timestamp),
        f("equipment_id", o(0, 0, 96, 1, 1), string(0, 96)),
        // Active energy, delivered to the client
        f("energy_delivered_lux", o(1, 0, 1, 8, 0), fixed(KWH, WH)),
        f("energy_delivered_tariff1", o(1, 0, 1, 8, 1), fixed(KWH, WH)),
        f("energy_delivered_tariff2", o(1, 0, 1, 8, 2), fixed(KWH, WH)),
        f("energy_delivered_tariff3", o(1, 0, 1, 8, 3), fixed(KWH, WH)),
        f("energy_delivered_tariff4", o(1, 0, 1, 8, 4), fixed(KWH, WH)),
        f("reactive_energy_delivered_tariff1", o(1, 0, 3, 8, 1), fixed(KVARH, KVARH)),
        f("reactive_energy_delivered_tariff2", o(1, 0, 3, 8, 2), fixed(KVARH, KVARH)),
        f("reactive_energy_delivered_tariff3", o(1, 0, 3, 8, 3), fixed(KVARH, KVARH)),
        f("reactive_energy_delivered_tariff4", o(1, 0, 3, 8, 4), fixed(KVARH, KVARH)),
        f("energy_delivered_tariff1_ch", o(1, 1, 1, 8, 1), fixed(KWH, WH)),
        f("energy_delivered_tariff2_ch", o(1, 1, 1, 8, 2), fixed(KWH, WH)),
        // Active energy, returned by the client
        f("energy_returned_lux", o(1, 0, 2, 8, 0), fixed(KWH, WH)),
        f("energy_returned_tariff1", o(1, 0, 2, 8, 1), fixed(KWH, WH)),
        f("energy_returned_tariff2", o(1, 0, 2, 8, 2), fixed(KWH, WH)),
        f("energy_returned_tariff3", o(1, 0, 2, 8, 3), fixed(KWH, WH)),
        f("energy_returned_tariff4", o(1, 0, 2, 8, 4), fixed(KWH, WH)),
        f("reactive_energy_returned_tariff1", o(1, 0, 4, 8, 1), fixed(KVARH, KVARH)),
        f("reactive_energy_returned_tariff2", o(1, 0, 4, 8, 2), fixed(KVARH, KVARH)),
        f("reactive_energy_returned_tariff3", o(1, 0, 4, 8, 3), fixed(KVARH, KVARH)),
        f("reactive_energy_returned_tariff4", o(1, 0, 4, 8, 4), fixed(KVARH, KVARH)),
        f("energy_returned_tariff1_ch", o(1, 1, 2, 8, 1), fixed(KWH, WH)),
        f("energy_returned_tariff2_ch", o(1, 1, 2, 8, 2), fixed(KWH, WH)),
        f("total_imported_energy", o(1, 0, 3, 8, 0), fixed(KVARH, KVARH)),
        f("total_exported_energy", o(1, 0, 4, 8, 0), fixed(KVARH, KVARH)),
        f("electricity_tariff", o(0, 0, 96, 14, 0), string(4, 4)),
        // Instantaneous power
        f("power_delivered", o(1, 0, 1, 7, 0), fixed(KW, W)),
        f("power_returned", o(1, 0, 2, 7, 0), fixed(KW, W)),
        f("reactive_power_delivered", o(1, 0, 3, 7, 0), fixed(KVAR, KVAR)),
        f("reactive_power_returned", o(1, 0, 4, 7, 0), fixed(KVAR, KVAR)),
        f("power_delivered_ch", o(1, 1, 1, 7, 0), fixed(KW, W)),
        f("power_returned_ch", o(1, 1, 2, 7, 0), fixed(KW, W)),
        f("electricity_threshold", o(0, 0, 17, 0, 0), fixed(KW, W)),
        f("electricity_switch_position", o(0, 0, 96, 3, 10), int(NONE)),
        // Power quality
        f("electricity_failures", o(0, 0, 96, 7, 21), int(NONE)),
        f("electricity_long_failures", o(0, 0, 96, 7, 9), int(NONE)),
        f("electricity_failure_log", o(1, 0, 99, 97, 0), Raw),
        f("electricity_sags_l1", o(1, 0, 32, 32, 0), int(NONE)),
        f("voltage_sag_time_l1", o(1, 0, 32, 33, 0), int(S)),
        f("voltage_sag_l1", o(1, 0, 32, 34, 0), int(V)),
        f("electricity_sags_l2", o(1, 0, 52, 32, 0), int(NONE)),
        f("voltage_sag_time_l2", o(1, 0, 52, 33, 0), int(S)),
        f("voltage_sag_l2", o(1, 0, 52, 34, 0), int(V)),
        f("electricity_sags_l3", o(1, 0, 72, 32, 0), int(NONE)),
        f("voltage_sag_time_l3", o(1, 0, 72, 33, 0), int(S)),
        f("voltage_sag_l3", o(1, 0, 72, 34, 0), int(V)),
        f("electricity_swells_l1", o(1, 0, 32, 36, 0), int(NONE)),
        f("voltage_swell_time_l1", o(1, 0, 32, 37, 0), int(S)),
        f("voltage_swell_l1", o(1, 0, 32, 38, 0), int(V)),
        f("electricity_swells_l2", o(1, 0, 52, 36, 0), int(NONE)),
        f("voltage_swell_time_l2", o(1, 0, 52, 37, 0), int(S)),
        f("voltage_swell_l2", o(1, 0, 52, 38, 0), int(V)),
        f("electricity_swells_l3", o(1, 0, 72, 36, 0), int(NONE)),
        f("voltage_swell_time_l3", o(1, 0, 72, 37, 0), int(S)),
        f("voltage_swell_l3", o(1, 0, 72, 38, 0), int(V)),
        f("message_short", o(0, 0, 96, 13, 1), string(0, 16)),
        f("message_long", o(0, 0, 96, 13, 0), string(0, 2048)),
        // Voltage, current, frequency
        f("voltage_l1", o(1, 0, 32, 7, 0), fixed(V, MV)),
        f("voltage_avg_l1", o(1, 0, 32, 24, 0), fixed(V, MV)),
        f("voltage_l2", o(1, 0, 52, 7, 0), fixed(V, MV)),
        f("voltage_avg_l2", o(1, 0, 52, 24, 0), fixed(V, MV)),
        f("voltage_l3", o(1, 0, 72, 7, 0), fixed(V, MV)),
        f("voltage_avg_l3", o(1, 0, 72, 24, 0), fixed(V, MV)),
        f("voltage", o(1, 0, 12, 7, 0), fixed(V, MV)),
        f("frequency", o(1, 0, 14, 7, 0), fixed(KHZ, HZ)),
        f("abs_power", o(1, 0, 15, 7, 0), fixed(KW, W)),
        f("current_l1", o(1, 0, 31, 7, 0), fixed(A, MA)),
        f("current_fuse_l1", o(1, 0, 31, 4, 0), fixed(A, MA)),
        f("current_l2", o(1, 0, 51, 7, 0), fixed(A, MA)),
        f("current_fuse_l2", o(1, 0, 51, 4, 0), fixed(A, MA)),
        f("current_l3", o(1, 0, 71, 7, 0), fixed(A, MA)),
        f("current_fuse_l3", o(1, 0, 71, 4, 0), fixed(A, MA)),
        f("current", o(1, 0, 11, 7, 0), fixed(A, MA)),
        f("current_n", o(1, 0, 91, 7, 0), fixed(A, MA)),
        f("current_sum", o(1, 0, 90, 7, 0), fixed(A, MA)),
        // Per phase power
        f("power_delivered_l1", o(1, 0, 21, 7, 0), fixed(KW, W)),
        f("power_delivered_l2", o(1, 0, 41, 7, 0), fixed(KW, W)),
        f("power_delivered_l3", o(1, 0, 61, 7, 0), fixed(KW, W)),
        f("power_returned_l1", o(1, 0, 22, 7, 0), fixed(KW, W)),
        f("power_returned_l2", o(1, 0, 42, 7, 0), fixed(KW, W)),
        f("power_returned_l3", o(1, 0, 62, 7, 0), fixed(KW, W)),
        f("reactive_power_delivered_l1", o(1, 0, 23, 7, 0), fixed(KVAR, KVAR)),
        f("reactive_power_delivered_l2", o(1, 0, 43, 7, 0), fixed(KVAR, KVAR)),
        f("reactive_power_delivered_l3", o(1, 0, 63, 7, 0), fixed(KVAR, KVAR)),
        f("reactive_power_returned_l1", o(1, 0, 24, 7, 0), fixed(KVAR, KVAR)),
        f("reactive_power_returned_l2", o(1, 0, 44, 7, 0), fixed(KVAR, KVAR)),
        f("reactive_power_returned_l3", o(1, 0, 64, 7, 0), fixed(KVAR, KVAR)),
        f("apparent_delivery_power", o(1, 0, 9, 7, 0), fixed(KVA, VA)),
        f("apparent_delivery_power_l1", o(1, 0, 29, 7, 0), fixed(KVA, VA)),
        f("apparent_delivery_power_l2", o(1, 0, 49, 7, 0), fixed(KVA, VA)),
        f("apparent_delivery_power_l3", o(1, 0, 69, 7, 0), fixed(KVA, VA)),
        f("apparent_return_power", o(1, 0, 10, 7, 0), fixed(KVA, VA)),
        f("apparent_return_power_l1", o(1, 0, 30, 7, 0), fixed(KVA, VA)),
        f("apparent_return_power_l2", o(1, 0, 50, 7, 0), fixed(KVA, VA)),
        f("apparent_return_power_l3", o(1, 0, 70, 7, 0), fixed(KVA, VA)),
        f("active_demand_power", o(1, 0, 1, 24, 0), fixed(KW, W)),
        f("active_demand_abs", o(1, 0, 15, 24, 0), fixed(KW, W)),
        // Sub-meters on the M-Bus
        f("gas_device_type", o(0, ch.gas, 24, 1, 0), int(NONE)),
        f("gas_equipment_id", o(0, ch.gas, 96, 1, 0), string(0, 96)),
        f("gas_equipment_id_be", o(0, ch.gas, 96, 1, 1), string(0, 96)),
        f("gas_valve_position", o(0, ch.gas, 24, 4, 0), int(NONE)),
        f("gas_delivered", o(0, ch.gas, 24, 2, 1), TimestampedFixed { unit: M3, int_unit: DM3 }),
        f("gas_delivered_be", o(0, ch.gas, 24, 2, 3), TimestampedFixed { unit: M3, int_unit: DM3 }),
        f("gas_delivered_text", o(0, ch.gas, 24, 3, 0), Raw),
        f("thermal_device_type", o(0, ch.thermal, 24, 1, 0), int(NONE)),
        f("thermal_equipment_id", o(0, ch.thermal, 96, 1, 0), string(0, 96)),
        f("thermal_valve_position", o(0, ch.thermal, 24, 4, 0), int(NONE)),
        f("thermal_delivered", o(0, ch.thermal, 24, 2, 1), TimestampedFixed { unit: GJ, int_unit: MJ }),
        f("water_device_type", o(0, ch.water, 24, 1, 0), int(NONE)),
        f("water_equipment_id", o(0, ch.water, 96, 1, 0), string(0, 96)),
        f("water_valve_position", o(0, ch.water, 24, 4, 0), int(NONE)),
        f("water_delivered", o(0, ch.water, 24, 2, 1), TimestampedFixed { unit: M3, int_unit: DM3 }),
        f("sub_device_type", o(0, ch.sub, 24, 1, 0), int(NONE)),
        f("sub_equipment_id", o(0, ch.sub, 96, 1, 0), string(0, 96)),
        f("sub_valve_position", o(0, ch.sub, 24, 4, 0), int(NONE)),
        f("sub_delivered", o(0, ch.sub, 24, 2, 1), TimestampedFixed { unit: M3, int_unit: DM3 }),
        // Demand registers
        f("active_energy_import_current_average_demand", o(1, 0, 1, 4, 0), fixed(KW, W)),
        f("active_energy_export_current_average_demand", o(1, 0, 2, 4, 0), fixed(KW, W)),
        f("reactive_energy_import_current_average_demand", o(1, 0, 3, 4, 0), fixed(KVAR, KVAR)),
        f("reactive_energy_export_current_average_demand", o(1, 0, 4, 4, 0), fixed(KVAR, KVAR)),
        f("apparent_energy_import_current_average_demand", o(1, 0, 9, 4, 0), fixed(KVA, VA)),
        f("apparent_energy_export_current_average_demand", o(1, 0, 10, 4, 0), fixed(KVA, VA)),
        f("active_energy_import_last_completed_demand", o(1, 0, 1, 5, 0), fixed(KW, W)),
        f("active_energy_export_last_completed_demand", o(1, 0, 2, 5, 0), fixed(KW, W)),
        f("reactive_energy_import_last_completed_demand", o(1, 0, 3, 5, 0), fixed(KVAR, KVAR)),
        f("reactive_energy_export_last_completed_demand", o(1, 0, 4, 5, 0), fixed(KVAR, KVAR)),
        f("apparent_energy_import_last_completed_demand", o(1, 0, 9, 5, 0), fixed(KVA, VA)),
        f("apparent_energy_export_last_completed_demand", o(1, 0, 10, 5, 0), fixed(KVA, VA)),
        f(
            "active_energy_import_maximum_demand_running_month",
            o(1, 0, 1, 6, 0),
            TimestampedFixed { unit: KW, int_unit: W },
        ),
        f(
            "active_energy_import_maximum_demand_last_13_months",
            o(0, 0, 98, 1, 0),
            LastFixed { unit: KW, int_unit: W },
        ),
        // Firmware
        f("fw_core_version", o(1, 0, 0, 2, 0), fixed(NONE, NONE)),
        f("fw_core_checksum", o(1, 0, 0, 2, 8), string(0, 8)),
        f("fw_module_version", o(1, 1, 0, 2, 0), fixed(NONE, NONE)),
        f("fw_module_checksum", o(1, 1, 0, 2, 8), string(0, 8)),
    ]
}

/// The ordered, immutable set of fields one reader decodes.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRegistry {
    fields: Vec<FieldDescriptor>,
}

impl FieldRegistry {
    /// Every known field.
    pub fn all(channels: MbusChannels) -> Self {
        Self {
            fields: standard_fields(channels),
        }
    }

    /// Only the named fields, kept in table order. With no names the
    /// registry holds just the identification line. Unknown names are
    /// logged and skipped.
    pub fn select<S: AsRef<str>>(channels: MbusChannels, names: &[S]) -> Self {
        let table = standard_fields(channels);
        if names.is_empty() {
            return Self {
                fields: table
                    .into_iter()
                    .filter(|d| d.id == ObisId::IDENTIFICATION)
                    .collect(),
            };
        }

        for name in names {
            let name = name.as_ref();
            if !table.iter().any(|d| d.name == name) {
                log::warn!("Unknown field name '{name}' ignored");
            }
        }
        Self {
            fields: table
                .into_iter()
                .filter(|d| names.iter().any(|n| n.as_ref() == d.name))
                .collect(),
        }
    }

    pub fn from_descriptors(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&FieldDescriptor> {
        self.fields.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    /// First descriptor whose identifier equals `id`, with its slot.
    pub fn find(&self, id: &ObisId) -> Option<(usize, &FieldDescriptor)> {
        self.fields.iter().enumerate().find(|(_, d)| d.id == *id)
    }

    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|d| d.name == name)
    }
}
