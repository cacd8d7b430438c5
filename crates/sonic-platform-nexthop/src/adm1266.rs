//! ADM1266 blackbox records.
//!
//! The driver exposes the blackbox as an nvmem blob of 64-byte records:
//!
//! | bytes | field |
//! |-------|-------|
//! | 0-1 | uid |
//! | 2 | bit 0: slot empty |
//! | 3, 4 | action index, rule index |
//! | 5 | VH over-voltage (low nibble), VH under-voltage (high nibble) |
//! | 6-9 | current state, last state |
//! | 10-13 | VP over-voltage, VP under-voltage (13 bits each) |
//! | 14-17 | GPIO in, GPIO out (`[7:4,9:8,R,R,R,3:1]`) |
//! | 18-21 | PDIO in, PDIO out |
//! | 22-23 | powerup counter |
//! | 24-31 | timestamp: 16-bit fraction, then 48-bit seconds |
//! | 63 | CRC |
//!
//! All multi-byte fields are little-endian. Timestamps larger than a year
//! come from an RTC synced to [`CUSTOM_EPOCH`]; smaller ones count from
//! power-on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use chrono::DateTime;
use serde::Deserialize;
use sonic_platform_common::sysfs::parse_bin;
use sonic_platform_common::Sysfs;
use tracing::{debug, info, warn};

use crate::dpm::{
    group_powerups, CauseKind, Dpm, DpmPowerUpEntry, DpmRecord, DpmType, RebootCause, RecordDict,
    Timestamp,
};
use crate::error::{DpmError, DpmResult};

pub const RECORD_SIZE: usize = 64;

/// 2024-01-01 00:00:00 UTC. The RTC sync writes this as the epoch offset so
/// timestamps fit the 48-bit seconds field with room to spare.
pub const CUSTOM_EPOCH: i64 = 1_704_067_200;

pub const MAX_POWERUP_COUNTER: u32 = 65535;

const ONE_YEAR_SECS: u64 = 365 * 24 * 3600;

pub const VH_OV_KEY: &str = "vh_over_voltage_[4:1]";
pub const VH_UV_KEY: &str = "vh_under_voltage_[4:1]";
pub const VP_OV_KEY: &str = "vp_over_voltage_[13:1]";
pub const VP_UV_KEY: &str = "vp_under_voltage_[13:1]";
pub const GPIO_IN_KEY: &str = "gpio_in_[7:4,9:8,R,R,R,3:1]";
pub const GPIO_OUT_KEY: &str = "gpio_out_[7:4,9:8,R,R,R,3:1]";
pub const PDIO_IN_KEY: &str = "pdio_in_[16:1]";
pub const PDIO_OUT_KEY: &str = "pdio_out_[16:1]";

/// GPIO register bit to pin number; bits 3-5 are reserved.
const GPIO_BIT_TO_PIN: [Option<u8>; 12] = [
    Some(1),
    Some(2),
    Some(3),
    None,
    None,
    None,
    Some(8),
    Some(9),
    Some(4),
    Some(5),
    Some(6),
    Some(7),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinKind {
    Vh,
    Vp,
    Gpi,
    Gpo,
    Pdi,
    Pdo,
}

impl PinKind {
    fn prefix(&self) -> &'static str {
        match self {
            PinKind::Vh => "VH",
            PinKind::Vp => "VP",
            PinKind::Gpi => "GPI",
            PinKind::Gpo => "GPO",
            PinKind::Pdi => "PDI",
            PinKind::Pdo => "PDO",
        }
    }

    fn width(&self) -> usize {
        match self {
            PinKind::Vh => 4,
            PinKind::Vp => 13,
            PinKind::Gpi | PinKind::Gpo => 12,
            PinKind::Pdi | PinKind::Pdo => 16,
        }
    }

    fn pin_number(&self, bit: usize) -> Option<u8> {
        match self {
            PinKind::Gpi | PinKind::Gpo => GPIO_BIT_TO_PIN.get(bit).copied().flatten(),
            _ => u8::try_from(bit + 1).ok(),
        }
    }
}

/// A chip pin, optionally renamed after the board signal wired to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    pub name: String,
    pub alias: Option<String>,
}

impl Pin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}({alias})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A status register and the pins asserted in it, highest bit first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinField {
    pub raw: u16,
    pub kind: PinKind,
    pub pins: Vec<Pin>,
}

impl PinField {
    pub fn decode(raw: u16, kind: PinKind) -> Self {
        let pins = (0..kind.width())
            .rev()
            .filter(|bit| raw & (1 << bit) != 0)
            .filter_map(|bit| kind.pin_number(bit))
            .map(|n| Pin::new(format!("{}{n}", kind.prefix())))
            .collect();
        Self { raw, kind, pins }
    }

    fn apply_aliases(&mut self, pin_to_name: &BTreeMap<String, String>) {
        for pin in &mut self.pins {
            pin.alias = pin_to_name.get(&pin.name).cloned();
        }
    }

    /// `0b0101 [VH3, VH1(POS12V)]`, without the list when nothing is set.
    pub fn render(&self) -> String {
        let bits = format!("0b{:0width$b}", self.raw, width = self.kind.width());
        if self.pins.is_empty() {
            return bits;
        }
        let names: Vec<String> = self.pins.iter().map(ToString::to_string).collect();
        format!("{bits} [{}]", names.join(", "))
    }
}

/// One `dpm_signal_to_fault_cause` entry of pd-plugin.json.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FaultSignature {
    pub pdio_mask: String,
    pub gpio_mask: String,
    pub pdio_value: String,
    pub gpio_value: String,
    pub hw_cause: String,
    pub hw_desc: String,
    pub reboot_cause: String,
}

/// A [`FaultSignature`] with its binary strings parsed.
#[derive(Debug, Clone)]
pub struct FaultRule {
    pdio_mask: u64,
    gpio_mask: u64,
    pdio_value: u64,
    gpio_value: u64,
    signature: FaultSignature,
}

impl FaultRule {
    pub fn parse(dpm: &str, signature: &FaultSignature) -> DpmResult<Self> {
        let bin = |field: &str, text: &str| {
            parse_bin(text).ok_or_else(|| {
                DpmError::invalid_config(dpm, format!("{field} '{text}' is not a binary literal"))
            })
        };
        Ok(Self {
            pdio_mask: bin("pdio_mask", &signature.pdio_mask)?,
            gpio_mask: bin("gpio_mask", &signature.gpio_mask)?,
            pdio_value: bin("pdio_value", &signature.pdio_value)?,
            gpio_value: bin("gpio_value", &signature.gpio_value)?,
            signature: signature.clone(),
        })
    }

    fn matches(&self, pdio_in: u16, gpio_in: u16) -> bool {
        u64::from(pdio_in) & self.pdio_mask == self.pdio_value
            && u64::from(gpio_in) & self.gpio_mask == self.gpio_value
    }
}

/// A `DPM` entry of pd-plugin.json.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DpmConfig {
    #[serde(rename = "type", default)]
    pub dpm_type: String,
    #[serde(default)]
    pub nvmem_path: String,
    #[serde(default)]
    pub powerup_counter_path: String,
    #[serde(default)]
    pub rtc_epoch_offset_path: Option<String>,
    #[serde(default)]
    pub dpm_signal_to_fault_cause: Vec<FaultSignature>,
    #[serde(default)]
    pub pin_to_name: BTreeMap<String, String>,
}

/// Parses the `DPM` section, keeping its order.
pub fn dpm_configs(
    section: &serde_json::Map<String, serde_json::Value>,
) -> DpmResult<Vec<(String, DpmConfig)>> {
    section
        .iter()
        .map(|(name, value)| {
            let config = DpmConfig::deserialize(value)
                .map_err(|e| DpmError::invalid_config(name.clone(), e.to_string()))?;
            Ok((name.clone(), config))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adm1266Record {
    pub dpm_name: String,
    pub uid: u16,
    pub byte_2: u8,
    pub action_index: u8,
    pub rule_index: u8,
    pub vh_over_voltage: PinField,
    pub vh_under_voltage: PinField,
    pub current_state: u16,
    pub last_state: u16,
    pub vp_over_voltage: PinField,
    pub vp_under_voltage: PinField,
    pub gpio_in: PinField,
    pub gpio_out: PinField,
    pub pdio_in: PinField,
    pub pdio_out: PinField,
    pub powerup_counter: u16,
    pub timestamp: Timestamp,
    pub crc: u8,
    pub raw: Vec<u8>,
    power_fault_cause: Option<RebootCause>,
}

fn u16_at(data: &[u8], offset: usize) -> u16 {
    LittleEndian::read_u16(&data[offset..offset + 2])
}

fn decode_timestamp(data: &[u8]) -> Timestamp {
    let frac = u64::from(u16_at(data, 0));
    let secs = LittleEndian::read_u48(&data[2..8]);
    let nanos = (frac * 1_000_000_000 / 65536) as u32;
    if secs > ONE_YEAR_SECS {
        let Ok(secs) = i64::try_from(secs) else {
            return Timestamp::Unknown;
        };
        return DateTime::from_timestamp(CUSTOM_EPOCH + secs, nanos)
            .map_or(Timestamp::Unknown, Timestamp::Utc);
    }
    Timestamp::SincePowerOn(Duration::new(secs, nanos))
}

impl Adm1266Record {
    pub fn from_bytes(data: &[u8], dpm_name: &str) -> DpmResult<Self> {
        if data.len() != RECORD_SIZE {
            return Err(DpmError::RecordSize {
                dpm: dpm_name.to_string(),
                len: data.len(),
                expected: RECORD_SIZE,
            });
        }
        Ok(Self {
            dpm_name: dpm_name.to_string(),
            uid: u16_at(data, 0),
            byte_2: data[2],
            action_index: data[3],
            rule_index: data[4],
            vh_over_voltage: PinField::decode(u16::from(data[5] & 0x0f), PinKind::Vh),
            vh_under_voltage: PinField::decode(u16::from(data[5] >> 4), PinKind::Vh),
            current_state: u16_at(data, 6),
            last_state: u16_at(data, 8),
            vp_over_voltage: PinField::decode(u16_at(data, 10), PinKind::Vp),
            vp_under_voltage: PinField::decode(u16_at(data, 12), PinKind::Vp),
            gpio_in: PinField::decode(u16_at(data, 14), PinKind::Gpi),
            gpio_out: PinField::decode(u16_at(data, 16), PinKind::Gpo),
            pdio_in: PinField::decode(u16_at(data, 18), PinKind::Pdi),
            pdio_out: PinField::decode(u16_at(data, 20), PinKind::Pdo),
            powerup_counter: u16_at(data, 22),
            timestamp: decode_timestamp(&data[24..32]),
            crc: data[RECORD_SIZE - 1],
            raw: data.to_vec(),
            power_fault_cause: None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.byte_2 & 0x01 != 0
    }

    fn fields_mut(&mut self) -> [&mut PinField; 8] {
        [
            &mut self.vh_over_voltage,
            &mut self.vh_under_voltage,
            &mut self.vp_over_voltage,
            &mut self.vp_under_voltage,
            &mut self.gpio_in,
            &mut self.gpio_out,
            &mut self.pdio_in,
            &mut self.pdio_out,
        ]
    }

    /// Names pins after board signals and matches the record against the
    /// fault rules; the first matching rule becomes the power fault cause.
    pub fn apply_metadata(&mut self, rules: &[FaultRule], pin_to_name: &BTreeMap<String, String>) {
        for field in self.fields_mut() {
            field.apply_aliases(pin_to_name);
        }
        self.power_fault_cause = rules
            .iter()
            .find(|rule| rule.matches(self.pdio_in.raw, self.gpio_in.raw))
            .map(|rule| RebootCause {
                kind: CauseKind::Hardware,
                source: self.dpm_name.clone(),
                timestamp: self.timestamp,
                cause: rule.signature.hw_cause.clone(),
                description: rule.signature.hw_desc.clone(),
                chassis_reboot_cause_category: rule.signature.reboot_cause.clone(),
            });
    }

    fn voltage_summary(vh: &PinField, vp: &PinField) -> String {
        let pins: Vec<String> = vh
            .pins
            .iter()
            .chain(&vp.pins)
            .map(ToString::to_string)
            .collect();
        if pins.is_empty() {
            "n/a".to_string()
        } else {
            pins.join(",")
        }
    }

    fn power_fault_summary(&self) -> String {
        let cause = match &self.power_fault_cause {
            Some(c) => format!("{} ({})", c.cause, c.description),
            None => "n/a".to_string(),
        };
        format!(
            "{cause}; under_voltage: {}; over_voltage: {}",
            Self::voltage_summary(&self.vh_under_voltage, &self.vp_under_voltage),
            Self::voltage_summary(&self.vh_over_voltage, &self.vp_over_voltage),
        )
    }

    fn raw_rows(&self) -> String {
        self.raw
            .chunks(8)
            .map(|row| {
                row.iter()
                    .map(|b| format!("{b:02x}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DpmRecord for Adm1266Record {
    fn dpm_name(&self) -> &str {
        &self.dpm_name
    }

    fn powerup_counter(&self) -> u32 {
        u32::from(self.powerup_counter)
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn is_valid(&self) -> bool {
        !self.is_empty()
    }

    fn power_fault_cause(&self) -> Option<&RebootCause> {
        self.power_fault_cause.as_ref()
    }

    fn as_dict(&self) -> RecordDict {
        let entries: [(&str, String); 20] = [
            ("dpm_name", self.dpm_name.clone()),
            ("timestamp", self.timestamp.to_string()),
            ("power_fault_cause", self.power_fault_summary()),
            ("uid", self.uid.to_string()),
            ("byte_2", format!("0x{:02x}", self.byte_2)),
            ("action_index", self.action_index.to_string()),
            ("rule_index", self.rule_index.to_string()),
            (VH_OV_KEY, self.vh_over_voltage.render()),
            (VH_UV_KEY, self.vh_under_voltage.render()),
            ("current_state", self.current_state.to_string()),
            ("last_state", self.last_state.to_string()),
            (VP_OV_KEY, self.vp_over_voltage.render()),
            (VP_UV_KEY, self.vp_under_voltage.render()),
            (GPIO_IN_KEY, self.gpio_in.render()),
            (GPIO_OUT_KEY, self.gpio_out.render()),
            (PDIO_IN_KEY, self.pdio_in.render()),
            (PDIO_OUT_KEY, self.pdio_out.render()),
            ("powerup_counter", self.powerup_counter.to_string()),
            ("crc", format!("0x{:02x}", self.crc)),
            ("raw", self.raw_rows()),
        ];
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
            .collect()
    }
}

/// The few fields worth showing in a one-line summary.
pub fn trim_record_dict(dict: &RecordDict) -> RecordDict {
    const KEEP: [&str; 4] = ["timestamp", "power_fault_cause", GPIO_IN_KEY, PDIO_IN_KEY];
    dict.iter()
        .filter(|(k, _)| KEEP.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// `<dpm>:powerup_<n>:uid_<uid>`, stable across history files.
pub fn record_unique_name(dict: &RecordDict) -> String {
    let field = |key: &str| dict.get(key).and_then(|v| v.as_str()).unwrap_or("?");
    format!(
        "{}:powerup_{}:uid_{}",
        field("dpm_name"),
        field("powerup_counter"),
        field("uid")
    )
}

pub struct Adm1266 {
    sysfs: Sysfs,
    name: String,
    config: DpmConfig,
    rules: Vec<FaultRule>,
}

impl Adm1266 {
    pub fn new(sysfs: Sysfs, name: impl Into<String>, config: DpmConfig) -> DpmResult<Self> {
        let name = name.into();
        if config.nvmem_path.is_empty() {
            return Err(DpmError::invalid_config(&name, "nvmem_path is required"));
        }
        if config.powerup_counter_path.is_empty() {
            return Err(DpmError::invalid_config(&name, "powerup_counter_path is required"));
        }
        let rules = config
            .dpm_signal_to_fault_cause
            .iter()
            .map(|sig| FaultRule::parse(&name, sig))
            .collect::<DpmResult<Vec<_>>>()?;
        Ok(Self {
            sysfs,
            name,
            config,
            rules,
        })
    }

    pub fn config(&self) -> &DpmConfig {
        &self.config
    }

    /// Valid records with pin names and fault causes filled in.
    pub fn read_records(&self) -> DpmResult<Vec<Adm1266Record>> {
        let mut records = Vec::new();
        for raw in self.read_raw_records()? {
            let mut record = Adm1266Record::from_bytes(&raw, &self.name)?;
            if !record.is_valid() {
                continue;
            }
            record.apply_metadata(&self.rules, &self.config.pin_to_name);
            records.push(record);
        }
        Ok(records)
    }

    /// Points the DPM's RTC at `offset` seconds since the Unix epoch
    /// (default [`CUSTOM_EPOCH`]).
    pub fn set_rtc_epoch_offset(&self, offset: Option<i64>) -> DpmResult<()> {
        let path = self
            .config
            .rtc_epoch_offset_path
            .as_deref()
            .ok_or_else(|| DpmError::invalid_config(&self.name, "rtc_epoch_offset_path is not set"))?;
        let offset = offset.unwrap_or(CUSTOM_EPOCH);
        info!(dpm = %self.name, offset, "Setting DPM RTC epoch offset");
        self.sysfs.write_str(path, offset)?;
        Ok(())
    }
}

impl Dpm for Adm1266 {
    fn name(&self) -> &str {
        &self.name
    }

    fn dpm_type(&self) -> DpmType {
        DpmType::Adm1266
    }

    /// Skips erased (all 0xFF) and cleared (all 0x00) slots and a trailing
    /// partial chunk. Slots marked empty are kept; [`Adm1266::read_records`]
    /// drops them.
    fn read_raw_records(&self) -> DpmResult<Vec<Vec<u8>>> {
        let blob = self.sysfs.read_all_bytes(&self.config.nvmem_path)?;
        if blob.len() % RECORD_SIZE != 0 {
            warn!(
                dpm = %self.name,
                len = blob.len(),
                "Blackbox size is not a multiple of the record size"
            );
        }
        let records: Vec<Vec<u8>> = blob
            .chunks_exact(RECORD_SIZE)
            .filter(|chunk| !chunk.iter().all(|b| *b == 0x00) && !chunk.iter().all(|b| *b == 0xff))
            .map(<[u8]>::to_vec)
            .collect();
        debug!(dpm = %self.name, count = records.len(), "Read blackbox records");
        Ok(records)
    }

    fn powerup_counter(&self) -> DpmResult<u32> {
        let value = self.sysfs.read_int(&self.config.powerup_counter_path, 10)?;
        u32::try_from(value).map_err(|_| {
            DpmError::invalid_config(&self.name, format!("powerup counter {value} is negative"))
        })
    }

    fn max_powerup_counter(&self) -> u32 {
        MAX_POWERUP_COUNTER
    }

    fn powerup_entries(&self) -> DpmResult<Vec<DpmPowerUpEntry>> {
        let records = self
            .read_records()?
            .into_iter()
            .map(|r| Arc::new(r) as Arc<dyn DpmRecord>)
            .collect();
        Ok(group_powerups(records))
    }

    fn clear_records(&self) -> DpmResult<()> {
        info!(dpm = %self.name, "Clearing blackbox records");
        self.sysfs.write_str(&self.config.nvmem_path, "1")?;
        Ok(())
    }
}

/// Builds every ADM1266 of a `DPM` section. Entries of other types are
/// skipped.
pub fn dpms_from_section(
    sysfs: &Sysfs,
    section: &serde_json::Map<String, serde_json::Value>,
) -> DpmResult<Vec<Arc<dyn Dpm>>> {
    let mut dpms: Vec<Arc<dyn Dpm>> = Vec::new();
    for (name, config) in dpm_configs(section)? {
        if config.dpm_type != DpmType::Adm1266.as_str() {
            warn!(dpm = %name, dpm_type = %config.dpm_type, "Unsupported DPM type, skipping");
            continue;
        }
        dpms.push(Arc::new(Adm1266::new(sysfs.clone(), name, config)?));
    }
    Ok(dpms)
}
