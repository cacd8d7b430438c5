//! Minimal SFF-8024 / SFF-8636 helpers.

/// SFF-8636 power control byte (lower page 0).
pub const SFF8636_POWER_CONTROL_OFFSET: u64 = 93;

/// Power override bit in the power control byte.
pub const POWER_OVERRIDE: u8 = 0x01;

/// Power set (low power mode) bit in the power control byte.
pub const POWER_SET: u8 = 0x02;

/// Module type name for an SFF-8024 identifier byte.
pub fn identifier_name(id: u8) -> &'static str {
    match id {
        0x01 => "GBIC",
        0x02 => "Module soldered to motherboard",
        0x03 => "SFP/SFP+/SFP28",
        0x0c => "QSFP",
        0x0d => "QSFP+ or later",
        0x11 => "QSFP28 or later",
        0x18 => "QSFP-DD Double Density 8X Pluggable Transceiver",
        0x19 => "OSFP 8X Pluggable Transceiver",
        0x1a => "SFP-DD Double Density 2X Pluggable Transceiver",
        0x1e => "QSFP+ or later with CMIS",
        _ => "Unknown or unspecified",
    }
}

/// True for the QSFP family managed through the SFF-8636 memory map.
pub fn is_sff8636(id: u8) -> bool {
    matches!(id, 0x0c | 0x0d | 0x11)
}

/// Power control byte value for the requested low-power state.
pub fn power_control_byte(lpmode: bool) -> u8 {
    if lpmode {
        POWER_OVERRIDE | POWER_SET
    } else {
        POWER_OVERRIDE
    }
}

/// Where a module keeps its temperature monitor in a flat optoe EEPROM
/// image, upper page `n` sitting at `128 * (n + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureMap {
    /// Offset of the 2-byte reading.
    pub reading: u64,
    /// Offset of the 8 threshold bytes.
    pub thresholds: u64,
}

/// Temperature monitor layout for an identifier, if the type has one.
pub fn temperature_map(id: u8) -> Option<TemperatureMap> {
    match id {
        // SFF-8472: A2h follows A0h
        0x03 => Some(TemperatureMap {
            reading: 256 + 96,
            thresholds: 256,
        }),
        // SFF-8636: thresholds on page 03h
        0x0c | 0x0d | 0x11 => Some(TemperatureMap {
            reading: 22,
            thresholds: 512,
        }),
        // CMIS: thresholds on page 02h
        0x18 | 0x19 | 0x1e => Some(TemperatureMap {
            reading: 14,
            thresholds: 384,
        }),
        _ => None,
    }
}

/// Signed big-endian temperature in 1/256 degree units.
pub fn decode_temperature(raw: [u8; 2]) -> f64 {
    f64::from(i16::from_be_bytes(raw)) / 256.0
}

/// Temperature alarm and warning thresholds of a module, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransceiverThresholds {
    pub high_alarm: f64,
    pub low_alarm: f64,
    pub high_warning: f64,
    pub low_warning: f64,
}

impl TransceiverThresholds {
    /// Decodes high alarm, low alarm, high warning and low warning, the
    /// order every map above stores them in.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        let word = |i: usize| -> Option<f64> {
            let bytes = raw.get(i..i + 2)?;
            Some(decode_temperature([bytes[0], bytes[1]]))
        };
        Some(Self {
            high_alarm: word(0)?,
            low_alarm: word(2)?,
            high_warning: word(4)?,
            low_warning: word(6)?,
        })
    }
}
