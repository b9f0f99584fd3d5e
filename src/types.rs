use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::envelope::{Command, Equipment};

/// Typed value of a protocol characteristic
///
/// The variants mirror the converter set of the catalog: every
/// characteristic encodes to and decodes from exactly one of these. See
/// [`crate::convert::Converter`] for the wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// One-byte unsigned integer
    UInt8(u8),
    /// Two-byte unsigned integer, little-endian
    UInt16(u16),
    /// Four-byte unsigned integer, little-endian
    UInt32(u32),
    /// Fractional value carried as hundredths in a 16-bit integer
    Double(f64),
    /// Calorie total carried in the firmware's 1024/100000000 scale
    Calories(f64),
    /// One-byte boolean
    Boolean(bool),
    /// Four-byte pulse composite
    Pulse(PulseValue),
}

impl Value {
    /// Numeric view of the value, if it has one
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::UInt8(v) => Some(f64::from(v)),
            Self::UInt16(v) => Some(f64::from(v)),
            Self::UInt32(v) => Some(f64::from(v)),
            Self::Double(v) | Self::Calories(v) => Some(v),
            Self::Boolean(_) | Self::Pulse(_) => None,
        }
    }

    /// Integer view of the value, if it is one of the integer variants
    #[must_use]
    pub const fn as_u32(&self) -> Option<u32> {
        match *self {
            Self::UInt8(v) => Some(v as u32),
            Self::UInt16(v) => Some(v as u32),
            Self::UInt32(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean view of the value
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Boolean(v) => Some(v),
            _ => None,
        }
    }

    /// Pulse view of the value
    #[must_use]
    pub const fn as_pulse(&self) -> Option<PulseValue> {
        match *self {
            Self::Pulse(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret the value as an equipment [`Mode`]
    ///
    /// Characteristic 12 carries the mode as a one-byte integer.
    #[must_use]
    pub const fn as_mode(&self) -> Option<Mode> {
        match *self {
            Self::UInt8(v) => Some(Mode::from_raw(v)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UInt8(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v:.2}"),
            Self::Calories(v) => write!(f, "{v:.2}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Pulse(v) => write!(f, "{v}"),
        }
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::UInt8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Self::UInt16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::UInt32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<PulseValue> for Value {
    fn from(v: PulseValue) -> Self {
        Self::Pulse(v)
    }
}

impl From<Mode> for Value {
    fn from(v: Mode) -> Self {
        Self::UInt8(v.raw())
    }
}

/// Equipment operating mode reported by characteristic 12
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Mode not reported or not recognized
    Unknown,
    /// Powered on, belt stopped
    Idle,
    /// Workout in progress
    Active,
    /// Workout paused
    Pause,
    /// Post-workout summary screen
    Summary,
    /// Settings menu open on the console
    Settings,
    /// The magnetic safety key is not inserted
    MissingSafetyKey,
}

impl Mode {
    /// Decode a mode byte; unmapped values collapse to [`Mode::Unknown`]
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Idle,
            2 => Self::Active,
            3 => Self::Pause,
            4 => Self::Summary,
            7 => Self::Settings,
            8 => Self::MissingSafetyKey,
            _ => Self::Unknown,
        }
    }

    /// Wire value of this mode
    #[must_use]
    pub const fn raw(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Idle => 1,
            Self::Active => 2,
            Self::Pause => 3,
            Self::Summary => 4,
            Self::Settings => 7,
            Self::MissingSafetyKey => 8,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Idle => write!(f, "Idle"),
            Self::Active => write!(f, "Active"),
            Self::Pause => write!(f, "Pause"),
            Self::Summary => write!(f, "Summary"),
            Self::Settings => write!(f, "Settings"),
            Self::MissingSafetyKey => write!(f, "Missing Safety Key"),
        }
    }
}

/// Origin of a pulse reading, the fourth byte of the pulse composite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PulseSource {
    /// No pulse source active
    None,
    /// Hand-grip contact sensors
    HandGrip,
    /// Observed on some consoles, meaning unmapped
    Unknown2,
    /// Observed on some consoles, meaning unmapped
    Unknown3,
    /// A paired BLE heart-rate monitor
    BleHrm,
    /// Source byte outside the mapped range
    Unknown(u8),
}

impl PulseSource {
    /// Decode a source byte, preserving unmapped values
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::HandGrip,
            2 => Self::Unknown2,
            3 => Self::Unknown3,
            4 => Self::BleHrm,
            other => Self::Unknown(other),
        }
    }

    /// Wire value of this source
    #[must_use]
    pub const fn raw(self) -> u8 {
        match self {
            Self::None => 0,
            Self::HandGrip => 1,
            Self::Unknown2 => 2,
            Self::Unknown3 => 3,
            Self::BleHrm => 4,
            Self::Unknown(other) => other,
        }
    }
}

impl fmt::Display for PulseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::HandGrip => write!(f, "hand grip"),
            Self::Unknown2 => write!(f, "unknown(2)"),
            Self::Unknown3 => write!(f, "unknown(3)"),
            Self::BleHrm => write!(f, "BLE HRM"),
            Self::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

/// Decoded pulse composite from characteristic 10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseValue {
    /// Most recent pulse in beats per minute
    pub current_bpm: u8,
    /// Session average in beats per minute
    pub average_bpm: u8,
    /// Number of samples behind the average
    pub sample_count: u8,
    /// Where the reading came from
    pub source: PulseSource,
}

impl fmt::Display for PulseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bpm (avg {}, {} samples, {})",
            self.current_bpm, self.average_bpm, self.sample_count, self.source
        )
    }
}

/// Equipment metadata gathered during session initialization
///
/// Populated by [`crate::session::Session::initialize`]: the supported
/// characteristic set from `EQUIPMENT_INFORMATION`, capability and command
/// lists, and the metadata strings the equipment reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentInformation {
    /// Equipment class echoed in the information response header
    pub equipment: Equipment,
    /// Characteristic IDs the equipment claims to support
    pub characteristics: BTreeSet<u8>,
    /// Capability IDs from `SUPPORTED_CAPABILITIES`
    pub supported_capabilities: Vec<u8>,
    /// Commands the equipment accepts, from `SUPPORTED_COMMANDS`
    pub supported_commands: BTreeSet<Command>,
    /// Values cached at initialization (speed/incline limits, units)
    pub values: BTreeMap<u8, Value>,
    /// Serial number string, if the equipment reports one
    pub serial_number: Option<String>,
    /// Firmware version string, if the equipment reports one
    pub firmware_version: Option<String>,
    /// Numeric model reference, if the equipment reports one
    pub reference_number: Option<u32>,
}

impl EquipmentInformation {
    /// Create metadata for equipment supporting the given characteristics
    #[must_use]
    pub fn new(equipment: Equipment, characteristics: BTreeSet<u8>) -> Self {
        Self {
            equipment,
            characteristics,
            supported_capabilities: Vec::new(),
            supported_commands: BTreeSet::new(),
            values: BTreeMap::new(),
            serial_number: None,
            firmware_version: None,
            reference_number: None,
        }
    }

    /// Cached value for a characteristic, looked up by catalog name
    #[must_use]
    pub fn value_by_name(&self, name: &str) -> Option<&Value> {
        crate::catalog::by_name(name).and_then(|c| self.values.get(&c.id))
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No transport, or the transport was lost
    Disconnected,
    /// Transport connection and service discovery in progress
    Connecting,
    /// Connected and subscribed; read-only operations permitted
    Connected,
    /// Activation code accepted; writes permitted
    Authenticated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Authenticated => write!(f, "Authenticated"),
        }
    }
}

/// Session tuning knobs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum wait for a response after the request's last chunk, refreshed
    /// whenever a response chunk is observed
    pub response_timeout: Duration,
    /// Maximum wait for transport connection plus service discovery
    pub connect_timeout: Duration,
    /// Pacing between successive polls in monitor mode
    pub monitor_interval: Duration,
    /// Gap between successive outbound chunk writes
    ///
    /// Legacy consoles drop chunks written back to back; 200 ms matches the
    /// pacing of the official app.
    pub write_gap: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(20),
            monitor_interval: Duration::from_secs(1),
            write_gap: Duration::from_millis(200),
        }
    }
}
