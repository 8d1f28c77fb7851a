use crate::domain::advertising::AdvertisingRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Whether a peer address is a public (IEEE-assigned) or random address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressType {
    Public,
    Random,
}

impl AddressType {
    /// Map the raw `addr_type` byte of a GAP address
    pub fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            Self::Public
        } else {
            Self::Random
        }
    }
}

/// 6-byte BLE hardware address, stored in wire (little-endian) order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress {
    bytes: [u8; 6],
    kind: AddressType,
}

impl DeviceAddress {
    pub fn new(bytes: [u8; 6], kind: AddressType) -> Self {
        Self { bytes, kind }
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.bytes
    }

    pub fn kind(&self) -> AddressType {
        self.kind
    }
}

impl fmt::Display for DeviceAddress {
    /// Most-significant byte first, the way addresses are usually printed
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid device address: {0}")]
pub struct AddressParseError(String);

impl FromStr for DeviceAddress {
    type Err = AddressParseError;

    /// Parses `AA:BB:CC:DD:EE:FF`; the resulting address is typed as public
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(AddressParseError(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(AddressParseError(s.to_string()));
            }
            bytes[5 - i] =
                u8::from_str_radix(part, 16).map_err(|_| AddressParseError(s.to_string()))?;
        }

        Ok(Self::new(bytes, AddressType::Public))
    }
}

/// PDU kind of an observed advertising packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingType {
    Connectable,
    Scannable,
    NonConnectable,
    ScanResponse,
}

/// One observed advertising packet
#[derive(Debug, Clone)]
pub struct AdvertisingEvent {
    pub address: DeviceAddress,
    pub rssi: i8,
    pub advertising_type: AdvertisingType,
    pub data: AdvertisingRecord,
    pub timestamp: Instant,
}

/// Registry entry for a peer seen during the current scan session
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub address: DeviceAddress,
    pub address_type: AddressType,
    pub last_rssi: i8,
    pub best_rssi: i8,
    pub name: Option<String>,
    pub first_seen: Instant,
    pub last_seen: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Starting,
    Scanning,
    Stopping,
    Stopped,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Scanning => "scanning",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Scan parameters, in milliseconds and seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanParams {
    #[serde(default = "default_true")]
    pub active_scan: bool,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: f64,
    #[serde(default = "default_window_ms")]
    pub window_ms: f64,
    /// 0 = run until explicitly stopped
    #[serde(default = "default_duration_s")]
    pub duration_s: f64,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            active_scan: default_true(),
            interval_ms: default_interval_ms(),
            window_ms: default_window_ms(),
            duration_s: default_duration_s(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_interval_ms() -> f64 {
    100.0
}
fn default_window_ms() -> f64 {
    50.0
}
fn default_duration_s() -> f64 {
    20.0
}

/// Radio timing unit for scan interval and window
const SCAN_UNIT_US: f64 = 625.0;

impl ScanParams {
    /// Check the parameter constraints before any transport call
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("interval", self.interval_ms),
            ("window", self.window_ms),
            ("duration", self.duration_s),
        ] {
            if value.is_infinite() {
                return Err(format!("{} must be finite", field));
            }
        }
        if !(self.interval_ms > 0.0) {
            return Err(format!("interval must be positive, got {} ms", self.interval_ms));
        }
        if !(self.window_ms > 0.0) {
            return Err(format!("window must be positive, got {} ms", self.window_ms));
        }
        if self.window_ms > self.interval_ms {
            return Err(format!(
                "window {} ms exceeds interval {} ms",
                self.window_ms, self.interval_ms
            ));
        }
        if !(self.duration_s >= 0.0) {
            return Err(format!("duration must be non-negative, got {} s", self.duration_s));
        }
        Ok(())
    }

    /// Interval in 0.625 ms radio units
    pub fn interval_units(&self) -> u16 {
        ms_to_units(self.interval_ms)
    }

    /// Window in 0.625 ms radio units
    pub fn window_units(&self) -> u16 {
        ms_to_units(self.window_ms)
    }
}

fn ms_to_units(ms: f64) -> u16 {
    // `as` saturates for floats
    (ms * 1000.0 / SCAN_UNIT_US) as u16
}
