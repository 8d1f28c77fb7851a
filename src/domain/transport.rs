//! Transport Adapter boundary
//!
//! The radio link (serial port, RPC framing, SoftDevice) lives behind
//! [`TransportAdapter`]. Commands go out through the trait; everything the
//! adapter produces comes back as a [`TransportEvent`] on a channel handed to
//! the adapter when it is built.

use crate::domain::error::TransportError;
use crate::domain::models::{AdvertisingEvent, ScanParams};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SoftDevice API generation spoken by the connectivity firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SoftDeviceApi {
    V5,
    #[default]
    V6,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanCommand {
    StartScan(ScanParams),
    StopScan,
}

impl ScanCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::StartScan(_) => CommandKind::StartScan,
            Self::StopScan => CommandKind::StopScan,
        }
    }
}

/// Which command an acknowledgment refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    StartScan,
    StopScan,
}

/// Everything an adapter can report
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Advertising(AdvertisingEvent),
    Acknowledge(CommandKind),
    Disconnected,
}

/// SoftDevice firmware identification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Bluetooth SIG company identifier (0x0059 for Nordic)
    pub company_id: u16,
    /// Link layer version number
    pub version_number: u8,
    pub subversion_number: u16,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "company {:#06X}, version {}, subversion {}",
            self.company_id, self.version_number, self.subversion_number
        )
    }
}

/// Outbound half of the radio link
pub trait TransportAdapter: Send + Sync {
    /// Queue a command for the radio. Must not block on I/O.
    fn send_command(&self, command: &ScanCommand) -> Result<(), TransportError>;

    /// Firmware version of the radio, if the adapter can tell
    fn firmware_version(&self) -> Option<FirmwareVersion> {
        None
    }
}
