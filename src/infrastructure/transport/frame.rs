//! SoftDevice event frames and scan commands
//!
//! The transport hands over already-framed events. Every frame starts with a
//! header, followed by an event-specific body:
//!
//! ```text
//! [0-1]   : evt_id  (u16 little-endian)
//! [2-3]   : evt_len (u16 little-endian, body length)
//! [4..]   : body
//! ```
//!
//! # Advertising report body (`BLE_GAP_EVT_ADV_REPORT`)
//!
//! ```text
//! API v5                          API v6
//! [0]    : addr_type              [0]    : addr_type
//! [1-6]  : addr (LSB first)       [1-6]  : addr (LSB first)
//! [7]    : rssi (i8)              [7]    : rssi (i8)
//! [8]    : scan_rsp               [8-9]  : type bitfield (u16)
//! [9]    : type                            bit 0: connectable
//! [10-11]: data_len (u16)                  bit 1: scannable
//! [12..] : data                            bit 2: directed
//!                                          bit 3: scan_response
//!                                 [10-11]: data_len (u16)
//!                                 [12..] : data
//! ```

use crate::domain::advertising::AdvertisingRecord;
use crate::domain::models::{AddressType, AdvertisingEvent, AdvertisingType, DeviceAddress};
use crate::domain::transport::{ScanCommand, SoftDeviceApi};
use std::time::Instant;
use tracing::trace;

pub const BLE_GAP_EVT_ADV_REPORT: u16 = 0x10;

/// Command opcodes written to the radio
pub mod opcode {
    pub const SCAN_START: u8 = 0x01;
    pub const SCAN_STOP: u8 = 0x02;
}

const HEADER_LEN: usize = 4;

/// V5 legacy PDU types
const V5_ADV_IND: u8 = 0x00;
const V5_ADV_DIRECT_IND: u8 = 0x01;
const V5_ADV_SCAN_IND: u8 = 0x02;
const V5_ADV_NONCONN_IND: u8 = 0x03;

/// V6 report type bits
const V6_CONNECTABLE: u16 = 1 << 0;
const V6_SCANNABLE: u16 = 1 << 1;
const V6_SCAN_RESPONSE: u16 = 1 << 3;

/// V6 scan parameter flag bits
const V6_SCAN_ACTIVE: u8 = 1 << 2;
const V6_PHY_1MBPS: u8 = 0x01;

/// Advertising report as carried on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct AdvReport {
    pub address: DeviceAddress,
    pub rssi: i8,
    pub advertising_type: AdvertisingType,
    pub data: Vec<u8>,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }
}

/// Decode one event frame into an advertising event.
///
/// Frames for other events and truncated frames yield `None`.
pub fn decode_event(api: SoftDeviceApi, frame: &[u8]) -> Option<AdvertisingEvent> {
    let report = decode_adv_report(api, frame)?;
    Some(AdvertisingEvent {
        address: report.address,
        rssi: report.rssi,
        advertising_type: report.advertising_type,
        data: AdvertisingRecord::decode(&report.data),
        timestamp: Instant::now(),
    })
}

pub fn decode_adv_report(api: SoftDeviceApi, frame: &[u8]) -> Option<AdvReport> {
    let mut header = Reader::new(frame);
    let evt_id = header.u16()?;
    let evt_len = header.u16()? as usize;
    if evt_id != BLE_GAP_EVT_ADV_REPORT {
        trace!("Skipping event {:#04X}", evt_id);
        return None;
    }

    let mut body = Reader::new(header.take(evt_len)?);
    let addr_type = body.u8()?;
    let mut addr = [0u8; 6];
    addr.copy_from_slice(body.take(6)?);
    let rssi = body.u8()? as i8;

    let advertising_type = match api {
        SoftDeviceApi::V5 => {
            let scan_rsp = body.u8()?;
            let pdu = body.u8()?;
            v5_type(scan_rsp, pdu)
        }
        SoftDeviceApi::V6 => v6_type(body.u16()?),
    };

    let data_len = body.u16()? as usize;
    let data = body.take(data_len)?.to_vec();

    Some(AdvReport {
        address: DeviceAddress::new(addr, AddressType::from_raw(addr_type)),
        rssi,
        advertising_type,
        data,
    })
}

fn v5_type(scan_rsp: u8, pdu: u8) -> AdvertisingType {
    if scan_rsp != 0 {
        return AdvertisingType::ScanResponse;
    }
    match pdu {
        V5_ADV_IND | V5_ADV_DIRECT_IND => AdvertisingType::Connectable,
        V5_ADV_SCAN_IND => AdvertisingType::Scannable,
        _ => AdvertisingType::NonConnectable,
    }
}

fn v6_type(bits: u16) -> AdvertisingType {
    if bits & V6_SCAN_RESPONSE != 0 {
        AdvertisingType::ScanResponse
    } else if bits & V6_CONNECTABLE != 0 {
        AdvertisingType::Connectable
    } else if bits & V6_SCANNABLE != 0 {
        AdvertisingType::Scannable
    } else {
        AdvertisingType::NonConnectable
    }
}

/// Build an advertising report frame
pub fn encode_adv_report(api: SoftDeviceApi, report: &AdvReport) -> Vec<u8> {
    let mut body = Vec::with_capacity(12 + report.data.len());
    body.push(match report.address.kind() {
        AddressType::Public => 0x00,
        AddressType::Random => 0x01,
    });
    body.extend_from_slice(&report.address.bytes());
    body.push(report.rssi as u8);

    match api {
        SoftDeviceApi::V5 => {
            let (scan_rsp, pdu) = match report.advertising_type {
                AdvertisingType::Connectable => (0, V5_ADV_IND),
                AdvertisingType::Scannable => (0, V5_ADV_SCAN_IND),
                AdvertisingType::NonConnectable => (0, V5_ADV_NONCONN_IND),
                AdvertisingType::ScanResponse => (1, V5_ADV_IND),
            };
            body.push(scan_rsp);
            body.push(pdu);
        }
        SoftDeviceApi::V6 => {
            let bits = match report.advertising_type {
                AdvertisingType::Connectable => V6_CONNECTABLE | V6_SCANNABLE,
                AdvertisingType::Scannable => V6_SCANNABLE,
                AdvertisingType::NonConnectable => 0,
                AdvertisingType::ScanResponse => V6_SCANNABLE | V6_SCAN_RESPONSE,
            };
            body.extend_from_slice(&bits.to_le_bytes());
        }
    }

    let data = &report.data[..report.data.len().min(u16::MAX as usize - 12)];
    body.extend_from_slice(&(data.len() as u16).to_le_bytes());
    body.extend_from_slice(data);

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&BLE_GAP_EVT_ADV_REPORT.to_le_bytes());
    frame.extend_from_slice(&(body.len() as u16).to_le_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Serialize a scan command for the given API generation
///
/// # Scan parameter block
///
/// ```text
/// API v5                          API v6
/// [0]   : active                  [0]    : flags (bit 2 active)
/// [1]   : use_whitelist           [1]    : scan_phys
/// [2-3] : interval (0.625 ms)     [2-3]  : interval (0.625 ms)
/// [4-5] : window (0.625 ms)       [4-5]  : window (0.625 ms)
/// [6-7] : timeout (s)             [6-7]  : timeout (10 ms)
///                                 [8-12] : channel_mask
/// ```
pub fn encode_command(api: SoftDeviceApi, command: &ScanCommand) -> Vec<u8> {
    match command {
        ScanCommand::StopScan => vec![opcode::SCAN_STOP],
        ScanCommand::StartScan(params) => {
            let mut out = vec![opcode::SCAN_START];
            match api {
                SoftDeviceApi::V5 => {
                    out.push(params.active_scan as u8);
                    out.push(0);
                    out.extend_from_slice(&params.interval_units().to_le_bytes());
                    out.extend_from_slice(&params.window_units().to_le_bytes());
                    let timeout = params.duration_s as u16;
                    out.extend_from_slice(&timeout.to_le_bytes());
                }
                SoftDeviceApi::V6 => {
                    out.push(if params.active_scan { V6_SCAN_ACTIVE } else { 0 });
                    out.push(V6_PHY_1MBPS);
                    out.extend_from_slice(&params.interval_units().to_le_bytes());
                    out.extend_from_slice(&params.window_units().to_le_bytes());
                    let timeout = (params.duration_s * 100.0) as u16;
                    out.extend_from_slice(&timeout.to_le_bytes());
                    out.extend_from_slice(&[0u8; 5]);
                }
            }
            out
        }
    }
}
