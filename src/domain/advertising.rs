//! Advertising Data Codec
//!
//! Parses and serializes the packed sequence of length-prefixed AD structures
//! carried in an advertising report or scan response.
//!
//! ```text
//! [len][type][payload: len-1 bytes] [len][type][payload] ...
//! ```
//!
//! Decoding is best effort: a zero length byte or a structure that runs past
//! the end of the buffer stops parsing and keeps whatever was already decoded.

use uuid::Uuid;

/// AD type tags handled by the codec
pub mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const INCOMPLETE_UUID16: u8 = 0x02;
    pub const COMPLETE_UUID16: u8 = 0x03;
    pub const INCOMPLETE_UUID32: u8 = 0x04;
    pub const COMPLETE_UUID32: u8 = 0x05;
    pub const INCOMPLETE_UUID128: u8 = 0x06;
    pub const COMPLETE_UUID128: u8 = 0x07;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const TX_POWER_LEVEL: u8 = 0x0A;
    pub const MANUFACTURER_SPECIFIC_DATA: u8 = 0xFF;
}

/// Bluetooth Base UUID: 00000000-0000-1000-8000-00805F9B34FB
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;

/// Largest payload that fits behind a one-byte length and the type tag
const MAX_PAYLOAD: usize = 254;

/// Expand a 16-bit assigned number into a full UUID
pub fn uuid_from_u16(short: u16) -> Uuid {
    uuid_from_u32(short as u32)
}

/// Expand a 32-bit assigned number into a full UUID
pub fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Shorten a UUID to its assigned number if it sits on the Bluetooth base
fn short_form(uuid: &Uuid) -> Option<u32> {
    let value = uuid.as_u128();
    if value & ((1u128 << 96) - 1) == BLUETOOTH_BASE_UUID {
        Some((value >> 96) as u32)
    } else {
        None
    }
}

/// Structured fields decoded from raw advertising data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisingRecord {
    pub local_name: Option<String>,
    pub flags: Option<u8>,
    pub tx_power_level: Option<i8>,
    /// Order as encountered on the air
    pub service_uuids: Vec<Uuid>,
    /// Company identifier (LE) followed by the vendor payload
    pub manufacturer_data: Option<Vec<u8>>,
    /// The bytes this record was decoded from
    pub raw_data: Vec<u8>,
}

impl AdvertisingRecord {
    /// Decode a raw AD byte sequence. Never fails.
    pub fn decode(raw: &[u8]) -> Self {
        let mut record = Self {
            raw_data: raw.to_vec(),
            ..Default::default()
        };
        let mut name_is_complete = false;

        let mut i = 0;
        while i < raw.len() {
            let len = raw[i] as usize;
            if len == 0 || i + 1 + len > raw.len() {
                break;
            }

            let tag = raw[i + 1];
            let payload = &raw[i + 2..i + 1 + len];

            match tag {
                ad_type::FLAGS => {
                    if let Some(&value) = payload.first() {
                        record.flags = Some(value);
                    }
                }
                // An empty name payload carries nothing and is skipped
                ad_type::COMPLETE_LOCAL_NAME if !payload.is_empty() => {
                    if !name_is_complete {
                        record.local_name = Some(String::from_utf8_lossy(payload).into_owned());
                        name_is_complete = true;
                    }
                }
                ad_type::SHORTENED_LOCAL_NAME if !payload.is_empty() => {
                    if record.local_name.is_none() {
                        record.local_name = Some(String::from_utf8_lossy(payload).into_owned());
                    }
                }
                ad_type::TX_POWER_LEVEL => {
                    if let Some(&value) = payload.first() {
                        record.tx_power_level = Some(value as i8);
                    }
                }
                ad_type::INCOMPLETE_UUID16 | ad_type::COMPLETE_UUID16 => {
                    record.service_uuids.extend(
                        payload
                            .chunks_exact(2)
                            .map(|c| uuid_from_u16(u16::from_le_bytes([c[0], c[1]]))),
                    );
                }
                ad_type::INCOMPLETE_UUID32 | ad_type::COMPLETE_UUID32 => {
                    record.service_uuids.extend(
                        payload
                            .chunks_exact(4)
                            .map(|c| uuid_from_u32(u32::from_le_bytes([c[0], c[1], c[2], c[3]]))),
                    );
                }
                ad_type::INCOMPLETE_UUID128 | ad_type::COMPLETE_UUID128 => {
                    for chunk in payload.chunks_exact(16) {
                        let mut bytes = [0u8; 16];
                        bytes.copy_from_slice(chunk);
                        record
                            .service_uuids
                            .push(Uuid::from_u128(u128::from_le_bytes(bytes)));
                    }
                }
                ad_type::MANUFACTURER_SPECIFIC_DATA => {
                    if record.manufacturer_data.is_none() {
                        record.manufacturer_data = Some(payload.to_vec());
                    }
                }
                // Unknown tags only survive in raw_data
                _ => {}
            }

            i += 1 + len;
        }

        record
    }

    /// Serialize the recognized fields back into AD structures.
    ///
    /// `raw_data` is not consulted. Names and manufacturer data longer than a
    /// single structure can carry are truncated.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();

        if let Some(flags) = self.flags {
            push_structure(&mut out, ad_type::FLAGS, &[flags]);
        }

        // Consecutive UUIDs of one width share a list so the order survives
        let mut run: Option<(u8, usize)> = None;
        let mut run_bytes = Vec::new();
        for uuid in &self.service_uuids {
            let (tag, width, bytes) = match short_form(uuid) {
                Some(short) if short <= u16::MAX as u32 => {
                    (ad_type::COMPLETE_UUID16, 2, (short as u16).to_le_bytes().to_vec())
                }
                Some(short) => (ad_type::COMPLETE_UUID32, 4, short.to_le_bytes().to_vec()),
                None => (ad_type::COMPLETE_UUID128, 16, uuid.as_u128().to_le_bytes().to_vec()),
            };
            if let Some((run_tag, run_width)) = run {
                if run_tag != tag {
                    push_list(&mut out, run_tag, &run_bytes, run_width);
                    run_bytes.clear();
                }
            }
            run = Some((tag, width));
            run_bytes.extend_from_slice(&bytes);
        }
        if let Some((run_tag, run_width)) = run {
            push_list(&mut out, run_tag, &run_bytes, run_width);
        }

        if let Some(name) = &self.local_name {
            let mut end = name.len().min(MAX_PAYLOAD);
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            push_structure(&mut out, ad_type::COMPLETE_LOCAL_NAME, &name.as_bytes()[..end]);
        }

        if let Some(power) = self.tx_power_level {
            push_structure(&mut out, ad_type::TX_POWER_LEVEL, &[power as u8]);
        }

        if let Some(data) = &self.manufacturer_data {
            let end = data.len().min(MAX_PAYLOAD);
            push_structure(&mut out, ad_type::MANUFACTURER_SPECIFIC_DATA, &data[..end]);
        }

        out
    }

    /// Bluetooth SIG company identifier from the manufacturer data, if present
    pub fn manufacturer_company_id(&self) -> Option<u16> {
        match self.manufacturer_data.as_deref() {
            Some([lo, hi, ..]) => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}

fn push_structure(out: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    out.push((payload.len() + 1) as u8);
    out.push(tag);
    out.extend_from_slice(payload);
}

/// Emit a UUID list, split over several structures when it does not fit in one
fn push_list(out: &mut Vec<u8>, tag: u8, bytes: &[u8], width: usize) {
    let per_structure = MAX_PAYLOAD / width * width;
    for chunk in bytes.chunks(per_structure) {
        push_structure(out, tag, chunk);
    }
}
