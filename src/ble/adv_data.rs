//! Advertising and scan-response payloads for the NUS peripheral.
//!
//! The advertisement carries the flags and the 128-bit NUS service UUID so
//! centrals can filter on it; the name goes in the scan response because
//! both do not fit in 31 bytes.

use heapless::Vec;

/// Largest legacy advertising payload.
pub const ADV_MAX: usize = 31;

pub const AD_FLAGS: u8 = 0x01;
pub const AD_COMPLETE_UUID128: u8 = 0x07;
pub const AD_SHORT_NAME: u8 = 0x08;
pub const AD_COMPLETE_NAME: u8 = 0x09;

/// LE General Discoverable, BR/EDR not supported.
pub const FLAGS_GENERAL_DISCOVERABLE: u8 = 0x06;

pub type AdvPayload = Vec<u8, ADV_MAX>;

/// Flags + complete list of 128-bit service UUIDs (one entry).
pub fn advertisement(service_uuid: u128) -> AdvPayload {
    let mut out = AdvPayload::new();
    // 3 + 18 bytes, always fits.
    let _ = out.extend_from_slice(&[2, AD_FLAGS, FLAGS_GENERAL_DISCOVERABLE]);
    let _ = out.extend_from_slice(&[17, AD_COMPLETE_UUID128]);
    let _ = out.extend_from_slice(&service_uuid.to_le_bytes());
    out
}

/// Scan response carrying the local name. Names longer than the payload
/// allows are cut and advertised as a shortened name.
pub fn scan_response(name: &str) -> AdvPayload {
    let mut out = AdvPayload::new();
    let room = ADV_MAX - 2;
    let bytes = name.as_bytes();
    let (ad_type, bytes) = if bytes.len() > room {
        (AD_SHORT_NAME, &bytes[..room])
    } else {
        (AD_COMPLETE_NAME, bytes)
    };
    let _ = out.push(bytes.len() as u8 + 1);
    let _ = out.push(ad_type);
    let _ = out.extend_from_slice(bytes);
    out
}
