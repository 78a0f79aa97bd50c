//! Advertising-data (AD structure) parsing.
//!
//! Each AD structure is `[len][type][len - 1 bytes of data]`; a zero length
//! or a structure running past the end of the buffer terminates parsing.

use heapless::{String, Vec};

use super::metadata::parse_utf8;
use super::MAX_ADVERTISED_SERVICES;

const AD_INCOMPLETE_16BIT_UUIDS: u8 = 0x02;
const AD_COMPLETE_16BIT_UUIDS: u8 = 0x03;
const AD_SHORTENED_LOCAL_NAME: u8 = 0x08;
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;

/// Iterate over `(ad_type, payload)` pairs of well-formed AD structures.
fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    core::iter::from_fn(move || {
        if i >= data.len() {
            return None;
        }
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let item = (data[i + 1], &data[i + 2..i + 1 + len]);
        i += len + 1;
        Some(item)
    })
}

/// Collect all advertised 16-bit service UUIDs (complete and incomplete
/// lists).  Extra UUIDs beyond capacity are dropped.
pub fn advertised_services(data: &[u8]) -> Vec<u16, MAX_ADVERTISED_SERVICES> {
    let mut services = Vec::new();
    for (ad_type, payload) in ad_structures(data) {
        if ad_type == AD_INCOMPLETE_16BIT_UUIDS || ad_type == AD_COMPLETE_16BIT_UUIDS {
            for chunk in payload.chunks_exact(2) {
                let service = u16::from_le_bytes([chunk[0], chunk[1]]);
                if !services.contains(&service) && services.push(service).is_err() {
                    return services;
                }
            }
        }
    }
    services
}

/// Extract the complete or shortened local name, truncated to 32 bytes at
/// a character boundary.  Names that are not valid UTF-8 are dropped.
pub fn extract_device_name(data: &[u8]) -> Option<String<32>> {
    let (_, name_bytes) = ad_structures(data).find(|(ad_type, _)| {
        *ad_type == AD_SHORTENED_LOCAL_NAME || *ad_type == AD_COMPLETE_LOCAL_NAME
    })?;
    parse_utf8(name_bytes)
}
