//! UTF-16 string payloads.

use crate::abi::{STRING_CHUNKSIZE, STRING_SMALLSIZE};

/// Code units of a string payload (`len = size >> 1`).
pub fn payload_units(payload: &[u8]) -> Vec<u16> {
    payload
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Decode a string payload.
///
/// Short strings map code units directly. Longer ones go through the strict
/// decoder first; if it rejects the input (unpaired surrogates) the payload is
/// decoded leniently in fixed-size chunks instead. Malformed input never fails,
/// unpaired surrogates come back as U+FFFD.
pub fn decode(payload: &[u8]) -> String {
    let units = payload_units(payload);
    if units.len() <= STRING_SMALLSIZE {
        return String::from_utf16_lossy(&units);
    }
    match String::from_utf16(&units) {
        Ok(s) => s,
        Err(_) => {
            log::warn!(
                "string of {} code units is not well-formed UTF-16, decoding leniently",
                units.len()
            );
            decode_chunked(&units)
        }
    }
}

fn decode_chunked(units: &[u16]) -> String {
    let mut out = String::with_capacity(units.len());
    let mut off = 0;
    while units.len() - off > STRING_CHUNKSIZE {
        let mut end = off + STRING_CHUNKSIZE;
        // Keep surrogate pairs in one chunk.
        if is_high_surrogate(units[end - 1]) {
            end += 1;
        }
        out.push_str(&String::from_utf16_lossy(&units[off..end]));
        off = end;
    }
    out.push_str(&String::from_utf16_lossy(&units[off..]));
    out
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..0xDC00).contains(&unit)
}

/// Encode code units as a little-endian payload.
pub fn encode_units(units: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(units.len() * 2);
    for unit in units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}
