//! HDLC-style framing of trace records.
//!
//! ```text
//! | seq | type | [timestamp: u32 µs] | payload ... | checksum | 0x7E |
//! ```
//!
//! Every byte but the trailing flag is escaped when it collides with the flag
//! or escape byte. The checksum is the complement of the wrapping sum of the
//! unescaped bytes preceding it.

use std::time::Duration;

use crate::{SpyRecord, TraceError};

pub const FLAG: u8 = 0x7E;
pub const ESC: u8 = 0x7D;
pub const ESC_XOR: u8 = 0x20;

/// A frame read back from a byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub seq: u8,
    pub record_type: u8,
    pub timestamp_us: Option<u32>,
    pub payload: Vec<u8>,
}

/// Encodes a record into a framed byte sequence.
pub fn encode_frame(record: &SpyRecord) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(record.payload.len() + 8);
    let mut checksum: u8 = 0;

    let push_escaped = |dest: &mut Vec<u8>, sum: &mut u8, byte: u8| {
        *sum = sum.wrapping_add(byte);
        push_literal(dest, byte);
    };

    push_escaped(&mut bytes, &mut checksum, record.seq);
    push_escaped(&mut bytes, &mut checksum, record.record_type);

    if let Some(ts) = record.timestamp {
        for byte in micros(ts).to_le_bytes() {
            push_escaped(&mut bytes, &mut checksum, byte);
        }
    }

    for &byte in &record.payload {
        push_escaped(&mut bytes, &mut checksum, byte);
    }

    push_literal(&mut bytes, !checksum);
    bytes.push(FLAG);
    bytes
}

/// Decodes one frame (with or without its trailing flag).
///
/// `with_timestamp` tells whether the producer stamped the record; the frame
/// layout itself does not carry that information.
pub fn decode_frame(frame: &[u8], with_timestamp: bool) -> Result<DecodedFrame, TraceError> {
    let body = frame.strip_suffix(&[FLAG]).unwrap_or(frame);

    let mut raw = Vec::with_capacity(body.len());
    let mut iter = body.iter();
    while let Some(&byte) = iter.next() {
        if byte == ESC {
            let next = iter
                .next()
                .ok_or(TraceError::Frame("dangling escape byte"))?;
            raw.push(next ^ ESC_XOR);
        } else if byte == FLAG {
            return Err(TraceError::Frame("unexpected flag inside frame"));
        } else {
            raw.push(byte);
        }
    }

    let header_len = if with_timestamp { 6 } else { 2 };
    if raw.len() < header_len + 1 {
        return Err(TraceError::Frame("frame too short"));
    }

    let (content, checksum) = raw.split_at(raw.len() - 1);
    let sum = content.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if !sum != checksum[0] {
        return Err(TraceError::Frame("checksum mismatch"));
    }

    let timestamp_us = with_timestamp
        .then(|| u32::from_le_bytes([content[2], content[3], content[4], content[5]]));

    Ok(DecodedFrame {
        seq: content[0],
        record_type: content[1],
        timestamp_us,
        payload: content[header_len..].to_vec(),
    })
}

/// Splits a byte stream into frames on the flag byte.
pub fn split_frames(stream: &[u8]) -> impl Iterator<Item = &[u8]> {
    stream.split(|&b| b == FLAG).filter(|frame| !frame.is_empty())
}

fn push_literal(dest: &mut Vec<u8>, byte: u8) {
    if byte == FLAG || byte == ESC {
        dest.push(ESC);
        dest.push(byte ^ ESC_XOR);
    } else {
        dest.push(byte);
    }
}

fn micros(ts: Duration) -> u32 {
    ts.as_micros().min(u32::MAX as u128) as u32
}
