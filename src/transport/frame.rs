//! Length-prefixed JSON framing for the oxd socket protocol
//!
//! Every message on the wire, in either direction, is a frame:
//!
//! ```text
//! 0030{"command":"ping","params":{}}
//! ^^^^
//! payload length in bytes, 4 ASCII decimal digits, zero padded
//! ```
//!
//! There is no trailing delimiter. Because the prefix is exactly four
//! digits, a payload may be at most [`MAX_PAYLOAD_LEN`] bytes; larger
//! payloads are rejected with [`OxdError::FrameTooLarge`] instead of
//! producing a prefix the peer would misread.

use serde::Serialize;
use serde_json::Value;

use crate::error::{OxdError, Result};

/// Width of the decimal length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest payload the prefix can describe.
pub const MAX_PAYLOAD_LEN: usize = 9999;

/// Serialize `payload` to JSON and prepend the length prefix.
///
/// # Errors
///
/// Returns [`OxdError::Serialization`] if the value cannot be serialized and
/// [`OxdError::FrameTooLarge`] if the JSON is longer than
/// [`MAX_PAYLOAD_LEN`] bytes.
///
/// # Examples
///
/// ```
/// use oxd_messenger::transport::frame::encode;
///
/// let bytes = encode(&serde_json::json!({"id": 5})).unwrap();
/// assert_eq!(bytes, b"0008{\"id\":5}");
/// ```
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(payload).map_err(OxdError::Serialization)?;

    if json.len() > MAX_PAYLOAD_LEN {
        return Err(OxdError::FrameTooLarge {
            size: json.len(),
            max: MAX_PAYLOAD_LEN,
        }
        .into());
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + json.len());
    frame.extend_from_slice(format!("{:04}", json.len()).as_bytes());
    frame.extend_from_slice(&json);
    Ok(frame)
}

/// Parse the 4-byte decimal length prefix.
///
/// Only ASCII digits are accepted; signs and whitespace are rejected.
///
/// # Errors
///
/// Returns [`OxdError::MalformedFrame`] if `prefix` is not exactly
/// [`LENGTH_PREFIX_LEN`] ASCII digits.
pub fn decode_length(prefix: &[u8]) -> Result<usize> {
    if prefix.len() != LENGTH_PREFIX_LEN {
        return Err(OxdError::MalformedFrame(format!(
            "length prefix must be {} bytes, got {}",
            LENGTH_PREFIX_LEN,
            prefix.len()
        ))
        .into());
    }

    if !prefix.iter().all(u8::is_ascii_digit) {
        return Err(OxdError::MalformedFrame(format!(
            "length prefix is not numeric: {:?}",
            String::from_utf8_lossy(prefix)
        ))
        .into());
    }

    Ok(prefix
        .iter()
        .fold(0usize, |acc, digit| acc * 10 + usize::from(digit - b'0')))
}

/// Parse a frame payload as JSON.
///
/// # Errors
///
/// Returns [`OxdError::MalformedFrame`] if the bytes are not valid JSON.
pub fn decode_payload(bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes)
        .map_err(|e| OxdError::MalformedFrame(format!("payload is not valid JSON: {}", e)).into())
}

/// Decode a complete frame (prefix and payload) held in memory.
///
/// # Errors
///
/// Returns [`OxdError::MalformedFrame`] if the prefix is invalid, the
/// payload length disagrees with the prefix, or the payload is not JSON.
pub fn decode(frame: &[u8]) -> Result<Value> {
    if frame.len() < LENGTH_PREFIX_LEN {
        return Err(OxdError::MalformedFrame(format!(
            "frame shorter than its {}-byte prefix",
            LENGTH_PREFIX_LEN
        ))
        .into());
    }

    let (prefix, payload) = frame.split_at(LENGTH_PREFIX_LEN);
    let declared = decode_length(prefix)?;
    if payload.len() != declared {
        return Err(OxdError::MalformedFrame(format!(
            "prefix declares {} bytes but payload has {}",
            declared,
            payload.len()
        ))
        .into());
    }

    decode_payload(payload)
}
