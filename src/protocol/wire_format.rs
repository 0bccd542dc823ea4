//! Wire format for the binary frame channel.
//!
//! One frame per WebSocket binary message:
//! ```text
//! ┌─────────┬───────────────────────┬───────────────────────┬───
//! │ Version │ Tag │ Field bytes     │ Tag │ Field bytes     │ …
//! │ 1 byte  │ 1 B │ fixed or 4+N    │ 1 B │ fixed or 4+N    │
//! └─────────┴───────────────────────┴───────────────────────┴───
//! ```
//!
//! Only fields that are set appear on the wire, in declaration order.
//! Fixed-width fields are raw little-endian machine words; variable-length
//! fields carry a u32 little-endian length prefix followed by raw bytes.

use bytes::{Buf, BufMut};

use crate::error::{Result, VoicewireError};

/// The only wire format version in existence.
pub const VERSION: u8 = 1;

/// Hard cap for a single length-prefixed field. Bounds memory exposure from
/// a malicious or corrupt peer.
pub const MAX_FIELD_LEN: usize = 1024 * 1024;

/// Field tags for the binary frame channel.
pub mod tags {
    /// Wall-clock send timestamp, milliseconds (i64).
    pub const SENT_TS: u8 = 1;
    /// Clock-difference timestamp, milliseconds (i64).
    pub const DIFF_TS: u8 = 2;
    /// Capture timestamp, milliseconds (i64).
    pub const CAPTURE_TS: u8 = 3;
    /// Opaque byte blob, typically an encoded audio packet.
    pub const PAYLOAD: u8 = 4;
    /// UTF-8 string, typically serialized JSON metadata.
    pub const METADATA: u8 = 5;
}

/// Encoding of a single field's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 8 raw little-endian bytes.
    I64,
    /// u32-LE length prefix + raw bytes.
    Bytes,
    /// u32-LE length prefix + UTF-8 bytes.
    Utf8,
}

/// Declarative frame layout: every known field with its tag and encoding,
/// in the stable order fields are emitted on the wire.
pub const FIELDS: &[(u8, FieldKind)] = &[
    (tags::SENT_TS, FieldKind::I64),
    (tags::DIFF_TS, FieldKind::I64),
    (tags::CAPTURE_TS, FieldKind::I64),
    (tags::PAYLOAD, FieldKind::Bytes),
    (tags::METADATA, FieldKind::Utf8),
];

/// Look up a tag in the field table.
pub fn field_kind(tag: u8) -> Option<FieldKind> {
    FIELDS.iter().find(|(t, _)| *t == tag).map(|(_, k)| *k)
}

/// Append one i64 field body.
#[inline]
pub fn put_i64(out: &mut Vec<u8>, value: i64) {
    out.put_i64_le(value);
}

/// Append one length-prefixed field body.
#[inline]
pub fn put_prefixed(out: &mut Vec<u8>, body: &[u8]) {
    debug_assert!(body.len() <= MAX_FIELD_LEN);
    out.put_u32_le(body.len() as u32);
    out.extend_from_slice(body);
}

/// Read one i64 field body, or fail on truncated input.
pub fn get_i64(input: &mut &[u8]) -> Result<i64> {
    if input.remaining() < 8 {
        return Err(VoicewireError::Protocol("truncated i64 field".into()));
    }
    Ok(input.get_i64_le())
}

/// Read one length-prefixed field body, enforcing [`MAX_FIELD_LEN`].
pub fn get_prefixed(input: &mut &[u8]) -> Result<Vec<u8>> {
    if input.remaining() < 4 {
        return Err(VoicewireError::Protocol(
            "truncated field length prefix".into(),
        ));
    }
    let len = input.get_u32_le() as usize;
    if len > MAX_FIELD_LEN {
        return Err(VoicewireError::FieldTooLarge {
            size: len,
            cap: MAX_FIELD_LEN,
        });
    }
    if input.remaining() < len {
        return Err(VoicewireError::Protocol(format!(
            "field declares {} bytes, {} remain",
            len,
            input.remaining()
        )));
    }
    let mut body = vec![0u8; len];
    input.copy_to_slice(&mut body);
    Ok(body)
}
