//! Frame struct with encode/decode.
//!
//! A [`Frame`] is one self-describing protocol message on the binary
//! channel. Every field is optional; unset fields simply do not appear on
//! the wire. The encoded size is therefore
//! `1 (version) + Σ over set fields of (1 tag byte + body size)`.
//!
//! # Example
//!
//! ```
//! use voicewire_client::protocol::Frame;
//! use bytes::Bytes;
//!
//! let mut frame = Frame::new();
//! frame.sent_ts = Some(1234);
//! frame.payload = Some(Bytes::from_static(b"packet"));
//!
//! let wire = frame.encode();
//! let back = Frame::decode(&wire).unwrap();
//! assert_eq!(back.sent_ts, Some(1234));
//! assert_eq!(back.payload.as_deref(), Some(&b"packet"[..]));
//! assert_eq!(back.metadata, None);
//! ```

use bytes::Bytes;

use super::wire_format::{self, tags, FieldKind, FIELDS, VERSION};
use crate::error::{Result, VoicewireError};

/// A single protocol message on the binary channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Wall-clock send timestamp in milliseconds.
    pub sent_ts: Option<i64>,
    /// Clock-difference timestamp in milliseconds.
    pub diff_ts: Option<i64>,
    /// Capture timestamp in milliseconds.
    pub capture_ts: Option<i64>,
    /// Opaque byte blob, typically an encoded audio packet.
    pub payload: Option<Bytes>,
    /// UTF-8 metadata, typically serialized JSON.
    pub metadata: Option<String>,
}

impl Frame {
    /// Create a frame with no fields set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a frame carrying only an audio payload.
    pub fn with_payload(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: Some(payload.into()),
            ..Self::default()
        }
    }

    /// Create a frame carrying only a metadata string.
    pub fn with_metadata(metadata: impl Into<String>) -> Self {
        Self {
            metadata: Some(metadata.into()),
            ..Self::default()
        }
    }

    fn i64_field(&self, tag: u8) -> Option<i64> {
        match tag {
            tags::SENT_TS => self.sent_ts,
            tags::DIFF_TS => self.diff_ts,
            tags::CAPTURE_TS => self.capture_ts,
            _ => None,
        }
    }

    /// Encoded size in bytes.
    pub fn wire_size(&self) -> usize {
        let mut size = 1;
        for &(tag, kind) in FIELDS {
            size += match kind {
                FieldKind::I64 => self.i64_field(tag).map_or(0, |_| 1 + 8),
                FieldKind::Bytes => self.payload.as_ref().map_or(0, |b| 1 + 4 + b.len()),
                FieldKind::Utf8 => self.metadata.as_ref().map_or(0, |s| 1 + 4 + s.len()),
            };
        }
        size
    }

    /// Encode the frame to its wire representation.
    ///
    /// Fields are emitted in declaration order from the field table; unset
    /// fields are skipped entirely.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_size());
        out.push(VERSION);
        for &(tag, kind) in FIELDS {
            match kind {
                FieldKind::I64 => {
                    if let Some(v) = self.i64_field(tag) {
                        out.push(tag);
                        wire_format::put_i64(&mut out, v);
                    }
                }
                FieldKind::Bytes => {
                    if let Some(b) = &self.payload {
                        out.push(tag);
                        wire_format::put_prefixed(&mut out, b);
                    }
                }
                FieldKind::Utf8 => {
                    if let Some(s) = &self.metadata {
                        out.push(tag);
                        wire_format::put_prefixed(&mut out, s.as_bytes());
                    }
                }
            }
        }
        debug_assert_eq!(out.len(), self.wire_size());
        out
    }

    /// Decode a frame from its wire representation.
    ///
    /// Consumes tag-prefixed fields until the buffer is exhausted. Fields
    /// absent from the wire stay unset.
    ///
    /// # Errors
    ///
    /// - [`VoicewireError::Protocol`] on an empty buffer, an unsupported
    ///   version byte, or a truncated field.
    /// - [`VoicewireError::UnknownFieldTag`] if a tag byte does not match
    ///   any known field.
    /// - [`VoicewireError::FieldTooLarge`] if a length prefix exceeds the
    ///   1 MiB cap.
    pub fn decode(wire: &[u8]) -> Result<Self> {
        let mut input = wire;
        if input.is_empty() {
            return Err(VoicewireError::Protocol("empty frame".into()));
        }
        let version = input[0];
        input = &input[1..];
        if version != VERSION {
            return Err(VoicewireError::Protocol(format!(
                "unsupported frame version: {}",
                version
            )));
        }

        let mut frame = Frame::new();
        while !input.is_empty() {
            let tag = input[0];
            input = &input[1..];
            let kind =
                wire_format::field_kind(tag).ok_or(VoicewireError::UnknownFieldTag(tag))?;
            match kind {
                FieldKind::I64 => {
                    let v = wire_format::get_i64(&mut input)?;
                    match tag {
                        tags::SENT_TS => frame.sent_ts = Some(v),
                        tags::DIFF_TS => frame.diff_ts = Some(v),
                        tags::CAPTURE_TS => frame.capture_ts = Some(v),
                        _ => unreachable!("i64 kind is only declared for timestamp tags"),
                    }
                }
                FieldKind::Bytes => {
                    frame.payload = Some(Bytes::from(wire_format::get_prefixed(&mut input)?));
                }
                FieldKind::Utf8 => {
                    let body = wire_format::get_prefixed(&mut input)?;
                    let s = String::from_utf8(body)
                        .map_err(|e| VoicewireError::Protocol(format!("invalid UTF-8: {}", e)))?;
                    frame.metadata = Some(s);
                }
            }
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::MAX_FIELD_LEN;
    use bytes::BufMut;

    #[test]
    fn test_empty_frame_is_version_only() {
        let frame = Frame::new();
        let wire = frame.encode();
        assert_eq!(wire, vec![VERSION]);

        let back = Frame::decode(&wire).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_roundtrip_all_fields() {
        let frame = Frame {
            sent_ts: Some(1_000_000_007),
            diff_ts: Some(-42),
            capture_ts: Some(i64::MAX),
            payload: Some(Bytes::from_static(&[0xAB, 0xCD, 0xEF])),
            metadata: Some("{\"signal\":\"listen\"}".to_string()),
        };
        let back = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_roundtrip_field_subsets() {
        // Every subset of the five fields survives a roundtrip with unset
        // fields staying unset.
        for mask in 0u32..32 {
            let frame = Frame {
                sent_ts: (mask & 1 != 0).then_some(11),
                diff_ts: (mask & 2 != 0).then_some(-22),
                capture_ts: (mask & 4 != 0).then_some(33),
                payload: (mask & 8 != 0).then(|| Bytes::from_static(b"pkt")),
                metadata: (mask & 16 != 0).then(|| "meta".to_string()),
            };
            let back = Frame::decode(&frame.encode()).unwrap();
            assert_eq!(back, frame, "subset mask {:#b}", mask);
        }
    }

    #[test]
    fn test_wire_size_invariant() {
        let frame = Frame {
            sent_ts: Some(1),
            diff_ts: None,
            capture_ts: Some(2),
            payload: Some(Bytes::from_static(b"abcd")),
            metadata: Some("xy".to_string()),
        };
        // 1 version + (1+8) + (1+8) + (1+4+4) + (1+4+2)
        assert_eq!(frame.wire_size(), 1 + 9 + 9 + 9 + 7);
        assert_eq!(frame.encode().len(), frame.wire_size());
    }

    #[test]
    fn test_fields_emitted_in_declaration_order() {
        let frame = Frame {
            sent_ts: Some(1),
            diff_ts: Some(2),
            capture_ts: Some(3),
            payload: Some(Bytes::from_static(b"p")),
            metadata: Some("m".to_string()),
        };
        let wire = frame.encode();
        assert_eq!(wire[0], VERSION);
        assert_eq!(wire[1], tags::SENT_TS);
        assert_eq!(wire[10], tags::DIFF_TS);
        assert_eq!(wire[19], tags::CAPTURE_TS);
        assert_eq!(wire[28], tags::PAYLOAD);
        assert_eq!(wire[34], tags::METADATA);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let wire = vec![VERSION, 9, 0, 0, 0, 0];
        match Frame::decode(&wire) {
            Err(VoicewireError::UnknownFieldTag(9)) => {}
            other => panic!("expected UnknownFieldTag, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_field_rejected() {
        let mut wire = vec![VERSION, tags::PAYLOAD];
        wire.put_u32_le((MAX_FIELD_LEN + 1) as u32);
        match Frame::decode(&wire) {
            Err(VoicewireError::FieldTooLarge { size, cap }) => {
                assert_eq!(size, MAX_FIELD_LEN + 1);
                assert_eq!(cap, MAX_FIELD_LEN);
            }
            other => panic!("expected FieldTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_field_rejected() {
        // Payload declares 100 bytes but only 3 follow.
        let mut wire = vec![VERSION, tags::PAYLOAD];
        wire.put_u32_le(100);
        wire.extend_from_slice(b"abc");
        assert!(matches!(
            Frame::decode(&wire),
            Err(VoicewireError::Protocol(_))
        ));
    }

    #[test]
    fn test_truncated_timestamp_rejected() {
        let wire = vec![VERSION, tags::SENT_TS, 1, 2, 3];
        assert!(matches!(
            Frame::decode(&wire),
            Err(VoicewireError::Protocol(_))
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let wire = vec![2, tags::SENT_TS, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            Frame::decode(&wire),
            Err(VoicewireError::Protocol(_))
        ));
    }

    #[test]
    fn test_empty_buffer_rejected() {
        assert!(matches!(
            Frame::decode(&[]),
            Err(VoicewireError::Protocol(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_metadata_rejected() {
        let mut wire = vec![VERSION, tags::METADATA];
        wire.put_u32_le(2);
        wire.extend_from_slice(&[0xFF, 0xFE]);
        assert!(matches!(
            Frame::decode(&wire),
            Err(VoicewireError::Protocol(_))
        ));
    }

    #[test]
    fn test_constructors() {
        let f = Frame::with_payload(vec![1u8, 2, 3]);
        assert_eq!(f.payload.as_deref(), Some(&[1u8, 2, 3][..]));
        assert!(f.metadata.is_none());

        let f = Frame::with_metadata("{}");
        assert_eq!(f.metadata.as_deref(), Some("{}"));
        assert!(f.payload.is_none());
    }
}
