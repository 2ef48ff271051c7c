//! CastMessage wire codec.
//!
//! The channel carries 4-byte big-endian length prefixes followed by a
//! serialized `CastMessage` protobuf. The schema has exactly six fields and
//! only uses wire types 0 (varint) and 2 (length-delimited), so the codec
//! is hand-rolled rather than pulling in a protobuf toolchain.
//!
//! Field numbers (stable):
//! 1. protocol_version (varint, always 0)
//! 2. source_id (string)
//! 3. destination_id (string)
//! 4. namespace (string)
//! 5. payload_type (varint, 0 = STRING)
//! 6. payload_utf8 (string, a JSON document)

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid protobuf varint")]
    InvalidVarint,
    #[error("protobuf string out of bounds")]
    StringOutOfBounds,
    #[error("protobuf string is not UTF-8")]
    InvalidUtf8,
    #[error("unsupported protobuf wire type {0}")]
    UnsupportedWireType(u8),
    #[error("frame too large")]
    FrameTooLarge,
}

/// One CASTV2 control message. `payload` is always a STRING payload (a JSON
/// document); binary payloads never occur on the namespaces Beamer uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastMessage {
    pub source_id: String,
    pub destination_id: String,
    pub namespace: String,
    pub payload: String,
}

impl CastMessage {
    pub fn new(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace: namespace.into(),
            payload: payload.into(),
        }
    }
}

/// Serializes a message as length prefix + protobuf body.
pub fn encode_frame(message: &CastMessage) -> Result<Vec<u8>, CodecError> {
    let mut body = Vec::with_capacity(64 + message.payload.len());
    write_varint_field(&mut body, 1, 0); // protocol_version CASTV2_1_0
    write_string_field(&mut body, 2, &message.source_id);
    write_string_field(&mut body, 3, &message.destination_id);
    write_string_field(&mut body, 4, &message.namespace);
    write_varint_field(&mut body, 5, 0); // payload_type STRING
    write_string_field(&mut body, 6, &message.payload);

    let len: u32 = body.len().try_into().map_err(|_| CodecError::FrameTooLarge)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Parses a protobuf body (without the length prefix). Unknown fields are
/// tolerated and skipped.
pub fn decode_body(bytes: &[u8]) -> Result<CastMessage, CodecError> {
    let mut cursor = 0usize;
    let mut message = CastMessage::new("", "", "", "");

    while cursor < bytes.len() {
        let key = read_varint(bytes, &mut cursor).ok_or(CodecError::InvalidVarint)?;
        let field_number = (key >> 3) as u32;
        let wire_type = (key & 0x07) as u8;
        match wire_type {
            0 => {
                // protocol_version / payload_type; values are fixed at 0 for
                // every message we exchange, so the value is just consumed.
                read_varint(bytes, &mut cursor).ok_or(CodecError::InvalidVarint)?;
            }
            2 => {
                let len =
                    read_varint(bytes, &mut cursor).ok_or(CodecError::InvalidVarint)? as usize;
                if cursor + len > bytes.len() {
                    return Err(CodecError::StringOutOfBounds);
                }
                let value = std::str::from_utf8(&bytes[cursor..cursor + len])
                    .map_err(|_| CodecError::InvalidUtf8)?
                    .to_string();
                cursor += len;
                match field_number {
                    2 => message.source_id = value,
                    3 => message.destination_id = value,
                    4 => message.namespace = value,
                    6 => message.payload = value,
                    _ => {}
                }
            }
            other => return Err(CodecError::UnsupportedWireType(other)),
        }
    }

    Ok(message)
}

fn write_varint_field(out: &mut Vec<u8>, field_number: u32, value: u64) {
    write_varint(out, (field_number as u64) << 3);
    write_varint(out, value);
}

fn write_string_field(out: &mut Vec<u8>, field_number: u32, value: &str) {
    write_varint(out, ((field_number as u64) << 3) | 2);
    write_varint(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

pub(crate) fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

pub(crate) fn read_varint(bytes: &[u8], cursor: &mut usize) -> Option<u64> {
    let mut shift = 0u32;
    let mut value = 0u64;
    while *cursor < bytes.len() && shift <= 63 {
        let byte = bytes[*cursor];
        *cursor += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
        shift += 7;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_roundtrip() {
        for v in [0u64, 1, 127, 128, 300, 16384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, v);
            let mut cursor = 0;
            assert_eq!(read_varint(&buf, &mut cursor), Some(v));
            assert_eq!(cursor, buf.len());
        }
    }

    #[test]
    fn frame_roundtrip_preserves_all_fields() {
        let message = CastMessage::new(
            "sender-0",
            "receiver-0",
            "urn:x-cast:com.google.cast.tp.connection",
            r#"{"type":"CONNECT"}"#,
        );
        let frame = encode_frame(&message).unwrap();

        // First 4 bytes are the big-endian length of the protobuf body.
        let len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - 4);

        let decoded = decode_body(&frame[4..]).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn decode_tolerates_unknown_fields() {
        let message = CastMessage::new("a", "b", "ns", "{}");
        let frame = encode_frame(&message).unwrap();
        let mut body = frame[4..].to_vec();
        // Append an unknown string field number 9.
        write_string_field(&mut body, 9, "future");
        // And an unknown varint field number 10.
        write_varint_field(&mut body, 10, 42);
        assert_eq!(decode_body(&body).unwrap(), message);
    }

    #[test]
    fn decode_rejects_truncated_string() {
        let message = CastMessage::new("sender-0", "receiver-0", "ns", "{}");
        let frame = encode_frame(&message).unwrap();
        let body = &frame[4..frame.len() - 1];
        assert!(matches!(
            decode_body(body),
            Err(CodecError::StringOutOfBounds) | Err(CodecError::InvalidVarint)
        ));
    }

    #[test]
    fn encoded_body_starts_with_protocol_version_field() {
        let frame = encode_frame(&CastMessage::new("s", "d", "n", "p")).unwrap();
        // Field 1, wire type 0, value 0.
        assert_eq!(&frame[4..6], &[0x08, 0x00]);
    }
}
