//! Binary frame layout for envelopes (panic-free).
//!
//! ```text
//! v:u8 | flags:u8 | key_len:u16 (LE) | key[key_len] | payload...
//! ```
//!
//! Parsing rules:
//! - Never index (`buf[0]`); always use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, RelayError};
use crate::protocol::envelope::{CorrelationKey, Payload, RequestEnvelope, ResponseEnvelope};

/// Current frame version.
pub const FRAME_VERSION: u8 = 1;

/// Flag: payload is sealed with the connection's key material.
pub const FRAME_FLAG_SEALED: u8 = 0x01;

/// Fixed header: v, flags, key_len.
const HEADER_LEN: usize = 4;

/// Decode a request frame into an envelope.
pub fn decode_request(mut buf: Bytes) -> Result<RequestEnvelope> {
    if buf.remaining() < HEADER_LEN {
        return Err(RelayError::Decode("frame too short".into()));
    }

    let v = buf.get_u8();
    if v != FRAME_VERSION {
        return Err(RelayError::Decode(format!("unsupported frame version {v}")));
    }

    let flags = buf.get_u8();
    if flags & !FRAME_FLAG_SEALED != 0 {
        return Err(RelayError::Decode(format!("unknown frame flags {flags:#04x}")));
    }

    let key_len = usize::from(buf.get_u16_le());
    if key_len == 0 {
        return Err(RelayError::Decode("empty correlation key".into()));
    }
    if buf.remaining() < key_len {
        return Err(RelayError::Decode(format!(
            "key_len {key_len} exceeds remaining {}",
            buf.remaining()
        )));
    }

    let key = CorrelationKey::new(buf.copy_to_bytes(key_len));
    let body = buf.copy_to_bytes(buf.remaining());
    let payload = if flags & FRAME_FLAG_SEALED != 0 {
        Payload::Sealed(body)
    } else {
        Payload::Plain(body)
    };

    Ok(RequestEnvelope { key, payload })
}

/// Encode a response envelope with the same layout.
pub fn encode_response(resp: &ResponseEnvelope) -> Result<Bytes> {
    encode(&resp.key, &resp.payload)
}

/// Encode a request envelope (client direction).
pub fn encode_request(req: &RequestEnvelope) -> Result<Bytes> {
    encode(&req.key, &req.payload)
}

fn encode(key: &CorrelationKey, payload: &Payload) -> Result<Bytes> {
    let key_len = u16::try_from(key.len())
        .map_err(|_| RelayError::Encoding(format!("correlation key too long: {}", key.len())))?;
    let body = payload.bytes();

    let mut out = BytesMut::with_capacity(HEADER_LEN + key.len() + body.len());
    out.put_u8(FRAME_VERSION);
    out.put_u8(if payload.is_sealed() { FRAME_FLAG_SEALED } else { 0 });
    out.put_u16_le(key_len);
    out.put_slice(key.as_bytes());
    out.put_slice(body);
    Ok(out.freeze())
}
