//! Decode-once codec for the transport layer.
//!
//! - Binary frames => RequestEnvelope (panic-free `bytes::Buf` parsing)
//! - Text frames are not part of the protocol and are surfaced as such
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;
use svcrelay_core::{
    error::Result,
    protocol::{frame, RequestEnvelope, ResponseEnvelope},
};

#[derive(Debug)]
pub enum Inbound {
    Request(RequestEnvelope),
    Text { bytes_len: usize },
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Binary(b) => Ok(Inbound::Request(frame::decode_request(bytes::Bytes::from(b))?)),
        Message::Text(s) => Ok(Inbound::Text { bytes_len: s.len() }),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(v) => Ok(Inbound::Pong(v)),
        Message::Close(_) => Ok(Inbound::Close),
    }
}

pub fn encode(resp: &ResponseEnvelope) -> Result<Message> {
    frame::encode_response(resp).map(|b| Message::Binary(b.to_vec()))
}
