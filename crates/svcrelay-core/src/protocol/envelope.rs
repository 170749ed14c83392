use std::fmt;

use bytes::Bytes;

/// Opaque token linking a request to its eventual response on a connection.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey(Bytes);

impl CorrelationKey {
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self(raw.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationKey({self})")
    }
}

impl From<&'static str> for CorrelationKey {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

/// Envelope contents. The variant alone says whether the bytes are sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Plain(Bytes),
    Sealed(Bytes),
}

impl Payload {
    pub fn is_sealed(&self) -> bool {
        matches!(self, Payload::Sealed(_))
    }

    pub fn bytes(&self) -> &Bytes {
        match self {
            Payload::Plain(b) | Payload::Sealed(b) => b,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Payload::Plain(b) | Payload::Sealed(b) => b,
        }
    }
}

/// Inbound call as framed by the connection layer. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub key: CorrelationKey,
    pub payload: Payload,
}

impl RequestEnvelope {
    pub fn new(key: CorrelationKey, payload: Payload) -> Self {
        Self { key, payload }
    }

    pub fn is_sealed(&self) -> bool {
        self.payload.is_sealed()
    }
}

/// Outbound reply. `key` is always copied from the originating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub key: CorrelationKey,
    pub payload: Payload,
}
