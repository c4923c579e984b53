use serde_json::error::Category;

/// Envelope bytes are not a structurally valid serialized [`Record`](crate::Record).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Not parseable at all: syntax error, truncated input, trailing bytes.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Parseable, but the shape is wrong: missing field, wrong type, not an object.
    #[error("invalid record: {0}")]
    Invalid(String),

    /// Well-formed, but the record itself is not acceptable.
    #[error("invalid record: {0}")]
    Rejected(#[from] RecordError),
}

/// A record violates its own invariants, regardless of where it came from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("name must not be empty")]
    EmptyName,
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        match e.classify() {
            Category::Data => DecodeError::Invalid(e.to_string()),
            Category::Io | Category::Syntax | Category::Eof => DecodeError::Malformed(e.to_string()),
        }
    }
}

/// Serialization of a constructed record failed. Internal error, never a client fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("encode record: {0}")]
pub struct EncodeError(pub String);

impl From<serde_json::Error> for EncodeError {
    fn from(e: serde_json::Error) -> Self {
        EncodeError(e.to_string())
    }
}

/// Failure reported by the pub/sub broker capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("publish to '{channel}': {detail}")]
    Publish { channel: String, detail: String },

    #[error("subscribe to '{channel}': {detail}")]
    Subscribe { channel: String, detail: String },

    #[error("broker closed")]
    Closed,
}
