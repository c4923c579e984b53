use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DecodeError, EncodeError, RecordError};

// ════════════════════════════════════════════════════════════════
//  Record
// ════════════════════════════════════════════════════════════════

/// Каноническая запись, которую relay переносит от gateway к listener.
///
/// Поля приватные: через [`Record::new`] и [`decode`] нельзя получить
/// запись с пустым `name`, поэтому [`encode`] работает только с валидными.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WireRecord")]
pub struct Record {
    name: String,
    email: String,
}

impl Record {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Result<Self, RecordError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RecordError::EmptyName);
        }
        Ok(Self {
            name,
            email: email.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Формат не проверяется.
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User: {} registered with Email: {}", self.name, self.email)
    }
}

/// Входная форма записи. Принимает и канонические ключи, и `Name`/`Email`,
/// которые выдают старые producer'ы.
#[derive(Deserialize)]
struct WireRecord {
    #[serde(alias = "Name")]
    name: String,
    #[serde(alias = "Email")]
    email: String,
}

impl TryFrom<WireRecord> for Record {
    type Error = DecodeError;

    fn try_from(wire: WireRecord) -> Result<Self, Self::Error> {
        Ok(Record::new(wire.name, wire.email)?)
    }
}

// ════════════════════════════════════════════════════════════════
//  Envelope
// ════════════════════════════════════════════════════════════════

/// Wire-форма записи: JSON-объект `{"name":..,"email":..}` в UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope(Vec<u8>);

impl Envelope {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Envelope {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Envelope {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

// ════════════════════════════════════════════════════════════════
//  Codec
// ════════════════════════════════════════════════════════════════

/// Record → Envelope. Детерминированно: одна и та же запись всегда даёт те же байты.
pub fn encode(record: &Record) -> Result<Envelope, EncodeError> {
    Ok(Envelope::from(serde_json::to_vec(record)?))
}

/// Bytes → Record. Либо полная валидная запись, либо ошибка.
pub fn decode(bytes: &[u8]) -> Result<Record, DecodeError> {
    let wire: WireRecord = serde_json::from_slice(bytes)?;
    Record::try_from(wire)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> Record {
        Record::new("Ada", "ada@example.com").unwrap()
    }

    #[test]
    fn decode_inverts_encode() {
        let records = [
            ada(),
            Record::new("Grace Hopper", "").unwrap(),
            Record::new("Ёжик \"в\" тумане", "not-an-email").unwrap(),
            Record::new("tab\tand\nnewline", "x@y").unwrap(),
        ];
        for record in records {
            let envelope = encode(&record).unwrap();
            assert_eq!(decode(envelope.as_bytes()).unwrap(), record);
        }
    }

    #[test]
    fn encode_uses_canonical_field_tags() {
        let envelope = encode(&ada()).unwrap();
        assert_eq!(
            envelope.as_bytes(),
            br#"{"name":"Ada","email":"ada@example.com"}"#
        );
    }

    #[test]
    fn decode_accepts_capitalised_keys() {
        let record = decode(br#"{"Name":"Ada","Email":"ada@example.com"}"#).unwrap();
        assert_eq!(record, ada());

        let mixed = decode(br#"{"name":"Ada","Email":"ada@example.com"}"#).unwrap();
        assert_eq!(mixed, ada());
    }

    #[test]
    fn decode_ignores_unknown_fields() {
        let record = decode(br#"{"name":"Ada","email":"ada@example.com","age":36}"#).unwrap();
        assert_eq!(record, ada());
    }

    #[test]
    fn missing_field_is_invalid() {
        let err = decode(br#"{"name":"Ada"}"#).unwrap_err();
        assert!(matches!(&err, DecodeError::Invalid(msg) if msg.contains("email")), "{err}");
    }

    #[test]
    fn wrong_shape_is_invalid() {
        for input in [&b"null"[..], b"[]", b"42", br#""Ada""#, br#"{"name":1,"email":"x"}"#] {
            let err = decode(input).unwrap_err();
            assert!(matches!(err, DecodeError::Invalid(_)), "{input:?}: {err}");
        }
    }

    #[test]
    fn broken_syntax_is_malformed() {
        for input in [
            &b""[..],
            br#"{"name":"Ada""#,
            br#"{"name":"Ada","email":"a"} trailing"#,
            b"name=Ada",
            b"{\"name\":\"\xff\xfe\",\"email\":\"a\"}",
        ] {
            let err = decode(input).unwrap_err();
            assert!(matches!(err, DecodeError::Malformed(_)), "{input:?}: {err}");
        }
    }

    #[test]
    fn empty_name_is_rejected() {
        assert_eq!(
            decode(br#"{"name":"","email":"ada@example.com"}"#).unwrap_err(),
            DecodeError::Rejected(RecordError::EmptyName)
        );
        assert_eq!(Record::new("", "x").unwrap_err(), RecordError::EmptyName);
    }

    #[test]
    fn display_matches_log_rendering() {
        assert_eq!(ada().to_string(), "User: Ada registered with Email: ada@example.com");
    }
}
