//! The request id, kept as the raw JSON fragment it arrived as.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;

/// A JSON-RPC request id: a JSON number, string or null.
///
/// The original token shape is preserved end to end, so an id that
/// arrived as the string `"0"` is never re-emitted as the number `0`.
/// Two ids are equal when their raw fragments are textually equal; the
/// client's response correlation relies on this.
///
/// An *absent* id is not representable here on purpose: envelopes carry
/// `Option<RequestId>`, and `None` marks a notification. `id: null`
/// present is an ordinary call with a null id.
#[derive(Debug, Clone)]
pub struct RequestId {
    raw: Box<RawValue>,
}

impl RequestId {
    /// The JSON null id, used when a request's id could not be recovered.
    pub fn null() -> Self {
        Self {
            raw: RawValue::from_string("null".to_string()).unwrap(),
        }
    }

    /// A numeric id, as assigned from a client sequence counter.
    pub fn number(n: u64) -> Self {
        Self {
            raw: RawValue::from_string(n.to_string()).unwrap(),
        }
    }

    /// Validate a raw fragment as an id. Objects, arrays and booleans are
    /// not legal id values.
    pub fn from_raw(raw: Box<RawValue>) -> Result<Self, Box<RawValue>> {
        match raw.get().as_bytes().first().copied() {
            Some(b'{' | b'[' | b't' | b'f') | None => Err(raw),
            _ => Ok(Self { raw }),
        }
    }

    /// The verbatim JSON fragment.
    pub fn as_str(&self) -> &str {
        self.raw.get()
    }

    pub fn is_null(&self) -> bool {
        self.raw.get() == "null"
    }
}

impl PartialEq for RequestId {
    fn eq(&self, other: &Self) -> bool {
        self.raw.get() == other.raw.get()
    }
}

impl Eq for RequestId {}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw.get())
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Self::from_raw(raw)
            .map_err(|_| de::Error::custom("request id must be a number, a string or null"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(s: &str) -> Box<RawValue> {
        RawValue::from_string(s.to_string()).unwrap()
    }

    #[test]
    fn number_string_and_null_are_distinct() {
        let zero = RequestId::from_raw(raw("0")).unwrap();
        let quoted = RequestId::from_raw(raw("\"0\"")).unwrap();
        let null = RequestId::null();
        assert_ne!(zero, quoted);
        assert_ne!(zero, null);
        assert_ne!(quoted, null);
    }

    #[test]
    fn round_trips_verbatim() {
        for fragment in ["0", "\"0\"", "null", "1.5", "\"abc\"", "-7"] {
            let id = RequestId::from_raw(raw(fragment)).unwrap();
            assert_eq!(serde_json::to_string(&id).unwrap(), fragment);
        }
    }

    #[test]
    fn rejects_non_primitive_fragments() {
        for fragment in ["{}", "[0]", "true", "false"] {
            assert!(RequestId::from_raw(raw(fragment)).is_err(), "{fragment}");
        }
    }

    #[test]
    fn sequence_number_matches_its_wire_text() {
        assert_eq!(RequestId::number(0).as_str(), "0");
        assert_eq!(RequestId::number(17).as_str(), "17");
    }
}
