//! Request envelopes for both directions of the wire.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::id::RequestId;

/// A decoded incoming request envelope.
#[derive(Debug)]
pub struct ServerRequest {
    pub method: String,
    /// Raw params fragment, always an array or an object when present.
    pub params: Option<Box<RawValue>>,
    /// `None` marks a notification.
    pub id: Option<RequestId>,
}

/// An envelope that failed validation, with the id to echo in the error
/// response when one was recoverable.
#[derive(Debug)]
pub struct InvalidRequest {
    pub id: Option<RequestId>,
}

impl ServerRequest {
    /// Validate one top-level JSON value as a request envelope.
    ///
    /// Rejected: a non-object value, a missing or non-string `method`, a
    /// `params` member that is neither array nor object, and an `id` that
    /// is not a number, string or null. A valid `id` survives rejection so
    /// the error response can echo it. Unknown members, `jsonrpc`
    /// included, are ignored.
    ///
    /// The batch dispatcher uses the same validation to decide whether an
    /// element is written to the loopback pipe; an element is invoked iff
    /// it parses here, which is what keeps reply slots aligned with
    /// arriving replies.
    pub fn parse(raw: &RawValue) -> Result<ServerRequest, InvalidRequest> {
        #[derive(Deserialize)]
        struct Envelope {
            method: Option<Box<RawValue>>,
            params: Option<Box<RawValue>>,
            id: Option<Box<RawValue>>,
        }

        if !raw.get().starts_with('{') {
            return Err(InvalidRequest { id: None });
        }
        let envelope: Envelope =
            serde_json::from_str(raw.get()).map_err(|_| InvalidRequest { id: None })?;

        let id = match envelope.id {
            None => None,
            Some(fragment) => match RequestId::from_raw(fragment) {
                Ok(id) => Some(id),
                Err(_) => return Err(InvalidRequest { id: None }),
            },
        };

        let method = match envelope.method {
            Some(fragment) if fragment.get().starts_with('"') => {
                serde_json::from_str::<String>(fragment.get())
                    .map_err(|_| InvalidRequest { id: id.clone() })?
            }
            _ => return Err(InvalidRequest { id }),
        };

        if let Some(params) = &envelope.params {
            if !matches!(params.get().as_bytes().first().copied(), Some(b'[' | b'{')) {
                return Err(InvalidRequest { id });
            }
        }

        Ok(ServerRequest {
            method,
            params: envelope.params,
            id,
        })
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// An outgoing request envelope.
///
/// `id` carries the sequence number for calls and serializes as JSON null
/// for notifications. `params` is omitted from the wire entirely when
/// absent.
#[derive(Debug)]
pub struct ClientRequest<'a> {
    pub method: &'a str,
    pub params: Option<&'a Value>,
    pub id: Option<u64>,
}

impl Serialize for ClientRequest<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 2 + usize::from(self.params.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("method", self.method)?;
        if let Some(params) = self.params {
            map.serialize_entry("params", params)?;
        }
        match self.id {
            Some(seq) => map.serialize_entry("id", &seq)?,
            None => map.serialize_entry("id", &Value::Null)?,
        }
        map.end()
    }
}
