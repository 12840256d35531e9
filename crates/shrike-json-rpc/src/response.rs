//! Response envelopes for both directions of the wire.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::RpcError;
use crate::id::RequestId;

/// An outgoing response envelope.
#[derive(Debug)]
pub struct ServerResponse {
    pub id: RequestId,
    pub body: ResponseBody,
}

/// Exactly one of `result` / `error`.
#[derive(Debug)]
pub enum ResponseBody {
    /// Serialized as `result` plus an explicit `"error":null`, even when
    /// the result itself is null (legacy field-presence contract).
    Result(Value),
    /// Serialized as `error` with no `result` member.
    Error(RpcError),
}

impl ServerResponse {
    pub fn result(id: RequestId, value: Value) -> Self {
        Self {
            id,
            body: ResponseBody::Result(value),
        }
    }

    /// An error response; a missing id serializes as null.
    pub fn error(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            id: id.unwrap_or_else(RequestId::null),
            body: ResponseBody::Error(error),
        }
    }
}

impl Serialize for ServerResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.body {
            ResponseBody::Result(value) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("id", &self.id)?;
                map.serialize_entry("result", value)?;
                map.serialize_entry("error", &Value::Null)?;
                map.end()
            }
            ResponseBody::Error(error) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("id", &self.id)?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}

/// A strictly validated incoming response envelope.
#[derive(Debug)]
pub struct ClientResponse {
    pub id: RequestId,
    /// Present and non-null iff this is a success response.
    pub result: Option<Box<RawValue>>,
    /// Present and non-null iff this is an error response.
    pub error: Option<RpcError>,
}

/// The response violated the envelope contract. The caller reports it
/// with the literal response text, so no detail is carried here.
#[derive(Debug)]
pub struct BadResponse;

impl ClientResponse {
    /// Validate one top-level JSON value as a response envelope.
    ///
    /// Enforced: the value is an object whose members are a subset of
    /// {`jsonrpc`, `id`, `result`, `error`}; `id` is present and primitive
    /// (number, string or null); exactly one of `result` / `error` is
    /// non-null; a non-null `error` is an object with an integer `code`, a
    /// string `message`, optional `data` and nothing else. `jsonrpc` is
    /// tolerated with any value.
    pub fn parse(raw: &RawValue) -> Result<ClientResponse, BadResponse> {
        if !raw.get().starts_with('{') {
            return Err(BadResponse);
        }
        let mut members: HashMap<String, Box<RawValue>> =
            serde_json::from_str(raw.get()).map_err(|_| BadResponse)?;

        if members
            .keys()
            .any(|key| !matches!(key.as_str(), "jsonrpc" | "id" | "result" | "error"))
        {
            return Err(BadResponse);
        }

        let id = members
            .remove("id")
            .and_then(|fragment| RequestId::from_raw(fragment).ok())
            .ok_or(BadResponse)?;

        let result = members.remove("result").filter(|r| r.get() != "null");
        let error = match members.remove("error").filter(|e| e.get() != "null") {
            Some(fragment) => Some(parse_error_object(&fragment)?),
            None => None,
        };

        if result.is_some() == error.is_some() {
            return Err(BadResponse);
        }

        Ok(ClientResponse { id, result, error })
    }
}

fn parse_error_object(raw: &RawValue) -> Result<RpcError, BadResponse> {
    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct WireError {
        code: i64,
        message: String,
        #[serde(default)]
        data: Option<Value>,
    }

    if !raw.get().starts_with('{') {
        return Err(BadResponse);
    }
    let error: WireError = serde_json::from_str(raw.get()).map_err(|_| BadResponse)?;
    Ok(RpcError {
        code: error.code,
        message: error.message,
        data: error.data.filter(|data| !data.is_null()),
    })
}
