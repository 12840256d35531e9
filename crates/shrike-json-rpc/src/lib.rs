//! # JSON-RPC 2.0 wire core
//!
//! Transport-agnostic building blocks shared by the server and client
//! codecs: wire envelope types, the request-id representation, the domain
//! error model and newline-framed streaming of top-level JSON values.
//!
//! ## Design notes
//! - **Ids round-trip verbatim.** A [`RequestId`] keeps the raw JSON
//!   fragment it arrived as; an id received as the string `"0"` is echoed
//!   as `"0"`, never as the number `0`.
//! - **Field presence is part of the contract.** A success response emits
//!   `result` (even when null) together with an explicit `"error":null`; a
//!   failure response emits `error` and no `result` member at all.
//! - **`"jsonrpc":"2.0"` is tolerated, never required** and never emitted.

pub mod error;
pub mod framing;
pub mod id;
pub mod request;
pub mod response;

pub use error::{FrameError, RpcError};
pub use framing::{write_json_line, JsonReader};
pub use id::RequestId;
pub use request::{ClientRequest, InvalidRequest, ServerRequest};
pub use response::{BadResponse, ClientResponse, ResponseBody, ServerResponse};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Start of the implementation-defined server error range
    /// (-32000 through -32099). Non-domain handler failures land here.
    pub const SERVER_ERROR: i64 = -32000;
}
