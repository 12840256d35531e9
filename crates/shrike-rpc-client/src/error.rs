//! Client error types.

use thiserror::Error;

use shrike_json_rpc::RpcError;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failures surfaced to callers of [`Client`](crate::Client).
///
/// `Rpc` covers both errors the server returned and errors raised by
/// local protocol validation (bad responses, unsupported param types,
/// reply decode failures), all carrying a JSON-RPC error code.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("{0}")]
    Rpc(#[from] RpcError),

    #[error("connection is shut down")]
    Shutdown,

    #[error("call timed out")]
    Timeout,

    #[error("io error: {0}")]
    Io(String),
}

impl ClientError {
    pub(crate) fn io(err: std::io::Error) -> Self {
        ClientError::Io(err.to_string())
    }

    /// The domain error, when this is one.
    pub fn rpc(&self) -> Option<&RpcError> {
        match self {
            ClientError::Rpc(err) => Some(err),
            _ => None,
        }
    }
}
