//! The server-side stream codec.

use serde_json::value::RawValue;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use shrike_json_rpc::error::FrameError;
use shrike_json_rpc::{
    write_json_line, JsonReader, RequestId, RpcError, ServerRequest, ServerResponse,
};

use crate::context::CallContext;
use crate::BATCH_METHOD;

/// What `read_header` tells the dispatch loop about the next request.
#[derive(Debug)]
pub struct RequestHeader {
    /// Monotonic per-connection sequence number.
    pub seq: u64,
    /// Decoded method name; empty when the envelope already failed and
    /// the stored error will be written regardless of dispatch.
    pub method: String,
}

/// Per-request slot: `Idle` advances to one of the four decoded shapes on
/// `read_header` and back to `Idle` on `write_response`.
enum Slot {
    Idle,
    Call {
        id: RequestId,
        params: Option<Box<RawValue>>,
    },
    Notification {
        params: Option<Box<RawValue>>,
    },
    Batch {
        elements: Vec<Box<RawValue>>,
    },
    Failed {
        id: Option<RequestId>,
        error: RpcError,
    },
}

/// Stream adapter decoding framed requests and encoding framed responses.
///
/// Driven serially by the dispatch loop: one `read_header` / `read_body` /
/// `write_response` cycle per incoming request.
pub struct ServerCodec<R, W> {
    reader: JsonReader<R>,
    writer: W,
    ctx: CallContext,
    seq: u64,
    slot: Slot,
}

impl<R, W> ServerCodec<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(read: R, write: W) -> Self {
        Self::with_context(read, write, CallContext::new())
    }

    pub fn with_context(read: R, write: W, ctx: CallContext) -> Self {
        Self {
            reader: JsonReader::new(read),
            writer: write,
            ctx,
            seq: 0,
            slot: Slot::Idle,
        }
    }

    /// The context every request on this connection is dispatched with.
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Decode the next request header, or `None` at end of stream.
    ///
    /// Protocol-level failures do not surface here: malformed JSON stores
    /// a Parse Error in the slot (and resynchronizes the input to the
    /// next newline), a non-request value stores an Invalid Request, and
    /// the stored error is written on the next `write_response` no matter
    /// what the dispatcher produced in between.
    pub async fn read_header(&mut self) -> std::io::Result<Option<RequestHeader>> {
        let value = match self.reader.next_value().await {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(None),
            Err(FrameError::Io(err)) => return Err(err),
            Err(FrameError::Parse(err)) => {
                debug!(error = %err, "malformed frame");
                self.reader.skip_line().await?;
                self.slot = Slot::Failed {
                    id: None,
                    error: RpcError::parse_error(),
                };
                return Ok(Some(self.next_header(String::new())));
            }
        };

        match value.get().as_bytes().first().copied() {
            Some(b'[') => {
                let elements: Vec<Box<RawValue>> =
                    serde_json::from_str(value.get()).unwrap_or_default();
                if elements.is_empty() {
                    self.slot = Slot::Failed {
                        id: None,
                        error: RpcError::invalid_request(),
                    };
                    Ok(Some(self.next_header(String::new())))
                } else {
                    debug!(len = elements.len(), "batch request");
                    self.slot = Slot::Batch { elements };
                    Ok(Some(self.next_header(BATCH_METHOD.to_string())))
                }
            }
            Some(b'{') => match ServerRequest::parse(&value) {
                Ok(request) => {
                    let method = request.method;
                    self.slot = match request.id {
                        Some(id) => Slot::Call {
                            id,
                            params: request.params,
                        },
                        None => Slot::Notification {
                            params: request.params,
                        },
                    };
                    Ok(Some(self.next_header(method)))
                }
                Err(invalid) => {
                    self.slot = Slot::Failed {
                        id: invalid.id,
                        error: RpcError::invalid_request(),
                    };
                    Ok(Some(self.next_header(String::new())))
                }
            },
            _ => {
                self.slot = Slot::Failed {
                    id: None,
                    error: RpcError::invalid_request(),
                };
                Ok(Some(self.next_header(String::new())))
            }
        }
    }

    fn next_header(&mut self, method: String) -> RequestHeader {
        let seq = self.seq;
        self.seq += 1;
        RequestHeader { seq, method }
    }

    /// Raw params for the request in the current slot. `None` both for
    /// absent params and for slots that already failed in `read_header`.
    pub fn read_body(&mut self) -> Option<Box<RawValue>> {
        match &mut self.slot {
            Slot::Call { params, .. } | Slot::Notification { params } => params.take(),
            _ => None,
        }
    }

    /// The raw elements of a batch slot, or `None` when the current slot
    /// is not a batch. Taking them advances the slot.
    pub fn take_batch_elements(&mut self) -> Option<Vec<Box<RawValue>>> {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Batch { elements } => Some(elements),
            other => {
                self.slot = other;
                None
            }
        }
    }

    /// Write the response for the current slot and return it to `Idle`.
    ///
    /// An error stored by `read_header` takes precedence over `result`;
    /// a notification slot writes nothing.
    pub async fn write_response(&mut self, result: Result<Value, RpcError>) -> std::io::Result<()> {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Failed { id, error } => {
                write_json_line(&mut self.writer, &ServerResponse::error(id, error)).await
            }
            Slot::Notification { .. } => Ok(()),
            Slot::Call { id, .. } => {
                let response = match result {
                    Ok(value) => ServerResponse::result(id, value),
                    Err(error) => ServerResponse::error(Some(id), error),
                };
                write_json_line(&mut self.writer, &response).await
            }
            Slot::Batch { .. } | Slot::Idle => {
                warn!("write_response without a pending request slot");
                Ok(())
            }
        }
    }

    /// Write a gathered batch reply array verbatim, with no additional
    /// wrapping. An all-notification batch produced no replies and writes
    /// nothing at all.
    pub async fn write_batch_response(
        &mut self,
        replies: &[Box<RawValue>],
    ) -> std::io::Result<()> {
        if replies.is_empty() {
            return Ok(());
        }
        let len = replies.iter().map(|r| r.get().len() + 1).sum::<usize>() + 1;
        let mut line = Vec::with_capacity(len);
        line.push(b'[');
        for (i, reply) in replies.iter().enumerate() {
            if i > 0 {
                line.push(b',');
            }
            line.extend_from_slice(reply.get().as_bytes());
        }
        line.extend_from_slice(b"]\n");
        self.writer.write_all(&line).await?;
        self.writer.flush().await
    }
}
