//! Fan-out of batch arrays through an in-process loopback pipe.
//!
//! A batch is served by writing each element to one end of an in-memory
//! duplex pipe whose other end is a fresh codec serving the same
//! registry. Reply order is guaranteed by reserving a reply slot at
//! dispatch time for every element that carries an id and filling the
//! slots from the pipe in arrival order; the inner codec processes
//! requests serially, so arrival order is request order.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::value::RawValue;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tracing::warn;

use shrike_json_rpc::{JsonReader, ServerRequest};

use crate::context::CallContext;
use crate::dispatch::MethodRegistry;
use crate::serve_conn_with_context;

const PIPE_CAPACITY: usize = 64 * 1024;

const INVALID_REQUEST_REPLY: &str =
    r#"{"id":null,"error":{"code":-32600,"message":"Invalid request"}}"#;

fn canned_invalid_request() -> Box<RawValue> {
    RawValue::from_string(INVALID_REQUEST_REPLY.to_string()).unwrap()
}

/// Boxed so the serve loop can spawn itself for the loopback connection.
fn serve_loopback(
    registry: Arc<MethodRegistry>,
    end: DuplexStream,
    ctx: CallContext,
) -> BoxFuture<'static, std::io::Result<()>> {
    Box::pin(serve_conn_with_context(registry, end, ctx))
}

/// Expand a batch into individual loopback invocations and gather the
/// replies in request order. Elements that do not parse as request
/// envelopes get the canned Invalid Request reply without being invoked;
/// notifications are invoked but contribute no reply.
pub(crate) async fn dispatch(
    registry: &Arc<MethodRegistry>,
    ctx: CallContext,
    elements: Vec<Box<RawValue>>,
) -> Vec<Box<RawValue>> {
    let (client_end, server_end) = tokio::io::duplex(PIPE_CAPACITY);
    tokio::spawn({
        let serve = serve_loopback(registry.clone(), server_end, ctx);
        async move {
            if let Err(err) = serve.await {
                warn!(error = %err, "batch loopback server failed");
            }
        }
    });

    let (pipe_read, mut pipe_write) = tokio::io::split(client_end);

    // None reserves a slot for the next framed reply from the pipe; Some
    // is an already-materialized reply.
    let (slot_tx, mut slot_rx) = mpsc::unbounded_channel::<Option<Box<RawValue>>>();
    let capacity = elements.len();
    let reader = tokio::spawn(async move {
        let mut frames = JsonReader::new(pipe_read);
        let mut replies = Vec::with_capacity(capacity);
        while let Some(slot) = slot_rx.recv().await {
            match slot {
                Some(reply) => replies.push(reply),
                None => {
                    let reply = match frames.next_value().await {
                        Ok(Some(value)) => value,
                        Ok(None) | Err(_) => canned_invalid_request(),
                    };
                    replies.push(reply);
                }
            }
        }
        replies
    });

    for element in &elements {
        match ServerRequest::parse(element) {
            Err(_) => {
                let _ = slot_tx.send(Some(canned_invalid_request()));
            }
            Ok(request) => {
                if !request.is_notification() {
                    let _ = slot_tx.send(None);
                }
                let mut line = element.get().as_bytes().to_vec();
                line.push(b'\n');
                if let Err(err) = pipe_write.write_all(&line).await {
                    warn!(error = %err, "batch loopback write failed");
                    break;
                }
            }
        }
    }
    drop(slot_tx);

    reader.await.unwrap_or_default()
}
