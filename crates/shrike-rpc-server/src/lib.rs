//! # JSON-RPC 2.0 stream server
//!
//! Serves registered `"Service.method"` procedures over a byte stream
//! speaking JSON-RPC 2.0: single requests, notifications (no reply) and
//! batch arrays (replied to with an array in request order, notifications
//! omitted).
//!
//! ```rust,ignore
//! let mut registry = MethodRegistry::new();
//! registry.register("Arith.Sum", |_ctx, terms: [i64; 2]| async move {
//!     Ok(terms[0] + terms[1])
//! });
//! serve_conn(Arc::new(registry), socket).await?;
//! ```
//!
//! Protocol-level failures (malformed JSON, invalid envelopes, unknown
//! methods, bad params) become error responses on the wire; only
//! transport failures end a connection.

pub mod batch;
pub mod codec;
pub mod context;
pub mod dispatch;

pub use codec::{RequestHeader, ServerCodec};
pub use context::CallContext;
pub use dispatch::{Method, MethodRegistry};

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Internal method name a batch array is dispatched under. Not
/// registered: a wire request naming it directly gets Method Not Found.
pub const BATCH_METHOD: &str = "JSONRPC1.Batch";

/// Serve a single connection to completion. End of stream is ordinary
/// termination and returns `Ok`.
pub async fn serve_conn<T>(registry: Arc<MethodRegistry>, conn: T) -> std::io::Result<()>
where
    T: AsyncRead + AsyncWrite + Send,
{
    serve_conn_with_context(registry, conn, CallContext::new()).await
}

/// Serve a single connection, handing `ctx` to every dispatched method.
pub async fn serve_conn_with_context<T>(
    registry: Arc<MethodRegistry>,
    conn: T,
    ctx: CallContext,
) -> std::io::Result<()>
where
    T: AsyncRead + AsyncWrite + Send,
{
    let (read, write) = tokio::io::split(conn);
    let mut codec = ServerCodec::with_context(read, write, ctx);
    serve_codec(&registry, &mut codec).await
}

/// Drive one codec: header, body, dispatch, response, until end of
/// stream. One request is in flight at a time; batch expansion happens
/// behind the synthetic batch call and does not break that invariant.
pub async fn serve_codec<R, W>(
    registry: &Arc<MethodRegistry>,
    codec: &mut ServerCodec<R, W>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    while let Some(header) = codec.read_header().await? {
        if let Some(elements) = codec.take_batch_elements() {
            let replies = batch::dispatch(registry, codec.context().clone(), elements).await;
            codec.write_batch_response(&replies).await?;
            continue;
        }
        let params = codec.read_body();
        let result = registry
            .dispatch(codec.context().clone(), &header.method, params.as_deref())
            .await;
        codec.write_response(result).await?;
    }
    debug!("connection closed");
    Ok(())
}
