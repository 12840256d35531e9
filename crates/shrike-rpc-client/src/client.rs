//! The client: request writing, response correlation, shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use shrike_json_rpc::error::FrameError;
use shrike_json_rpc::{write_json_line, ClientRequest, ClientResponse, JsonReader, RpcError};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Error every other in-flight call gets when one call's reply failed to
/// decode, so no waiter is left hanging on a consumed response.
const ERR_OTHER_CALL: &str = "some other Call failed to unmarshal Reply";

type Reply = Result<Box<RawValue>, ClientError>;

struct Pending {
    /// Verbatim id text written on the wire for this call.
    id: String,
    tx: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<u64, Pending>>,
    closed: AtomicBool,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn register(&self, seq: u64, id: String, tx: oneshot::Sender<Reply>) {
        self.pending
            .lock()
            .unwrap()
            .insert(seq, Pending { id, tx });
    }

    fn remove(&self, seq: u64) {
        self.pending.lock().unwrap().remove(&seq);
    }

    /// Remove the entry whose wire id matches `id` verbatim.
    fn complete(&self, id: &str) -> Option<Pending> {
        let mut pending = self.pending.lock().unwrap();
        let seq = pending
            .iter()
            .find(|(_, entry)| entry.id == id)
            .map(|(seq, _)| *seq)?;
        pending.remove(&seq)
    }

    fn has_pending(&self) -> bool {
        !self.pending.lock().unwrap().is_empty()
    }

    /// Fail every pending call with `err`.
    fn fail_all(&self, err: ClientError) {
        let drained: Vec<Pending> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            let _ = entry.tx.send(Err(err.clone()));
        }
    }

    /// Fail one arbitrary pending call with `err`.
    fn fail_any(&self, err: ClientError) {
        let entry = {
            let mut pending = self.pending.lock().unwrap();
            let seq = pending.keys().next().copied();
            seq.and_then(|seq| pending.remove(&seq))
        };
        if let Some(entry) = entry {
            let _ = entry.tx.send(Err(err));
        }
    }
}

/// A JSON-RPC client over an established byte stream.
///
/// Calls may be issued concurrently from multiple tasks; replies are
/// correlated by id however they are ordered on the wire.
pub struct Client {
    shared: Arc<Shared>,
    writer: AsyncMutex<Box<dyn AsyncWrite + Send + Unpin>>,
    seq: AtomicU64,
    config: ClientConfig,
    reader: JoinHandle<()>,
}

impl Client {
    pub fn connect<T>(stream: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_config(stream, ClientConfig::default())
    }

    pub fn with_config<T>(stream: T, config: ClientConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let shared = Arc::new(Shared::default());
        let reader = tokio::spawn(read_loop(shared.clone(), read));
        Self {
            shared,
            writer: AsyncMutex::new(Box::new(write)),
            seq: AtomicU64::new(0),
            config,
            reader,
        }
    }

    /// Invoke `method` and wait for its reply.
    ///
    /// `params` must serialize to an array, an object or null; null means
    /// "no params" and is omitted from the wire. Anything else is
    /// rejected locally and nothing is written.
    pub async fn call<P, R>(&self, method: &str, params: P) -> ClientResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = encode_params(&params)?;
        if self.shared.is_closed() {
            return Err(ClientError::Shutdown);
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.register(seq, seq.to_string(), tx);

        let request = ClientRequest {
            method,
            params: params.as_ref(),
            id: Some(seq),
        };
        if let Err(err) = self.write(&request).await {
            self.shared.remove(seq);
            return Err(err);
        }
        debug!(method, seq, "call written");

        let reply = match self.config.call_timeout {
            Some(window) => match tokio::time::timeout(window, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.shared.remove(seq);
                    return Err(ClientError::Timeout);
                }
            },
            None => rx.await,
        };
        let raw = reply.map_err(|_| ClientError::Shutdown)??;

        match serde_json::from_str(raw.get()) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.shared
                    .fail_all(RpcError::internal_error(ERR_OTHER_CALL).into());
                Err(RpcError::internal_error(err.to_string()).into())
            }
        }
    }

    /// Send a notification: id null on the wire, no reply expected.
    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> ClientResult<()> {
        let params = encode_params(&params)?;
        if self.shared.is_closed() {
            return Err(ClientError::Shutdown);
        }
        let request = ClientRequest {
            method,
            params: params.as_ref(),
            id: None,
        };
        self.write(&request).await
    }

    async fn write(&self, request: &ClientRequest<'_>) -> ClientResult<()> {
        let mut writer = self.writer.lock().await;
        write_json_line(&mut *writer, request)
            .await
            .map_err(ClientError::io)
    }

    /// Close the connection. Every pending call resolves with a shutdown
    /// error, and later calls fail immediately.
    pub async fn close(&self) {
        self.shared.close();
        self.reader.abort();
        {
            let mut writer = self.writer.lock().await;
            let _ = tokio::io::AsyncWriteExt::shutdown(&mut *writer).await;
        }
        self.shared.fail_all(ClientError::Shutdown);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shared.close();
        self.reader.abort();
        self.shared.fail_all(ClientError::Shutdown);
    }
}

/// Serialize params and enforce the wire constraint: only arrays,
/// objects or nothing may cross.
fn encode_params<P: Serialize>(params: &P) -> ClientResult<Option<Value>> {
    let value = serde_json::to_value(params)
        .map_err(|err| ClientError::Rpc(RpcError::internal_error(err.to_string())))?;
    match value {
        Value::Null => Ok(None),
        Value::Array(_) | Value::Object(_) => Ok(Some(value)),
        Value::Bool(_) => Err(unsupported("bool")),
        Value::Number(_) => Err(unsupported("number")),
        Value::String(_) => Err(unsupported("string")),
    }
}

fn unsupported(kind: &str) -> ClientError {
    ClientError::Rpc(RpcError::internal_error(format!(
        "unsupported param type: {kind}"
    )))
}

fn bad_response(raw: &RawValue) -> ClientError {
    ClientError::Rpc(RpcError::internal_error(format!(
        "bad response: {}",
        raw.get()
    )))
}

async fn read_loop<R>(shared: Arc<Shared>, read: R)
where
    R: AsyncRead + Unpin,
{
    let mut frames = JsonReader::new(read);
    loop {
        let value = match frames.next_value().await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("stream ended");
                break;
            }
            Err(FrameError::Io(err)) => {
                shared.fail_all(ClientError::io(err));
                break;
            }
            Err(FrameError::Parse(err)) => {
                // fail at least one waiter with the decoder's text; the
                // rest are drained with the shutdown error below
                shared.fail_any(RpcError::internal_error(err.to_string()).into());
                break;
            }
        };

        let response = match ClientResponse::parse(&value) {
            Ok(response) => response,
            Err(_) => {
                warn!(response = value.get(), "bad response");
                shared.fail_all(bad_response(&value));
                break;
            }
        };

        if response.id.is_null() {
            match response.error {
                // a null-id error reports a connection-level failure
                Some(error) => shared.fail_all(error.into()),
                None => shared.fail_all(bad_response(&value)),
            }
            break;
        }

        match shared.complete(response.id.as_str()) {
            Some(entry) => {
                let reply = match (response.error, response.result) {
                    (Some(error), _) => Err(ClientError::Rpc(error)),
                    (None, Some(result)) => Ok(result),
                    // the validator guarantees exactly one of the two
                    (None, None) => Err(bad_response(&value)),
                };
                let _ = entry.tx.send(reply);
            }
            None if shared.has_pending() => {
                warn!(id = response.id.as_str(), "response matches no pending call");
                shared.fail_all(bad_response(&value));
                break;
            }
            None => {
                debug!(id = response.id.as_str(), "ignoring unmatched response");
            }
        }
    }
    shared.close();
    shared.fail_all(ClientError::Shutdown);
}
