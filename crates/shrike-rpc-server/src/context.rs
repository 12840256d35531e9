//! Request-scoped context handed to every method handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

/// Per-request metadata and cancellation, cheap to clone.
///
/// A connection's context flows into every method it dispatches, and the
/// batch dispatcher hands the outer request's context to every inner
/// invocation. The codec never sets the cancellation flag itself;
/// whoever owns the connection does, and closing the stream remains the
/// terminal cancellation primitive.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug, Default)]
struct ContextInner {
    metadata: HashMap<String, Value>,
    cancelled: AtomicBool,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context carrying metadata values.
    pub fn with_metadata(metadata: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                metadata,
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.metadata.get(key)
    }

    /// Flag the request as cancelled. In-flight handlers may observe the
    /// flag and return whatever error they decide.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }
}
