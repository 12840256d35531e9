//! Client configuration.

use std::time::Duration;

/// Tunables for a [`Client`](crate::Client).
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Fail a call that has not seen its response within this window.
    /// `None` waits indefinitely. A timed-out call is dropped from the
    /// pending table, so a reply arriving after the window is handled
    /// like any other uncorrelated response.
    pub call_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn with_call_timeout(timeout: Duration) -> Self {
        Self {
            call_timeout: Some(timeout),
        }
    }
}
