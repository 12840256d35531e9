//! # JSON-RPC 2.0 stream client
//!
//! Calls `"Service.method"` procedures over a byte stream speaking
//! JSON-RPC 2.0 and correlates framed replies back to their callers.
//!
//! ```rust,ignore
//! let client = Client::connect(socket);
//! let sum: i64 = client.call("Arith.Sum", [3, 5]).await?;
//! client.notify("Log.Line", ["starting up"]).await?;
//! ```
//!
//! Replies may arrive in any order; a pending-call table maps the
//! sequence number each call was written with to its waiter. Closing the
//! connection fails every outstanding call with a shutdown error.

pub mod client;
pub mod config;
pub mod error;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
