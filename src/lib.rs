//! Timing breakdown of HTTP requests: DNS, connect, TLS, server wait,
//! download and redirects, per hop and for the request as a whole.
#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate tracing;

pub mod error;
pub mod http;
pub mod response;
pub mod timing;
pub mod tls;
pub mod trace;

pub use crate::error::{RequestError, TransportError};
pub use crate::http::{Client, ClientConfig, ProxyPolicy};
pub use crate::response::{request, request_with_client, Response, Stats};
pub use crate::timing::Trace;
pub use crate::trace::{TraceEvent, TraceListener, TraceRecorder};
