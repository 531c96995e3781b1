pub mod client;
pub mod pool;
pub mod proxy;
pub mod redirect;
pub mod resolver;
pub mod timing_connector;
pub mod traced_io;

pub use client::{Client, ClientConfig, ResponseBody, DEFAULT_MAX_REDIRECTS};
pub use proxy::ProxyPolicy;
