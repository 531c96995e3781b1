pub mod request;
pub mod res;
pub mod stats;

pub use request::{request, request_with_client};
pub use res::Response;
pub use stats::Stats;
