pub mod event;
pub mod recorder;

pub use event::{TraceEvent, TraceListener};
pub use recorder::TraceRecorder;
