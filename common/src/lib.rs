pub mod logger;
pub mod time;

pub use logger::init::init_logger;
pub use logger::trace_id::TraceId;
pub use time::now_ms;
