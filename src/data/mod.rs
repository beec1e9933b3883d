pub mod buffer;
pub mod record;

pub use buffer::{BufferError, RollingBuffer};
pub use record::{parse_time_value, Record, TimeParseError, TimeWindow};
