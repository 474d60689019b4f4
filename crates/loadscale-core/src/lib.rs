pub mod config;
pub mod duration;
pub mod types;

pub use config::LoadscaleConfig;
pub use duration::{DurationError, format_duration, parse_duration};
pub use types::*;
