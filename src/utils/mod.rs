//! Small shared helpers.

pub mod clock;
pub mod json_path;

pub use clock::{Clock, ManualClock, SystemClock};
pub use json_path::PathMapper;
