#![forbid(unsafe_code)]

pub mod matcher;
pub mod model;
pub mod rotation;
pub mod time;

pub use time::Clock;
