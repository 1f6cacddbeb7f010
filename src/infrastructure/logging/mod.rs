//! Logging initialization.

mod logger;

pub use logger::init_logging;
