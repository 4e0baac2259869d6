//! Concurrent fan-out of command groups to device sessions

pub mod dispatcher;

pub use dispatcher::{ConcurrencyPolicy, DispatchOptions, Dispatcher};
