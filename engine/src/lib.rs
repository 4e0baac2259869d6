//! netfanout library
//!
//! Runs batches of console commands against many network devices at once
//! and reports one result per device.

pub mod aggregate;
pub mod batch;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod session;
pub mod storage;
pub mod topology;
pub mod utils;

pub use engine::{BatchEngine, BatchResponse};
pub use models::batch::BatchKind;
