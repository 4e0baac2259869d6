//! Data models shared across the engine

pub mod batch;
pub mod result;
