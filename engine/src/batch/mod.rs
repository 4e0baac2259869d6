//! Batch input parsing and validation

pub mod validator;

pub use validator::{validate, RawBatch};
