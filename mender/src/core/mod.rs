//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and records and return deterministic outputs suitable for tests.

pub mod denylist;
pub mod extract;
pub mod mode;
pub mod normalize;
pub mod plan;
pub mod repair;
pub mod scan;
pub mod types;
