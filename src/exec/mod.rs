//! Execution control
//!
//! One sandboxed run per call, and the worker pool that feeds the engine.

pub mod dispatcher;
pub mod engine;
pub mod launcher;
