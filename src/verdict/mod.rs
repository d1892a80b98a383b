//! Exit classification
//!
//! Maps raw subprocess outcomes to user-facing results as a pure function.

pub mod classifier;
