//! Observability
//!
//! Turns the isolation layer's own diagnostic stream into leveled log records.

pub mod log_parser;
