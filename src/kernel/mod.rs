//! Thin wrappers around Linux kernel facilities the service touches directly.
//!
//! Per-run isolation belongs to nsjail; this module only prepares what nsjail
//! expects to exist and handles process signals.

pub mod cgroup;
pub mod signal;
