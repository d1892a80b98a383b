//! Utilities
//!
//! Bounded output collection for the sandboxed subprocess.

pub mod output;
