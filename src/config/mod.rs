//! Configuration and policy
//!
//! Sandbox envelope definition, validation, and loading.

pub mod loader;
pub mod profile;
pub mod types;
pub mod validator;
