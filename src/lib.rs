//! snekbox: run untrusted Python snippets inside nsjail
//!
//! Each execution spawns one nsjail process in standalone-once mode, runs the
//! interpreter under a fixed resource envelope, and turns the way it ended
//! into a small, stable classification.
//!
//! # Architecture
//!
//! ## Configuration ([`config`])
//! - [`config::profile`]: The resource-limit profile applied to every run
//! - [`config::validator`]: Startup validation of the profile
//! - [`config::loader`]: JSON file and environment overrides
//! - [`config::types`]: Shared types and the crate error
//!
//! ## Execution ([`exec`])
//! - [`exec::launcher`]: Builds the nsjail command line and captures the raw outcome
//! - [`exec::engine`]: Launch-then-classify facade, safe to share across threads
//! - [`exec::dispatcher`]: Worker pool behind `snekbox serve`
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::classifier`]: Exit code to classification and output text
//!
//! ## Observability ([`observability`])
//! - [`observability::log_parser`]: nsjail diagnostic lines to leveled records
//!
//! ## Kernel ([`kernel`])
//! - [`kernel::cgroup`]: cgroup parent groups created once at startup
//! - [`kernel::signal`]: Async-safe shutdown flag for the serve loop
//!
//! ## Utilities ([`utils`])
//! - [`utils::output`]: Bounded output collection
//!
//! # Example
//!
//! ```no_run
//! use snekbox::config::loader::SnekboxConfig;
//! use snekbox::exec::engine::Snekbox;
//!
//! let engine = Snekbox::new(SnekboxConfig::default())?;
//! let result = engine.execute("print('hello')");
//! println!("{}: {}", result.classification, result.output);
//! # Ok::<(), snekbox::config::types::SnekboxError>(())
//! ```

pub mod cli;
pub mod config;
pub mod exec;
pub mod kernel;
pub mod observability;
pub mod protocol;
pub mod utils;
pub mod verdict;
