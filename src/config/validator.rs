// Profile validation
// Startup validation: an invalid envelope fails fast with actionable errors,
// suspicious-but-legal values only produce warnings.

use crate::config::profile::ResourceLimitProfile;
use crate::config::types::{Result, SnekboxError};
use std::path::Path;

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Collect every problem with a profile without failing.
pub fn check_profile(profile: &ResourceLimitProfile) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_limits(profile, &mut result);
    validate_mounts(profile, &mut result);
    validate_identity(profile, &mut result);
    validate_environment(profile, &mut result);

    result
}

/// Validate a profile at startup; errors are fatal, warnings are logged.
pub fn validate_profile(profile: &ResourceLimitProfile) -> Result<()> {
    let result = check_profile(profile);

    for warning in &result.warnings {
        log::warn!("profile: {}", warning);
    }

    if !result.is_valid() {
        return Err(SnekboxError::Config(format!(
            "invalid resource-limit profile:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(())
}

fn validate_limits(profile: &ResourceLimitProfile, result: &mut ValidationResult) {
    if profile.memory_limit == 0 {
        result.add_error("memory_limit cannot be zero".to_string());
    } else if profile.memory_limit < 1024 * 1024 {
        result.add_warning(format!(
            "memory_limit {} is very low (< 1MB), the interpreter may not start",
            profile.memory_limit
        ));
    }

    if profile.address_space_limit_mb == 0 {
        result.add_error("address_space_limit_mb cannot be zero".to_string());
    }

    if profile.wall_time_limit_secs == 0 {
        result.add_error("wall_time_limit_secs cannot be zero".to_string());
    }

    if profile.process_limit == 0 {
        result.add_error("process_limit cannot be zero".to_string());
    }

    if profile.max_output_bytes == 0 {
        result.add_error("max_output_bytes cannot be zero".to_string());
    }
}

fn validate_mounts(profile: &ResourceLimitProfile, result: &mut ValidationResult) {
    for bind in &profile.mounts.read_only_binds {
        if !bind.is_absolute() {
            result.add_error(format!("read-only bind must be absolute path: {:?}", bind));
        } else if !bind.exists() {
            result.add_warning(format!("read-only bind does not exist: {:?}", bind));
        }
    }

    if !profile.cgroup.mount_root.is_absolute() {
        result.add_error(format!(
            "cgroup mount_root must be absolute path: {:?}",
            profile.cgroup.mount_root
        ));
    }

    let parent = Path::new(&profile.cgroup.parent);
    if profile.cgroup.parent.is_empty() || parent.components().count() != 1 || parent.is_absolute()
    {
        result.add_error(format!(
            "cgroup parent must be a single path component: {:?}",
            profile.cgroup.parent
        ));
    }
}

fn validate_identity(profile: &ResourceLimitProfile, result: &mut ValidationResult) {
    if profile.identity.user.trim().is_empty() {
        result.add_error("identity user cannot be empty".to_string());
    }
    if profile.identity.group.trim().is_empty() {
        result.add_error("identity group cannot be empty".to_string());
    }
    if profile.identity.user == "root" || profile.identity.user == "0" {
        result.add_error("identity user cannot be root for untrusted payloads".to_string());
    }
}

fn validate_environment(profile: &ResourceLimitProfile, result: &mut ValidationResult) {
    for (key, value) in &profile.environment {
        if key.is_empty() || key.contains('=') || key.contains('\0') || value.contains('\0') {
            result.add_error(format!("invalid environment entry: {:?}", key));
        }
    }
    if !profile.environment.iter().any(|(key, _)| key == "PATH") {
        result.add_warning("environment has no PATH".to_string());
    }
}
