/// Configuration loading: JSON file, then environment, then CLI flags
use crate::config::profile::ResourceLimitProfile;
use crate::config::types::{Result, SnekboxError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the isolation binary path
pub const SNEKBOX_NSJAIL: &str = "SNEKBOX_NSJAIL";
/// Overrides the interpreter path
pub const SNEKBOX_PYTHON: &str = "SNEKBOX_PYTHON";

/// Full configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnekboxConfig {
    /// Isolation binary, resolved through PATH if bare
    pub nsjail_binary: PathBuf,
    /// Interpreter executed inside the sandbox
    pub python_binary: PathBuf,
    /// Sandbox envelope
    pub profile: ResourceLimitProfile,
}

impl Default for SnekboxConfig {
    fn default() -> Self {
        Self {
            nsjail_binary: PathBuf::from("nsjail"),
            python_binary: PathBuf::from("/usr/bin/python3"),
            profile: ResourceLimitProfile::default(),
        }
    }
}

impl SnekboxConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SnekboxError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            SnekboxError::Config(format!("Failed to parse config JSON {}: {}", path.display(), e))
        })
    }

    /// File (if any) then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(nsjail) = lookup(SNEKBOX_NSJAIL).filter(|v| !v.trim().is_empty()) {
            log::debug!("{} overrides nsjail binary: {}", SNEKBOX_NSJAIL, nsjail);
            self.nsjail_binary = PathBuf::from(nsjail);
        }
        if let Some(python) = lookup(SNEKBOX_PYTHON).filter(|v| !v.trim().is_empty()) {
            log::debug!("{} overrides python binary: {}", SNEKBOX_PYTHON, python);
            self.python_binary = PathBuf::from(python);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_env_overrides() {
        let mut config = SnekboxConfig::default();
        config.apply_env_overrides(|key| match key {
            SNEKBOX_NSJAIL => Some("/opt/nsjail/bin/nsjail".to_string()),
            SNEKBOX_PYTHON => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(config.nsjail_binary, PathBuf::from("/opt/nsjail/bin/nsjail"));
        assert_eq!(config.python_binary, PathBuf::from("/usr/bin/python3"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"python_binary": "/usr/local/bin/python3.11", "profile": {{"process_limit": 4}}}}"#
        )
        .unwrap();

        let config = SnekboxConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.python_binary, PathBuf::from("/usr/local/bin/python3.11"));
        assert_eq!(config.nsjail_binary, PathBuf::from("nsjail"));
        assert_eq!(config.profile.process_limit, 4);
        assert_eq!(config.profile.wall_time_limit_secs, 2);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = SnekboxConfig::load_from_file("/nonexistent/snekbox.json").unwrap_err();
        assert!(matches!(err, SnekboxError::Config(_)));
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        assert!(SnekboxConfig::load_from_file(file.path()).is_err());
    }
}
