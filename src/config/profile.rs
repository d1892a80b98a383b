/// Resource-limit profile: the fixed sandbox envelope applied to every execution
///
/// Pure data. Built once at startup, validated, then shared read-only.
use crate::config::types::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Network exposure inside the sandbox
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum NetworkPolicy {
    /// No interfaces at all, not even loopback
    #[serde(rename = "isolated")]
    Isolated,
    /// Loopback is brought up, nothing else
    #[serde(rename = "loopback_only")]
    LoopbackOnly,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        NetworkPolicy::Isolated
    }
}

/// Filesystem exposure inside the sandbox
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MountPolicy {
    /// Chroot to the host root, mounted read-only
    pub read_only_root: bool,
    /// Host directories bind-mounted read-only
    pub read_only_binds: Vec<PathBuf>,
    /// Hide /proc from the sandboxed program
    pub disable_proc: bool,
}

impl Default for MountPolicy {
    fn default() -> Self {
        Self {
            read_only_root: true,
            read_only_binds: vec![
                PathBuf::from("/usr"),
                PathBuf::from("/lib"),
                PathBuf::from("/lib64"),
            ],
            disable_proc: true,
        }
    }
}

/// Unprivileged identity the payload runs as
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Identity {
    pub user: String,
    pub group: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            user: "nobody".to_string(),
            group: "nogroup".to_string(),
        }
    }
}

/// Where the isolation layer finds its cgroup controllers
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CgroupLayout {
    /// Mount point holding the `memory` and `pids` hierarchies
    pub mount_root: PathBuf,
    /// Parent group created once at startup
    pub parent: String,
}

impl CgroupLayout {
    pub fn memory_mount(&self) -> PathBuf {
        self.mount_root.join("memory")
    }

    pub fn pids_mount(&self) -> PathBuf {
        self.mount_root.join("pids")
    }

    /// Parent group directories, in creation order.
    pub fn parent_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.pids_mount().join(&self.parent),
            self.memory_mount().join(&self.parent),
        ]
    }
}

impl Default for CgroupLayout {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from("/sys/fs/cgroup"),
            parent: "NSJAIL".to_string(),
        }
    }
}

/// The sandbox envelope
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResourceLimitProfile {
    /// cgroup memory ceiling in bytes
    pub memory_limit: u64,
    /// RLIMIT_AS in MiB
    pub address_space_limit_mb: u64,
    /// Wall-clock ceiling in seconds
    pub wall_time_limit_secs: u64,
    /// Max concurrent processes/threads in the sandbox
    pub process_limit: u32,
    /// Per-stream capture ceiling in bytes
    pub max_output_bytes: usize,
    pub mounts: MountPolicy,
    pub network: NetworkPolicy,
    pub identity: Identity,
    pub cgroup: CgroupLayout,
    /// Complete environment of the isolation binary
    pub environment: Vec<(String, String)>,
}

impl Default for ResourceLimitProfile {
    fn default() -> Self {
        Self {
            memory_limit: 52_428_800, // 50 MiB
            address_space_limit_mb: 700,
            wall_time_limit_secs: 2,
            process_limit: 1,
            max_output_bytes: 1024 * 1024,
            mounts: MountPolicy::default(),
            network: NetworkPolicy::default(),
            identity: Identity::default(),
            cgroup: CgroupLayout::default(),
            environment: default_environment(),
        }
    }
}

impl ResourceLimitProfile {
    pub fn wall_time_limit(&self) -> Duration {
        Duration::from_secs(self.wall_time_limit_secs)
    }

    /// Validate and return the profile unchanged, or the first fatal problem.
    pub fn validated(self) -> Result<Self> {
        crate::config::validator::validate_profile(&self)?;
        Ok(self)
    }
}

fn default_environment() -> Vec<(String, String)> {
    [
        (
            "PATH",
            "/usr/local/bin:/usr/local/sbin:/usr/sbin:/usr/bin:/sbin:/bin",
        ),
        ("LANG", "en_US.UTF-8"),
        ("PYTHON_VERSION", "3.6.5"),
        ("PYTHON_PIP_VERSION", "10.0.1"),
        ("PYTHONDONTWRITEBYTECODE", "1"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_envelope() {
        let profile = ResourceLimitProfile::default();
        assert_eq!(profile.memory_limit, 50 * 1024 * 1024);
        assert_eq!(profile.wall_time_limit(), Duration::from_secs(2));
        assert_eq!(profile.process_limit, 1);
        assert_eq!(profile.network, NetworkPolicy::Isolated);
        assert_eq!(profile.identity.user, "nobody");
        assert!(profile.mounts.read_only_root);
        assert!(profile
            .environment
            .iter()
            .any(|(k, v)| k == "PYTHONDONTWRITEBYTECODE" && v == "1"));
    }

    #[test]
    fn test_cgroup_parent_dirs() {
        let layout = CgroupLayout::default();
        assert_eq!(
            layout.parent_dirs(),
            vec![
                PathBuf::from("/sys/fs/cgroup/pids/NSJAIL"),
                PathBuf::from("/sys/fs/cgroup/memory/NSJAIL"),
            ]
        );
    }

    #[test]
    fn test_partial_profile_json_keeps_defaults() {
        let profile: ResourceLimitProfile =
            serde_json::from_str(r#"{"wall_time_limit_secs": 5, "network": "loopback_only"}"#)
                .unwrap();
        assert_eq!(profile.wall_time_limit_secs, 5);
        assert_eq!(profile.network, NetworkPolicy::LoopbackOnly);
        assert_eq!(profile.memory_limit, 52_428_800);
        assert_eq!(profile.mounts, MountPolicy::default());
    }

    #[test]
    fn test_zero_memory_is_rejected() {
        let profile = ResourceLimitProfile {
            memory_limit: 0,
            ..Default::default()
        };
        assert!(profile.validated().is_err());
    }
}
