/// Process launcher: one nsjail subprocess per call
///
/// Builds the nsjail command line from a [`ResourceLimitProfile`], runs the
/// interpreter under it, streams nsjail's own log fd through the
/// [`LogParser`], and returns the raw outcome. Time and memory enforcement
/// belong to nsjail; there is no second watchdog here.
use crate::config::profile::{NetworkPolicy, ResourceLimitProfile};
use crate::config::types::{LogRecord, RawOutcome, Result, SnekboxError};
use crate::observability::log_parser::{self, LogParser, NSJAIL_LOG_TARGET};
use crate::utils::output::{join_collector, spawn_collector, Retain};
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::unistd::{close, dup2, pipe2};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

/// Descriptor nsjail writes its diagnostics to inside the child
pub const LOG_FD: RawFd = 3;

/// Output for payloads that cannot be passed as an argument
pub const NULL_BYTE_MESSAGE: &str = "ValueError: embedded null byte";

/// Isolated mode, no `site`, quiet, unbuffered
const PYTHON_FLAGS: [&str; 4] = ["-I", "-S", "-q", "-u"];

/// nsjail wrapper. Holds no per-run state; clone freely across threads.
#[derive(Clone, Debug)]
pub struct NsJail {
    nsjail_binary: PathBuf,
    python_binary: PathBuf,
    parser: LogParser,
}

impl NsJail {
    pub fn new(nsjail_binary: impl Into<PathBuf>, python_binary: impl Into<PathBuf>) -> Result<Self> {
        reserve_log_fd()?;
        Ok(Self {
            nsjail_binary: nsjail_binary.into(),
            python_binary: python_binary.into(),
            parser: LogParser::new()?,
        })
    }

    /// Full argument vector for nsjail, payload last.
    pub fn build_args(&self, profile: &ResourceLimitProfile, code: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-Mo".into()];

        if profile.mounts.read_only_root {
            args.push("--chroot".into());
            args.push("/".into());
        }
        for bind in &profile.mounts.read_only_binds {
            args.push("-R".into());
            args.push(bind.as_os_str().to_os_string());
        }
        if profile.mounts.disable_proc {
            args.push("--disable_proc".into());
        }

        args.push("--user".into());
        args.push(profile.identity.user.clone().into());
        args.push("--group".into());
        args.push(profile.identity.group.clone().into());

        if profile.network == NetworkPolicy::Isolated {
            args.push("--iface_no_lo".into());
        }

        args.push("--time_limit".into());
        args.push(profile.wall_time_limit_secs.to_string().into());
        args.push("--rlimit_as".into());
        args.push(profile.address_space_limit_mb.to_string().into());

        let cgroup = &profile.cgroup;
        args.push("--cgroup_mem_max".into());
        args.push(profile.memory_limit.to_string().into());
        args.push("--cgroup_mem_mount".into());
        args.push(cgroup.memory_mount().into_os_string());
        args.push("--cgroup_mem_parent".into());
        args.push(cgroup.parent.clone().into());
        args.push("--cgroup_pids_max".into());
        args.push(profile.process_limit.to_string().into());
        args.push("--cgroup_pids_mount".into());
        args.push(cgroup.pids_mount().into_os_string());
        args.push("--cgroup_pids_parent".into());
        args.push(cgroup.parent.clone().into());

        for (key, value) in &profile.environment {
            args.push("-E".into());
            args.push(format!("{}={}", key, value).into());
        }

        args.push("--log_fd".into());
        args.push(LOG_FD.to_string().into());
        args.push("--quiet".into());
        args.push("--".into());

        args.push(self.python_binary.as_os_str().to_os_string());
        args.extend(PYTHON_FLAGS.iter().map(OsString::from));
        args.push("-c".into());
        args.push(code.into());

        args
    }

    /// Run `code` once under `profile`, blocking until nsjail exits.
    ///
    /// A payload that cannot be an argument is rejected without spawning.
    /// Failing to start nsjail at all is an `Err`.
    pub fn launch(&self, profile: &ResourceLimitProfile, code: &str) -> Result<RawOutcome> {
        if code.contains('\0') {
            log::info!("Rejecting payload before spawn: embedded null byte");
            return Ok(RawOutcome::rejected(NULL_BYTE_MESSAGE));
        }

        reserve_log_fd()?;
        let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| SnekboxError::Process(format!("pipe2(log): {}", e)))?;
        // SAFETY: both descriptors were just created and are owned by nothing else.
        let log_reader = unsafe { File::from_raw_fd(read_fd) };
        let log_writer = unsafe { File::from_raw_fd(write_fd) };
        let child_log_fd = log_writer.as_raw_fd();

        let mut cmd = Command::new(&self.nsjail_binary);
        cmd.args(self.build_args(profile, code))
            .env_clear()
            .envs(profile.environment.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // SAFETY: the hook only calls dup2/fcntl, both async-signal-safe.
        unsafe {
            cmd.pre_exec(move || install_log_fd(child_log_fd));
        }

        let spawned = cmd.spawn();
        // Parent copy of the write end; the reader sees EOF once nsjail exits.
        drop(log_writer);

        let mut child = spawned.map_err(|e| {
            SnekboxError::Process(format!(
                "failed to spawn {}: {}",
                self.nsjail_binary.display(),
                e
            ))
        })?;
        log::debug!("nsjail started with pid {}", child.id());

        let log_handle = self.spawn_log_reader(log_reader);
        let stdout_handle =
            spawn_collector(child.stdout.take(), profile.max_output_bytes, Retain::Head);
        // The interpreter's error summary is the last stderr line.
        let stderr_handle =
            spawn_collector(child.stderr.take(), profile.max_output_bytes, Retain::Tail);

        let status = child
            .wait()
            .map_err(|e| SnekboxError::Process(format!("wait(nsjail): {}", e)))?;

        let stdout = join_collector(stdout_handle);
        let stderr = join_collector(stderr_handle);
        let diagnostics = log_handle.join().unwrap_or_else(|_| {
            log::warn!(target: NSJAIL_LOG_TARGET, "nsjail log reader panicked");
            Vec::new()
        });

        for (name, stream) in [("stdout", &stdout), ("stderr", &stderr)] {
            if let Some(err) = &stream.error {
                log::warn!("Failed to read {}: {}", name, err);
            }
            if stream.truncated {
                log::warn!(
                    "{} exceeded {} bytes and was truncated",
                    name,
                    profile.max_output_bytes
                );
            }
        }

        Ok(RawOutcome {
            returncode: exit_code(status),
            truncated: stdout.truncated || stderr.truncated,
            stdout: stdout.into_text(),
            stderr: Some(stderr.into_text()),
            diagnostics,
        })
    }

    /// Read nsjail's log fd line by line, surfacing each record as it arrives.
    fn spawn_log_reader(&self, reader: File) -> thread::JoinHandle<Vec<LogRecord>> {
        let parser = self.parser.clone();
        thread::spawn(move || {
            let mut reader = BufReader::new(reader);
            let mut records = Vec::new();
            let mut line = Vec::new();

            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        let record = parser.parse_line(&String::from_utf8_lossy(&line));
                        log_parser::emit(&record);
                        records.push(record);
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::warn!(target: NSJAIL_LOG_TARGET, "Failed to read nsjail log: {}", e);
                        break;
                    }
                }
            }

            records
        })
    }
}

/// Exit code, or `128 + signal` when nsjail itself was killed.
pub fn exit_code(status: ExitStatus) -> Option<i32> {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
}

/// Keep `LOG_FD` occupied in this process.
///
/// The child's `dup2` onto `LOG_FD` replaces whatever is there. If `LOG_FD`
/// were free, std could number one of its own spawn pipes 3 (its exec-error
/// pipe among them) and the child would clobber it. A close-on-exec
/// `/dev/null` parked on `LOG_FD` prevents that. `F_DUPFD_CLOEXEC` takes the
/// lowest free descriptor at or above `LOG_FD`, so a descriptor already
/// living there is never replaced.
pub fn reserve_log_fd() -> Result<()> {
    let null = File::open("/dev/null")?;
    let fd = fcntl(null.as_raw_fd(), FcntlArg::F_DUPFD_CLOEXEC(LOG_FD))
        .map_err(|e| SnekboxError::Process(format!("reserve fd {}: {}", LOG_FD, e)))?;
    if fd == LOG_FD {
        log::debug!("Reserved fd {} for the nsjail log pipe", LOG_FD);
    } else {
        // Already occupied
        close(fd)?;
    }
    Ok(())
}

/// Runs in the forked child: expose the log pipe as `LOG_FD`.
fn install_log_fd(fd: RawFd) -> std::io::Result<()> {
    if fd == LOG_FD {
        // dup2 onto itself would keep O_CLOEXEC
        fcntl(LOG_FD, FcntlArg::F_SETFD(FdFlag::empty()))?;
    } else {
        dup2(fd, LOG_FD)?;
    }
    Ok(())
}
