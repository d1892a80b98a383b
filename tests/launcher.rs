//! Launcher and engine tests against a stand-in isolation binary
//!
//! A small shell script plays nsjail: it writes diagnostics to fd 3 and then
//! behaves according to `FAKE_MODE`, which reaches it through the profile
//! environment like any other sandbox variable.

use snekbox::config::loader::SnekboxConfig;
use snekbox::config::profile::ResourceLimitProfile;
use snekbox::config::types::{Classification, LogLevel};
use snekbox::exec::engine::Snekbox;
use snekbox::exec::launcher::NsJail;
use snekbox::verdict::classifier::{RESOURCE_EXCEEDED_MESSAGE, UNKNOWN_ERROR_MESSAGE};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// Serialises script creation and execution; a concurrent fork can hold the
// script open for writing and make exec fail with ETXTBSY.
static LAUNCHER_TEST_LOCK: Mutex<()> = Mutex::new(());

const FAKE_NSJAIL: &str = r#"#!/bin/sh
echo "[I][2019-06-22T20:07:48+0000] Mode: STANDALONE_ONCE" >&3
echo "[W][2019-06-22T20:07:48+0000][7] void cmdline::logParams()():250 Process limit is low" >&3
echo "not an nsjail line" >&3
case "$FAKE_MODE" in
  success)
    printf 'test\n'
    ;;
  error)
    printf 'Traceback (most recent call last):\n  File "<string>", line 1, in <module>\nNameError: name '"'"'x'"'"' is not defined\n' >&2
    exit 1
    ;;
  timeout)
    exit 137
    ;;
  legacy)
    exit 109
    ;;
  segv)
    printf 'partial output\n'
    exit 139
    ;;
  unknown)
    echo "[E] clone(flags=CLONE_NEWUSER) failed" >&2
    exit 255
    ;;
  terminated)
    kill -TERM $$
    ;;
  flood)
    head -c 100000 /dev/zero | tr '\000' 'x'
    ;;
  stderrflood)
    head -c 4000 /dev/zero | tr '\000' 'x' >&2
    printf '\nTraceback (most recent call last):\nNameError: boom\n' >&2
    exit 1
    ;;
  lastarg)
    for arg in "$@"; do last="$arg"; done
    printf '%s' "$last"
    ;;
esac
"#;

fn write_fake_nsjail(dir: &Path) -> PathBuf {
    let path = dir.join("nsjail");
    fs::write(&path, FAKE_NSJAIL).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn profile(mode: &str) -> ResourceLimitProfile {
    let mut profile = ResourceLimitProfile::default();
    profile
        .environment
        .push(("FAKE_MODE".to_string(), mode.to_string()));
    profile
}

fn engine(dir: &Path, mode: &str) -> Snekbox {
    Snekbox::new(SnekboxConfig {
        nsjail_binary: write_fake_nsjail(dir),
        python_binary: PathBuf::from("/usr/bin/python3"),
        profile: profile(mode),
    })
    .unwrap()
}

#[test]
fn test_success_returns_stdout() {
    let _lock = LAUNCHER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();

    let result = engine(dir.path(), "success").execute("print('test')");
    assert_eq!(result.classification, Classification::Success);
    assert_eq!(result.returncode, Some(0));
    assert_eq!(result.output, "test\n");
}

#[test]
fn test_runtime_error_returns_last_stderr_line() {
    let _lock = LAUNCHER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();

    let result = engine(dir.path(), "error").execute("x");
    assert_eq!(result.classification, Classification::RuntimeError);
    assert_eq!(result.returncode, Some(1));
    assert_eq!(result.output, "NameError: name 'x' is not defined");
}

#[test]
fn test_resource_codes_hide_internal_output() {
    let _lock = LAUNCHER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();

    for (mode, code) in [("timeout", 137), ("legacy", 109)] {
        let result = engine(dir.path(), mode).execute("while True: pass");
        assert_eq!(result.classification, Classification::ResourceExceeded);
        assert_eq!(result.returncode, Some(code));
        assert_eq!(result.output, RESOURCE_EXCEEDED_MESSAGE);
    }
}

#[test]
fn test_segfault_discards_output() {
    let _lock = LAUNCHER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();

    let result = engine(dir.path(), "segv").execute("import ctypes; ctypes.string_at(0)");
    assert_eq!(result.classification, Classification::SignalTerminated);
    assert_eq!(result.returncode, Some(139));
    assert_eq!(result.output, "");
}

#[test]
fn test_isolation_binary_killed_by_signal() {
    let _lock = LAUNCHER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();

    let result = engine(dir.path(), "terminated").execute("pass");
    assert_eq!(result.classification, Classification::SignalTerminated);
    assert_eq!(result.returncode, Some(128 + libc::SIGTERM));
}

#[test]
fn test_unknown_code_is_sanitised() {
    let _lock = LAUNCHER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();

    let result = engine(dir.path(), "unknown").execute("pass");
    assert_eq!(result.classification, Classification::UnknownError);
    assert_eq!(result.returncode, Some(255));
    assert_eq!(result.output, UNKNOWN_ERROR_MESSAGE);
}

#[test]
fn test_payload_arrives_as_one_argument() {
    let _lock = LAUNCHER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();

    let code = "import os\nprint(\"a b\" , '$HOME')  # -- --quiet";
    let result = engine(dir.path(), "lastarg").execute(code);
    assert_eq!(result.classification, Classification::Success);
    assert_eq!(result.output, code);
}

#[test]
fn test_diagnostics_are_parsed_from_log_fd() {
    let _lock = LAUNCHER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();

    let jail = NsJail::new(write_fake_nsjail(dir.path()), "/usr/bin/python3").unwrap();
    let raw = jail.launch(&profile("success"), "print('test')").unwrap();

    assert_eq!(raw.returncode, Some(0));
    assert_eq!(raw.diagnostics.len(), 3);
    assert_eq!(raw.diagnostics[0].level, LogLevel::Info);
    assert_eq!(raw.diagnostics[0].message, "Mode: STANDALONE_ONCE");
    assert_eq!(raw.diagnostics[1].level, LogLevel::Warning);
    assert_eq!(raw.diagnostics[1].message, "Process limit is low");
    assert!(!raw.diagnostics[2].parsed);
    assert_eq!(
        raw.diagnostics[2].message,
        "Failed to parse log line 'not an nsjail line'"
    );
}

#[test]
fn test_output_flood_is_truncated() {
    let _lock = LAUNCHER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();

    let mut profile = profile("flood");
    profile.max_output_bytes = 1024;
    let jail = NsJail::new(write_fake_nsjail(dir.path()), "/usr/bin/python3").unwrap();
    let raw = jail.launch(&profile, "print('x' * 10**5)").unwrap();

    assert_eq!(raw.returncode, Some(0));
    assert!(raw.truncated);
    assert_eq!(raw.stdout.len(), 1024);
    assert!(raw.stdout.chars().all(|c| c == 'x'));
}

#[test]
fn test_error_summary_survives_stderr_flood() {
    let _lock = LAUNCHER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();

    let mut profile = profile("stderrflood");
    profile.max_output_bytes = 1024;
    let engine = Snekbox::new(SnekboxConfig {
        nsjail_binary: write_fake_nsjail(dir.path()),
        python_binary: PathBuf::from("/usr/bin/python3"),
        profile,
    })
    .unwrap();

    let result = engine.execute("import sys; sys.stderr.write('x' * 4000); raise NameError('boom')");
    assert_eq!(result.classification, Classification::RuntimeError);
    assert_eq!(result.returncode, Some(1));
    assert_eq!(result.output, "NameError: boom");
}

#[test]
fn test_concurrent_executions_share_one_engine() {
    let _lock = LAUNCHER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), "success");

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| engine.execute("print('test')")))
            .collect();
        for handle in handles {
            let result = handle.join().unwrap();
            assert_eq!(result.classification, Classification::Success);
            assert_eq!(result.output, "test\n");
        }
    });
}
