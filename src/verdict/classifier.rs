/// Exit classification
///
/// Pure function from a raw outcome to the user-facing result. Each category
/// draws its text from a different source: stdout on success, the last
/// stderr line on an interpreter error, and fixed sentinels wherever the raw
/// text would expose isolation-layer internals.
use crate::config::types::{Classification, ExecutionResult, RawOutcome};
use nix::sys::signal::Signal;

pub const RESOURCE_EXCEEDED_MESSAGE: &str = "timed out or memory limit exceeded";
pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";

/// Shell convention: a child killed by signal N reports 128 + N
pub const SIGNAL_EXIT_BASE: i32 = 128;
const MAX_SIGNAL: i32 = 64;

/// Exit code of an interpreter-level error
pub const RUNTIME_ERROR_CODE: i32 = 1;

/// Codes nsjail reports when its own time or memory enforcement ended the
/// run: 137 is SIGKILL from the time limit or the cgroup OOM killer, 109 is
/// the code older nsjail builds used. A new nsjail release that changes
/// either belongs here.
pub const RESOURCE_EXCEEDED_CODES: [i32; 2] = [137, 109];

/// Exit classifier - pure function over a raw outcome
pub struct ExitClassifier;

impl ExitClassifier {
    /// Classify a raw outcome. Enforcement and signal codes are checked
    /// before the generic non-zero cases.
    pub fn classify(raw: &RawOutcome) -> ExecutionResult {
        let code = match raw.returncode {
            Some(code) => code,
            None => return Self::classify_rejected(raw),
        };

        if code == 0 {
            ExecutionResult::new(Some(code), Classification::Success, raw.stdout.clone())
        } else if Self::is_resource_kill(code) {
            Self::classify_resource_exceeded(code)
        } else if let Some(signal) = Self::fatal_signal(code) {
            Self::classify_signal(code, signal)
        } else if code == RUNTIME_ERROR_CODE {
            Self::classify_runtime_error(raw, code)
        } else {
            Self::classify_unknown(raw, code)
        }
    }

    pub fn is_resource_kill(code: i32) -> bool {
        RESOURCE_EXCEEDED_CODES.contains(&code)
    }

    /// Signal number encoded in an exit code, if it is in the signal range.
    pub fn fatal_signal(code: i32) -> Option<i32> {
        code.checked_sub(SIGNAL_EXIT_BASE)
            .filter(|signal| (1..=MAX_SIGNAL).contains(signal))
    }

    /// Last non-empty line of the interpreter's stderr (its error summary).
    pub fn error_summary(stderr: &str) -> &str {
        stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
    }

    fn classify_rejected(raw: &RawOutcome) -> ExecutionResult {
        ExecutionResult::new(None, Classification::InputRejected, raw.stdout.clone())
    }

    fn classify_resource_exceeded(code: i32) -> ExecutionResult {
        if code != SIGNAL_EXIT_BASE + Signal::SIGKILL as i32 {
            log::debug!("Resource kill reported with legacy nsjail exit code {}", code);
        }
        ExecutionResult::new(
            Some(code),
            Classification::ResourceExceeded,
            RESOURCE_EXCEEDED_MESSAGE,
        )
    }

    fn classify_signal(code: i32, signal: i32) -> ExecutionResult {
        let name = Signal::try_from(signal)
            .map(|s| s.as_str())
            .unwrap_or("unknown signal");
        log::info!("Sandboxed process terminated by {} ({})", name, signal);

        // Whatever was captured before the crash is not returned.
        ExecutionResult::new(Some(code), Classification::SignalTerminated, "")
    }

    fn classify_runtime_error(raw: &RawOutcome, code: i32) -> ExecutionResult {
        let stderr = raw.stderr.as_deref().unwrap_or("");
        ExecutionResult::new(
            Some(code),
            Classification::RuntimeError,
            Self::error_summary(stderr),
        )
    }

    fn classify_unknown(raw: &RawOutcome, code: i32) -> ExecutionResult {
        log::warn!(
            "Unrecognised nsjail exit code {}; if this repeats, check the nsjail version",
            code
        );
        if let Some(stderr) = raw.stderr.as_deref().filter(|s| !s.is_empty()) {
            log::debug!("{}", stderr);
        }
        ExecutionResult::new(Some(code), Classification::UnknownError, UNKNOWN_ERROR_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(code: Option<i32>, stdout: &str, stderr: &str) -> RawOutcome {
        RawOutcome {
            returncode: code,
            stdout: stdout.to_string(),
            stderr: Some(stderr.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_success() {
        let result = ExitClassifier::classify(&raw(Some(0), "test\n", ""));
        assert_eq!(result.classification, Classification::Success);
        assert_eq!(result.returncode, Some(0));
        assert_eq!(result.output, "test\n");
    }

    #[test]
    fn test_classify_runtime_error_uses_last_line() {
        let traceback = "Traceback (most recent call last):\n  File \"<string>\", line 1, in <module>\nZeroDivisionError: division by zero\n\n";
        let result = ExitClassifier::classify(&raw(Some(1), "", traceback));
        assert_eq!(result.classification, Classification::RuntimeError);
        assert_eq!(result.output, "ZeroDivisionError: division by zero");
    }

    #[test]
    fn test_runtime_error_without_stderr() {
        let result = ExitClassifier::classify(&raw(Some(1), "partial", "\n  \n"));
        assert_eq!(result.classification, Classification::RuntimeError);
        assert_eq!(result.output, "");
    }

    #[test]
    fn test_classify_resource_codes() {
        for code in RESOURCE_EXCEEDED_CODES {
            let result = ExitClassifier::classify(&raw(Some(code), "", "internal"));
            assert_eq!(result.classification, Classification::ResourceExceeded);
            assert_eq!(result.output, RESOURCE_EXCEEDED_MESSAGE);
        }
    }

    #[test]
    fn test_sigkill_is_resource_not_signal() {
        let result = ExitClassifier::classify(&raw(Some(137), "", ""));
        assert_eq!(result.classification, Classification::ResourceExceeded);
    }

    #[test]
    fn test_classify_segfault() {
        let result = ExitClassifier::classify(&raw(Some(139), "half written", "Segmentation fault"));
        assert_eq!(result.classification, Classification::SignalTerminated);
        assert_eq!(result.returncode, Some(139));
        assert_eq!(result.output, "");
    }

    #[test]
    fn test_classify_rejected() {
        let result = ExitClassifier::classify(&RawOutcome::rejected("ValueError: embedded null byte"));
        assert_eq!(result.classification, Classification::InputRejected);
        assert_eq!(result.returncode, None);
        assert_eq!(result.output, "ValueError: embedded null byte");
    }

    #[test]
    fn test_unknown_code_hides_stderr() {
        let result = ExitClassifier::classify(&raw(Some(255), "", "[E] clone(): Operation not permitted"));
        assert_eq!(result.classification, Classification::UnknownError);
        assert_eq!(result.returncode, Some(255));
        assert_eq!(result.output, UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn test_signal_range_bounds() {
        assert_eq!(ExitClassifier::fatal_signal(128), None);
        assert_eq!(ExitClassifier::fatal_signal(129), Some(1));
        assert_eq!(ExitClassifier::fatal_signal(192), Some(64));
        assert_eq!(ExitClassifier::fatal_signal(193), None);
        assert_eq!(ExitClassifier::fatal_signal(2), None);
    }

    #[test]
    fn test_extreme_codes_are_unknown() {
        for code in [i32::MIN, i32::MIN + 1, -1, i32::MAX] {
            assert_eq!(ExitClassifier::fatal_signal(code), None);
            let result = ExitClassifier::classify(&raw(Some(code), "", ""));
            assert_eq!(result.classification, Classification::UnknownError);
            assert_eq!(result.returncode, Some(code));
        }
    }

    #[test]
    fn test_just_above_signal_range_is_unknown() {
        let result = ExitClassifier::classify(&raw(Some(200), "", ""));
        assert_eq!(result.classification, Classification::UnknownError);
    }
}
