/// nsjail diagnostic log parsing
///
/// nsjail writes one entry per line on its log fd:
///
/// ```text
/// [W][2019-06-22T20:07:00+0000][16] void foo::bar()():100 This is a warning!
/// [I][2019-06-22T20:07:48+0000] pid=20 ([STANDALONE MODE]) exited with status: 2
/// ```
///
/// Info entries carry no pid/location prefix. Every input line yields exactly
/// one record; lines that do not match become a WARNING wrapper so nothing is
/// dropped and nothing stops the stream.
use crate::config::types::{LogLevel, LogRecord, Result, SnekboxError};
use regex::Regex;

/// Target used when records are emitted through `log`
pub const NSJAIL_LOG_TARGET: &str = "snekbox::nsjail";

const LOG_PATTERN: &str = concat!(
    r"^\[(?:",
    r"(?P<info>I)\]\[.+?\]",
    r"|",
    r"(?P<level>[DWEF])\]\[.+?\]\[\d+\] .+?:\d+ ",
    r") ?(?P<msg>.+)$"
);

/// Stateless line parser. Cheap to clone; safe to share across threads.
#[derive(Clone, Debug)]
pub struct LogParser {
    pattern: Regex,
}

impl LogParser {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(LOG_PATTERN)
            .map_err(|e| SnekboxError::Config(format!("invalid log pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    /// Parse a single line.
    pub fn parse_line(&self, line: &str) -> LogRecord {
        let line = line.trim_end_matches(&['\r', '\n'][..]);

        let parsed = self.pattern.captures(line).and_then(|caps| {
            let level = if caps.name("info").is_some() {
                LogLevel::Info
            } else {
                caps.name("level")
                    .and_then(|m| m.as_str().chars().next())
                    .and_then(LogLevel::from_tag)?
            };
            let message = caps.name("msg")?.as_str().to_string();
            Some(LogRecord {
                level,
                message,
                parsed: true,
            })
        });

        parsed.unwrap_or_else(|| LogRecord {
            level: LogLevel::Warning,
            message: format!("Failed to parse log line '{}'", line),
            parsed: false,
        })
    }

    /// Lazily parse a sequence of lines, one record per line.
    ///
    /// The returned iterator is `Clone` whenever the input iterator is, so a
    /// restartable source gives a restartable record stream.
    pub fn parse<I>(&self, lines: I) -> Records<'_, I::IntoIter>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Records {
            parser: self,
            lines: lines.into_iter(),
        }
    }
}

/// Emit a record through the `log` facade under the nsjail target.
pub fn emit(record: &LogRecord) {
    log::log!(target: NSJAIL_LOG_TARGET, record.level.as_log_level(), "{}", record.message);
}

/// Iterator returned by [`LogParser::parse`]
#[derive(Clone, Debug)]
pub struct Records<'a, I> {
    parser: &'a LogParser,
    lines: I,
}

impl<I> Iterator for Records<'_, I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = LogRecord;

    fn next(&mut self) -> Option<LogRecord> {
        self.lines
            .next()
            .map(|line| self.parser.parse_line(line.as_ref()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.lines.size_hint()
    }
}
