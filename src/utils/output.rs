/// Bounded output collection
///
/// Each stream is drained on its own thread. Bytes past the ceiling are read
/// and discarded: the pipe is never left full, so the child is neither
/// blocked nor killed by SIGPIPE because of its own output volume.
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::thread;

/// Which end of an oversized stream is kept
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retain {
    /// First `limit` bytes (program output)
    Head,
    /// Last `limit` bytes (error text, whose summary line comes last)
    Tail,
}

/// Collected bytes of one stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedStream {
    pub data: Vec<u8>,
    /// Bytes were dropped after the ceiling was reached
    pub truncated: bool,
    /// Read error that ended collection early, if any
    pub error: Option<String>,
}

impl CapturedStream {
    pub fn into_text(self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes from the `retain` end.
pub fn collect_stream<R: Read>(mut stream: R, limit: usize, retain: Retain) -> CapturedStream {
    let mut kept: VecDeque<u8> = VecDeque::new();
    let mut truncated = false;
    let mut error = None;
    let mut chunk = [0u8; 8192];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => match retain {
                Retain::Head => {
                    let room = limit.saturating_sub(kept.len());
                    if n > room {
                        kept.extend(&chunk[..room]);
                        truncated = true;
                    } else {
                        kept.extend(&chunk[..n]);
                    }
                }
                Retain::Tail => {
                    kept.extend(&chunk[..n]);
                    if kept.len() > limit {
                        let excess = kept.len() - limit;
                        kept.drain(..excess);
                        truncated = true;
                    }
                }
            },
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                error = Some(e.to_string());
                break;
            }
        }
    }

    CapturedStream {
        data: Vec::from(kept),
        truncated,
        error,
    }
}

/// Spawn a collector thread for an optional stream.
pub fn spawn_collector<R>(
    stream: Option<R>,
    limit: usize,
    retain: Retain,
) -> Option<thread::JoinHandle<CapturedStream>>
where
    R: Read + Send + 'static,
{
    stream.map(|stream| thread::spawn(move || collect_stream(stream, limit, retain)))
}

/// Join a collector, degrading a panicked or missing collector to empty output.
pub fn join_collector(handle: Option<thread::JoinHandle<CapturedStream>>) -> CapturedStream {
    match handle {
        Some(handle) => handle.join().unwrap_or_else(|_| CapturedStream {
            error: Some("collector thread panicked".to_string()),
            ..CapturedStream::default()
        }),
        None => CapturedStream::default(),
    }
}
