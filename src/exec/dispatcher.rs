/// Request dispatch for `snekbox serve`
///
/// Newline-delimited JSON in, newline-delimited JSON out. A fixed pool of
/// workers shares one engine; a single writer owns the output so response
/// lines never interleave.
use crate::config::types::{Result, SnekboxError};
use crate::exec::engine::Snekbox;
use crate::protocol::{SnekRequest, SnekResponse};
use crossbeam_channel::{self, Receiver, RecvTimeoutError, Sender};
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 4;

/// How often intake re-checks the stop condition while idle
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counters for one serve session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Requests handed to a worker
    pub accepted: usize,
    /// Lines skipped as malformed
    pub rejected: usize,
    /// Responses written
    pub responded: usize,
}

pub struct Dispatcher {
    engine: Snekbox,
    workers: usize,
}

impl Dispatcher {
    pub fn new(engine: Snekbox, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(SnekboxError::Config("worker count must be at least 1".to_string()));
        }
        Ok(Self { engine, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Serve until input ends or `stop` returns true. Requests already
    /// accepted always run to completion and are written before returning.
    pub fn serve<R, W, S>(&self, input: R, output: W, stop: S) -> Result<ServeSummary>
    where
        R: BufRead + Send + 'static,
        W: Write + Send,
        S: Fn() -> bool,
    {
        // The reader may stay blocked on input after a stop, so it is not
        // tied to the scope below.
        let lines = spawn_line_reader(input);

        let (job_tx, job_rx) = crossbeam_channel::bounded::<SnekRequest>(self.workers);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<SnekResponse>();
        let engine = &self.engine;

        let (intake, written) = thread::scope(|scope| {
            for _ in 0..self.workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for request in job_rx.iter() {
                        if result_tx.send(engine.handle(&request)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            let writer = scope.spawn(move || write_responses(result_rx, output));
            let intake = intake_loop(&lines, job_tx, &stop);
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "writer panicked")));
            (intake, written)
        });

        let mut summary = intake?;
        summary.responded = written?;
        log::info!(
            "Serve finished: {} accepted, {} rejected, {} responded",
            summary.accepted,
            summary.rejected,
            summary.responded
        );
        Ok(summary)
    }
}

fn spawn_line_reader<R>(input: R) -> Receiver<io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (line_tx, line_rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in input.lines() {
            let failed = line.is_err();
            if line_tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    line_rx
}

/// Parse lines into jobs until input ends or a stop is requested. Owns the
/// job sender: returning closes the queue and lets the workers drain.
fn intake_loop<S>(
    lines: &Receiver<io::Result<String>>,
    job_tx: Sender<SnekRequest>,
    stop: &S,
) -> Result<ServeSummary>
where
    S: Fn() -> bool,
{
    let mut summary = ServeSummary::default();

    loop {
        if stop() {
            log::info!("Stop requested; no longer accepting requests");
            break;
        }

        let line = match lines.recv_timeout(STOP_POLL_INTERVAL) {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => return Err(SnekboxError::Io(e)),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        match SnekRequest::from_json(&line) {
            Ok(request) => {
                if job_tx.send(request).is_err() {
                    return Err(SnekboxError::Process("all workers exited".to_string()));
                }
                summary.accepted += 1;
            }
            Err(e) => {
                log::warn!("Skipping invalid request: {}", e);
                summary.rejected += 1;
            }
        }
    }

    Ok(summary)
}

fn write_responses<W: Write>(results: Receiver<SnekResponse>, mut output: W) -> io::Result<usize> {
    let mut written = 0;
    for response in results.iter() {
        let line = serde_json::to_string(&response)?;
        writeln!(output, "{}", line)?;
        output.flush()?;
        written += 1;
    }
    Ok(written)
}
