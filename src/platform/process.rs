//! Bounded external process execution.
//!
//! The child is polled with `try_wait` until it exits or the deadline passes;
//! on timeout it is killed and reaped. Output pipes are drained on helper
//! threads so a chatty child cannot block on a full pipe.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("'{program}' did not finish within {} seconds", .timeout.as_secs_f32())]
    TimedOut { program: String, timeout: Duration },
    #[error("waiting for '{program}' failed: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut p| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = p.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn kill_and_reap(child: &mut Child, program: &str) {
    if let Err(e) = child.kill() {
        warn!(program, error = %e, "failed to kill timed-out process");
    }
    let _ = child.wait();
}

/// Run `cmd` to completion, or kill it once `timeout` elapses.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<ProcessOutput, ProcessError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    let out = drain(child.stdout.take());
    let err = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                kill_and_reap(&mut child, &program);
                // Readers finish once the pipes close; grandchildren may keep
                // them open, so the output is abandoned rather than joined.
                drop((out, err));
                return Err(ProcessError::TimedOut { program, timeout });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                kill_and_reap(&mut child, &program);
                return Err(ProcessError::Wait { program, source });
            }
        }
    };

    let output = ProcessOutput {
        status,
        stdout: collect(out),
        stderr: collect(err),
    };
    debug!(program, status = %output.status, "External process finished");
    Ok(output)
}
