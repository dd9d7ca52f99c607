//! Fire-and-forget progress reporting.
//!
//! A sink receives human-readable messages. Delivery never fails a step: a
//! panicking sink is caught and logged.

use std::panic::{self, AssertUnwindSafe};
use tracing::{info, warn};

pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _message: &str) {}
}

/// Forwards messages to the `tracing` log at info.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, message: &str) {
        info!(target: "emu_migrate::progress", "{message}");
    }
}

pub(crate) fn emit(sink: &dyn ProgressSink, message: &str) {
    if panic::catch_unwind(AssertUnwindSafe(|| sink.report(message))).is_err() {
        warn!(message, "progress sink panicked; message dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn closures_are_sinks() {
        let seen = Mutex::new(Vec::new());
        let sink = |m: &str| seen.lock().unwrap().push(m.to_string());
        emit(&sink, "Creating backup");
        assert_eq!(seen.lock().unwrap().as_slice(), ["Creating backup"]);
    }

    #[test]
    fn panicking_sink_is_contained() {
        let sink = |m: &str| {
            if !m.is_empty() {
                panic!("ui went away");
            }
        };
        emit(&sink, "hello");
    }
}
