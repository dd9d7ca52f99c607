//! Subscriber setup for the `emu_migrate` binary.
//!
//! Engine events (plan phases, step outcomes, rollback) always go to stderr;
//! stdout is reserved for plan/preview/history output, JSON or text.
//! `<log_file>` adds a second layer in the same format, written off-thread.
//! A log path under a symlinked directory is ignored with a warning.

use anyhow::Result;
use chrono::Local;
use emu_migrate::LogLevel;
use emu_migrate::config::path_has_symlink_ancestor;
use emu_migrate::output as out;
use emu_migrate::platform::open_log_file_secure_append;
use std::fmt as stdfmt;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt as tsfmt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Human-friendly timestamp formatter (DD/MM/YY HH:MM:SS)
struct LocalHumanTime;
impl FormatTime for LocalHumanTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> stdfmt::Result {
        write!(w, "{}", Local::now().format("%d/%m/%y %H:%M:%S"))
    }
}

#[inline]
fn to_level_filter(lvl: LogLevel) -> LevelFilter {
    match lvl {
        LogLevel::Quiet => LevelFilter::ERROR,
        LogLevel::Normal => LevelFilter::INFO,
        LogLevel::Info => LevelFilter::DEBUG,
        LogLevel::Debug => LevelFilter::TRACE,
    }
}

/// One fmt layer in the requested format over `writer`.
fn fmt_layer<W>(writer: W, json: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = tsfmt::layer()
        .with_timer(LocalHumanTime)
        .with_level(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(writer);
    if json {
        base.event_format(tsfmt::format().json().with_timer(LocalHumanTime)).boxed()
    } else {
        base.compact().boxed()
    }
}

/// Try to open a non-blocking file writer for logging:
/// - Refuse if any ancestor is a symlink
/// - Open file for append (0600 on create) and wrap with non_blocking
fn maybe_open_non_blocking_writer(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    match path_has_symlink_ancestor(path) {
        Ok(true) => {
            out::print_warn(&format!(
                "Refusing to enable file logging: ancestor of {} is a symlink",
                path.display()
            ));
            return None;
        }
        Err(e) => {
            out::print_warn(&format!("Error checking log path {} for symlinks: {e}", path.display()));
            return None;
        }
        Ok(false) => {}
    }

    match open_log_file_secure_append(path) {
        Ok(file) => Some(tracing_appender::non_blocking(file)),
        Err(e) => {
            out::print_warn(&format!("Failed to open log file {}: {e}", path.display()));
            None
        }
    }
}

/// Initialize tracing based on LogLevel and format. Returns an optional WorkerGuard
/// if a file appender is created (must be held until shutdown to flush logs).
pub fn init_tracing(lvl: LogLevel, log_file: Option<&Path>, json: bool) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::default().add_directive(to_level_filter(lvl).into());

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(std::io::stderr, json)];
    let mut guard = None;
    if let Some(path) = log_file {
        match maybe_open_non_blocking_writer(path) {
            Some((writer, g)) => {
                layers.push(fmt_layer(writer, json));
                guard = Some(g);
            }
            None => out::print_warn(&format!(
                "Requested file logging to '{}' was not enabled; logs continue on stderr.",
                path.display()
            )),
        }
    }

    tracing_subscriber::registry().with(layers).with(env_filter).try_init()?;
    Ok(guard)
}
