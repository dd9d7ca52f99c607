use owo_colors::OwoColorize;
use serde::Serialize;

use crate::history::PlanStatus;
use crate::preview::RiskLevel;

/// Small wrapper around stdout/stderr printing to provide consistent, colored
/// user-facing messages. Colors are enabled only when output is a TTY.
fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

pub fn print_info(msg: &str) {
    if is_tty() {
        println!("{} {}", "info:".cyan().bold(), msg);
    } else {
        println!("info: {msg}");
    }
}

pub fn print_warn(msg: &str) {
    if atty::is(atty::Stream::Stderr) {
        eprintln!("{} {}", "warn:".yellow().bold(), msg);
    } else {
        eprintln!("warn: {msg}");
    }
}

pub fn print_error(msg: &str) {
    if atty::is(atty::Stream::Stderr) {
        eprintln!("{} {}", "error:".red().bold(), msg);
    } else {
        eprintln!("error: {msg}");
    }
}

pub fn print_success(msg: &str) {
    if is_tty() {
        println!("{} {}", "ok:".green().bold(), msg);
    } else {
        println!("ok: {msg}");
    }
}

/// Print a plain user-facing line (no prefix), for output users may script against.
pub fn print_user(msg: &str) {
    println!("{msg}");
}

/// Pretty JSON on stdout (for `--json`).
pub fn print_json<T: Serialize>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Plan status, colored when stdout is a terminal.
pub fn status_label(status: PlanStatus) -> String {
    if !is_tty() {
        return status.to_string();
    }
    match status {
        PlanStatus::Completed => status.green().to_string(),
        PlanStatus::Failed => status.red().to_string(),
        PlanStatus::RolledBack => status.yellow().to_string(),
        PlanStatus::Pending => status.dimmed().to_string(),
    }
}

pub fn risk_label(risk: RiskLevel) -> String {
    let text = match risk {
        RiskLevel::Low => "low",
        RiskLevel::Medium => "medium",
        RiskLevel::High => "high",
    };
    if !is_tty() {
        return text.to_string();
    }
    match risk {
        RiskLevel::Low => text.green().to_string(),
        RiskLevel::Medium => text.yellow().to_string(),
        RiskLevel::High => text.red().bold().to_string(),
    }
}
