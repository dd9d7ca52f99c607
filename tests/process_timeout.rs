#![cfg(unix)]

use std::process::Command;
use std::time::{Duration, Instant};

use emu_migrate::platform::{ProcessError, run_with_timeout};

#[test]
fn slow_command_is_killed_at_deadline() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let started = Instant::now();
    let err = run_with_timeout(cmd, Duration::from_millis(200)).unwrap_err();
    assert!(matches!(err, ProcessError::TimedOut { .. }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(err.to_string().contains("did not finish"));
}

#[test]
fn fast_command_returns_output() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "printf ok"]);
    let out = run_with_timeout(cmd, Duration::from_secs(5)).unwrap();
    assert!(out.status.success());
    assert_eq!(out.stdout, "ok");
}
