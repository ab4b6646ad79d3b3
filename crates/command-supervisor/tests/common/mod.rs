//! Common test utilities

#![allow(dead_code)]

use command_supervisor::{AsyncExecutor, Redirector};
use std::time::Duration;

/// Executor running its per-start argument as a `sh -c` script
pub fn shell() -> AsyncExecutor {
    AsyncExecutor::new("sh").with_base_args(["-c"])
}

/// Create the parent directories of every file redirector
pub fn create_parents<'a>(redirectors: impl IntoIterator<Item = &'a Redirector>) {
    for redirector in redirectors {
        if let Some(dir) = redirector.path().and_then(|p| p.parent()) {
            std::fs::create_dir_all(dir).unwrap();
        }
    }
}

/// Check whether `pid` still refers to a live (or unreaped) process
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;

    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Poll `is_alive` until the process is gone or `limit` elapses
#[cfg(unix)]
pub async fn wait_until_gone(pid: u32, limit: Duration) -> bool {
    let deadline = std::time::Instant::now() + limit;
    while std::time::Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        smol::Timer::after(Duration::from_millis(20)).await;
    }
    !is_alive(pid)
}
