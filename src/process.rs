// src/process.rs

//! Running external helper tools
//!
//! Helpers are spawned with stdin closed and their output captured. The
//! caller's cancellation token is polled while the child runs; when it
//! fires the child is killed and the call fails with `Error::Cancelled`.
//!
//! stdout and stderr are drained on their own threads for the whole run, so
//! a chatty helper never stalls on a full pipe.

use crate::error::{Error, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// How often a running helper checks for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on a single helper run
pub const DEFAULT_HELPER_TIMEOUT: Duration = Duration::from_secs(300);

/// Run `command` to completion, killing it on cancellation or timeout
pub fn run_helper(
    mut command: Command,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let program = command.get_program().to_string_lossy().into_owned();
    debug!("Executing: {:?}", command);

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::ProcessError(format!("Failed to spawn '{}': {}", program, e)))?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Cancelled);
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::ProcessError(format!(
                "'{}' timed out after {} seconds",
                program,
                timeout.as_secs()
            )));
        }
        if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
            break status;
        }
    };

    // Exited or killed: both pipes reach EOF once the child is gone
    let stdout = collect(stdout);
    let stderr = collect(stderr);
    for line in String::from_utf8_lossy(&stdout).lines() {
        debug!("[{}] {}", program, line);
    }
    let stderr = String::from_utf8_lossy(&stderr);
    for line in stderr.lines() {
        warn!("[{}] {}", program, line);
    }

    if status.success() {
        Ok(())
    } else {
        Err(Error::ProcessError(format!(
            "'{}' failed with exit code {}: {}",
            program,
            status.code().unwrap_or(-1),
            stderr.trim()
        )))
    }
}

/// Read a pipe to EOF on a background thread
fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            debug!("Helper pipe closed early: {}", e);
        }
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
