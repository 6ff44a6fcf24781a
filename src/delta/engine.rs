// src/delta/engine.rs

//! External diff formats
//!
//! Delta packages may carry `.diff` entries produced by a platform diff
//! tool rather than bsdiff. Those are handed to a [`DiffEngine`].

use crate::error::{Error, Result};
use crate::process::{run_helper, DEFAULT_HELPER_TIMEOUT};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Applies a non-bsdiff patch
pub trait DiffEngine: Send + Sync {
    /// Write the result of patching `old` with `diff` to `out`
    fn apply(&self, old: &Path, diff: &Path, out: &Path) -> Result<()>;

    /// Name for logs
    fn name(&self) -> &str;
}

/// Rejects every `.diff` entry
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedDiffEngine;

impl DiffEngine for UnsupportedDiffEngine {
    fn apply(&self, _old: &Path, diff: &Path, _out: &Path) -> Result<()> {
        Err(Error::DeltaChain(format!(
            "{} needs an external diff helper, none is configured",
            diff.display()
        )))
    }

    fn name(&self) -> &str {
        "unsupported"
    }
}

/// Runs `<program> <old> <diff> <out>`
#[derive(Debug, Clone)]
pub struct CommandDiffEngine {
    program: PathBuf,
    timeout: Duration,
    cancel: CancellationToken,
}

impl CommandDiffEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_HELPER_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl DiffEngine for CommandDiffEngine {
    fn apply(&self, old: &Path, diff: &Path, out: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.arg(old).arg(diff).arg(out);
        // What the helper wrote is checked against the `.shasum` by the caller
        run_helper(command, self.timeout, &self.cancel)
    }

    fn name(&self) -> &str {
        "command"
    }
}
