//! The adaptive transcoding pipeline.
//!
//! One [`MediaProcessor`] sequences, per item: probe, optional
//! pre-resize, optional quality-preserving scaling, and the final-encode
//! cascade, while tracking every temporary file it creates so that
//! exactly one artifact remains under the item's canonical name when it
//! returns.

pub(crate) mod cascade;
pub mod processor;
pub(crate) mod stages;

pub use processor::{ItemError, MediaProcessor, ProcessorOptions};

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use slidecast_av::{ToolCommand, ToolOutput};

/// Handle to a resolved ffmpeg binary with the run's timeout applied.
#[derive(Debug, Clone)]
pub(crate) struct Ffmpeg {
    path: PathBuf,
    timeout: Option<Duration>,
}

impl Ffmpeg {
    pub(crate) fn new(path: PathBuf, timeout: Option<Duration>) -> Self {
        Self { path, timeout }
    }

    /// Run ffmpeg with the given arguments, capturing output. A non-zero
    /// exit is reported through [`ToolOutput::status`], not as an error.
    pub(crate) fn run<I, S>(&self, args: I) -> slidecast_av::Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        ToolCommand::new(&self.path)
            .args(args)
            .timeout(self.timeout)
            .run()
    }
}

/// Outcome of an optimization stage. Stage failure is a value, never an
/// error: the pipeline continues with the stage's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageOutcome {
    /// The stage ran and replaced or produced its output.
    Completed,
    /// The stage did not apply to this input.
    Skipped,
    /// The stage ran and failed; its input is untouched.
    Failed,
}

/// An encode attempt succeeded when the engine exited zero AND wrote a
/// non-empty output file.
pub(crate) fn encode_ok(output: &ToolOutput, path: &Path) -> bool {
    output.success() && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Last `n` bytes of captured stderr, aligned to a char boundary, for
/// bounded diagnostics.
pub(crate) fn stderr_tail(s: &str, n: usize) -> &str {
    if s.len() <= n {
        return s;
    }
    let mut idx = s.len() - n;
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    &s[idx..]
}

/// Remove a leftover file, logging (not failing) when removal itself
/// fails.
pub(crate) fn remove_quiet(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_tail_bounds_output() {
        assert_eq!(stderr_tail("short", 500), "short");
        let long = "x".repeat(600);
        assert_eq!(stderr_tail(&long, 500).len(), 500);
    }

    #[test]
    fn stderr_tail_respects_char_boundaries() {
        let s = format!("{}é", "a".repeat(100));
        // Cutting into the middle of the two-byte é must not panic.
        let tail = stderr_tail(&s, 1);
        assert!(tail.ends_with('é'));
    }
}
