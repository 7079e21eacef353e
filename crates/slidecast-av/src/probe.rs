//! FFprobe-based stream probing.
//!
//! Probing never mutates the file and never fails hard: a missing tool,
//! a malformed stream, a non-zero exit, or unparseable output all
//! degrade to `None`. Callers must treat an unknown codec as not
//! hardware-decodable and unknown dimensions as "do not pre-resize".

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::ToolCommand;

/// Immutable snapshot of the first video stream of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Codec name as reported by ffprobe (e.g. "h264", "vp9").
    pub codec_name: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    codec_name: Option<String>,
}

/// Probe the first video stream of `input` using ffprobe at `ffprobe`.
///
/// Returns `None` when the file has no video stream or probing fails
/// for any reason.
pub fn probe_video(ffprobe: &Path, input: &Path, timeout: Option<Duration>) -> Option<ProbeResult> {
    if !input.exists() {
        return None;
    }

    let output = ToolCommand::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,codec_name",
            "-of",
            "json",
        ])
        .arg(input)
        .timeout(timeout)
        .run();

    let output = match output {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!("ffprobe failed for {}: {}", input.display(), e);
            return None;
        }
    };

    if !output.success() {
        tracing::warn!(
            "ffprobe exited with {} for {}: {}",
            output.status,
            input.display(),
            output.stderr.trim()
        );
        return None;
    }

    let result = parse_probe_output(&output.stdout);
    if result.is_none() {
        tracing::debug!("no probeable video stream in {}", input.display());
    }
    result
}

fn parse_probe_output(json: &str) -> Option<ProbeResult> {
    let parsed: FfprobeOutput = serde_json::from_str(json).ok()?;
    let stream = parsed.streams.into_iter().next()?;
    match (stream.width, stream.height, stream.codec_name) {
        (Some(width), Some(height), Some(codec_name)) if width > 0 && height > 0 => {
            Some(ProbeResult {
                width,
                height,
                codec_name,
            })
        }
        _ => None,
    }
}
