//! Pre-resize, scaling, and compatibility-intermediate encode stages.
//!
//! All three are best-effort: failure deletes the partial output, leaves
//! the stage input untouched, and lets the pipeline continue.

use std::ffi::OsString;
use std::fs;
use std::path::Path;

use crate::config::PreResizeConfig;
use crate::transcode::{encode_ok, remove_quiet, stderr_tail, Ffmpeg, StageOutcome};

/// Scale filter that fits a source inside the configured ceilings,
/// preserving aspect ratio and rounding each dimension down to even
/// values (required by yuv420p-family pixel formats). Bicubic keeps this
/// pass fast; the final encode restores quality.
pub(crate) fn pre_resize_filter(max_w: u32, max_h: u32) -> String {
    format!(
        "scale=w='min(iw,trunc({max_w}/2)*2)':h='min(ih,trunc({max_h}/2)*2)':\
         force_original_aspect_ratio=decrease:flags=bicubic"
    )
}

/// High-quality scale filter for a requested percentage; even-rounded
/// like the pre-resize filter but with lanczos resampling.
pub(crate) fn scale_filter(percent: u32) -> String {
    let ratio = percent as f64 / 100.0;
    format!("scale=w='trunc(iw*{ratio}/2)*2':h='trunc(ih*{ratio}/2)*2':flags=lanczos")
}

/// Downsize an oversized source in place.
///
/// Runs only when both ceilings are configured and the probed source
/// exceeds either. The resized file is written to a sibling temp path
/// and renamed over the original, so a crash mid-resize cannot corrupt
/// the source. Failure keeps the original untouched.
pub(crate) fn pre_resize(
    ffmpeg: &Ffmpeg,
    cfg: &PreResizeConfig,
    input: &Path,
    width: u32,
    height: u32,
) -> StageOutcome {
    let (Some(max_w), Some(max_h)) = (
        cfg.max_width.filter(|v| *v > 0),
        cfg.max_height.filter(|v| *v > 0),
    ) else {
        return StageOutcome::Skipped;
    };

    if width <= max_w && height <= max_h {
        return StageOutcome::Skipped;
    }

    tracing::info!(
        "source {}x{} exceeds {}x{}, pre-resizing {}",
        width,
        height,
        max_w,
        max_h,
        input.display()
    );

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "media".to_string());
    let temp = input.with_file_name(format!("{stem}.preresize.mp4"));

    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-vf".into(),
        pre_resize_filter(max_w, max_h).into(),
    ];
    args.extend(cfg.encoder_options.iter().map(OsString::from));
    args.push(temp.clone().into());

    match ffmpeg.run(args) {
        Ok(out) if encode_ok(&out, &temp) => match fs::rename(&temp, input) {
            Ok(()) => {
                tracing::debug!("pre-resize replaced {}", input.display());
                StageOutcome::Completed
            }
            Err(e) => {
                tracing::warn!("pre-resize rename failed: {e}");
                remove_quiet(&temp);
                StageOutcome::Failed
            }
        },
        Ok(out) => {
            tracing::warn!(
                "pre-resize failed ({}): {}",
                out.status,
                stderr_tail(&out.stderr, 500)
            );
            remove_quiet(&temp);
            StageOutcome::Failed
        }
        Err(e) => {
            tracing::warn!("pre-resize could not run ffmpeg: {e}");
            remove_quiet(&temp);
            StageOutcome::Failed
        }
    }
}

/// Scale the working file to `percent` of its dimensions, writing a new
/// high-quality H.264/MP4 intermediate so later stages have a known-good
/// input. The input file is not modified.
pub(crate) fn scale(ffmpeg: &Ffmpeg, percent: u32, input: &Path, output: &Path) -> StageOutcome {
    tracing::info!(
        "scaling {} to {}% as {}",
        input.display(),
        percent,
        output.display()
    );

    let args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-vf".into(),
        scale_filter(percent).into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "fast".into(),
        "-crf".into(),
        "18".into(),
        "-c:a".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.into(),
    ];

    run_to_output(ffmpeg, args, output, "scaling")
}

/// Re-encode a source into a hardware-decodable H.264/MP4 intermediate.
///
/// Near-lossless (CRF 17) at the fastest preset: this file exists only
/// to bridge a codec the accelerator cannot decode and is deleted as
/// soon as the cascade concludes, so size does not matter.
pub(crate) fn compat_intermediate(ffmpeg: &Ffmpeg, input: &Path, output: &Path) -> StageOutcome {
    tracing::info!(
        "building accelerator-decodable intermediate for {}",
        input.display()
    );

    let args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "ultrafast".into(),
        "-crf".into(),
        "17".into(),
        "-c:a".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.into(),
    ];

    run_to_output(ffmpeg, args, output, "intermediate encode")
}

fn run_to_output(
    ffmpeg: &Ffmpeg,
    args: Vec<OsString>,
    output: &Path,
    label: &str,
) -> StageOutcome {
    match ffmpeg.run(args) {
        Ok(out) if encode_ok(&out, output) => StageOutcome::Completed,
        Ok(out) => {
            tracing::warn!(
                "{label} failed ({}): {}",
                out.status,
                stderr_tail(&out.stderr, 500)
            );
            remove_quiet(output);
            StageOutcome::Failed
        }
        Err(e) => {
            tracing::warn!("{label} could not run ffmpeg: {e}");
            remove_quiet(output);
            StageOutcome::Failed
        }
    }
}
