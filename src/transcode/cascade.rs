//! The final-encode cascade: decides whether an encode is required and,
//! if so, walks an ordered set of strategies until one produces the
//! canonical output.
//!
//! The fallback policy is an explicit state machine ([`CascadeState`]
//! plus [`next_action`]) rather than nested branching:
//!
//! direct accelerated pipeline → compatibility intermediate →
//! accelerated-from-intermediate → pure software.
//!
//! A failed direct attempt always proceeds to building the intermediate,
//! even when the failure was unrelated to decode compatibility. That can
//! waste one intermediate encode after a transient failure, but it keeps
//! the recovery path single-shaped and predictable.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{TargetFormat, TranscodeConfig};
use crate::transcode::{encode_ok, remove_quiet, stages, stderr_tail, Ffmpeg, StageOutcome};

/// Codecs known to be decodable by common VAAPI drivers. MPEG-4 Part 2
/// is intentionally omitted; it often fails VAAPI init.
const VAAPI_DECODABLE_CODECS: &[&str] = &["h264", "hevc", "vp9", "av1", "mpeg2video", "vc1"];

const VAAPI_DEVICE_NAME: &str = "va";

pub(crate) fn is_accel_decodable(codec: &str) -> bool {
    VAAPI_DECODABLE_CODECS.contains(&codec)
}

/// What the run's configuration and the current source allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Caps {
    /// The source codec can be decoded by the accelerator.
    pub accel_decode: bool,
    /// The target codec has an accelerated encode profile.
    pub accel_encode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CascadeState {
    NotStarted,
    DirectAccelTried,
    IntermediateBuilt,
    IntermediateFailed,
    AccelFromIntermediateTried,
    SoftwareFallbackTried,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    TryDirect,
    BuildIntermediate,
    TryAccelFromIntermediate,
    TrySoftware,
}

/// Single transition function for the cascade. States are entered on
/// attempt *failure*; the driver short-circuits on the first success.
/// `None` means the cascade is exhausted.
pub(crate) fn next_action(state: CascadeState, caps: Caps) -> Option<Action> {
    match state {
        CascadeState::NotStarted => {
            if caps.accel_encode && caps.accel_decode {
                Some(Action::TryDirect)
            } else if caps.accel_encode {
                Some(Action::BuildIntermediate)
            } else {
                Some(Action::TrySoftware)
            }
        }
        CascadeState::DirectAccelTried => Some(Action::BuildIntermediate),
        CascadeState::IntermediateBuilt => Some(Action::TryAccelFromIntermediate),
        CascadeState::IntermediateFailed => Some(Action::TrySoftware),
        CascadeState::AccelFromIntermediateTried => Some(Action::TrySoftware),
        CascadeState::SoftwareFallbackTried => None,
    }
}

/// Whether an encode is required at all, with human-readable reasons.
///
/// Required when the current codec/container pair is not in the
/// preferred set, or when the caller explicitly requested a codec that
/// differs from the current codec or container. A requested codec
/// missing from the format map can never match the current container,
/// so it forces an encode toward the effective target.
pub(crate) fn encode_required(
    cfg: &TranscodeConfig,
    requested: Option<&str>,
    codec: Option<&str>,
    ext: &str,
) -> (bool, Vec<String>) {
    let mut reasons = Vec::new();

    let preferred = match (cfg.preferred_formats.get(ext), codec) {
        (Some(codecs), Some(c)) => codecs.iter().any(|p| p == c),
        _ => false,
    };
    if !preferred {
        reasons.push("format not preferred".to_string());
    }

    if let Some(req) = requested {
        let req_ext = cfg
            .format_map
            .get(req)
            .map(|f| f.ext.as_str())
            .unwrap_or(".err");
        if Some(req) != codec || req_ext != ext {
            reasons.push(format!("explicit change to {req}"));
        }
    }

    (!reasons.is_empty(), reasons)
}

/// Record of one cascade step; drives diagnostics only.
#[derive(Debug, Clone)]
pub(crate) struct EncodeAttempt {
    pub label: &'static str,
    pub input: PathBuf,
    pub accel_decode: bool,
    pub accel_encode: bool,
    pub succeeded: bool,
}

#[derive(Debug)]
pub(crate) struct CascadeResult {
    pub success: bool,
    pub attempts: Vec<EncodeAttempt>,
}

pub(crate) struct CascadeContext<'a> {
    pub ffmpeg: &'a Ffmpeg,
    pub cfg: &'a TranscodeConfig,
    pub target: &'a TargetFormat,
    pub use_vaapi: bool,
}

/// Where the throwaway compatibility intermediate for an item lives.
pub(crate) fn intermediate_path(canonical: &Path) -> PathBuf {
    let stem = canonical
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "media".to_string());
    canonical.with_file_name(format!("{stem}.inter_h264.mp4"))
}

/// Run the cascade for one item.
///
/// `input` is the scaling stage's output (or the working file when no
/// scaling ran); it is never modified. On success the winning attempt's
/// output sits at `canonical`; on exhaustion nothing sits there and the
/// caller decides what to keep. The compatibility intermediate is
/// removed before returning, whether or not it contributed.
pub(crate) fn run_cascade(
    ctx: &CascadeContext,
    input: &Path,
    input_codec: Option<&str>,
    canonical: &Path,
) -> CascadeResult {
    let caps = Caps {
        accel_decode: ctx.use_vaapi && input_codec.map_or(false, is_accel_decodable),
        accel_encode: ctx.use_vaapi
            && ctx.cfg.vaapi_encoder_options.contains_key(&ctx.target.codec),
    };

    let mut state = CascadeState::NotStarted;
    let mut attempts: Vec<EncodeAttempt> = Vec::new();
    let mut intermediate: Option<PathBuf> = None;

    let success = loop {
        let Some(action) = next_action(state, caps) else {
            break false;
        };

        match action {
            Action::TryDirect => {
                let ok = final_encode_attempt(
                    ctx,
                    "direct accelerated",
                    input,
                    input_codec,
                    true,
                    true,
                    canonical,
                    &mut attempts,
                );
                if ok {
                    break true;
                }
                tracing::warn!("direct accelerated pipeline failed");
                state = CascadeState::DirectAccelTried;
            }
            Action::BuildIntermediate => {
                // Always rebuilt from the cascade input, never from a
                // failed attempt's output.
                let path = intermediate_path(canonical);
                if stages::compat_intermediate(ctx.ffmpeg, input, &path) == StageOutcome::Completed
                {
                    intermediate = Some(path);
                    state = CascadeState::IntermediateBuilt;
                } else {
                    tracing::warn!("compatibility intermediate failed, falling back to software");
                    state = CascadeState::IntermediateFailed;
                }
            }
            Action::TryAccelFromIntermediate => {
                let Some(inter) = intermediate.as_deref() else {
                    state = CascadeState::AccelFromIntermediateTried;
                    continue;
                };
                let ok = final_encode_attempt(
                    ctx,
                    "accelerated from intermediate",
                    inter,
                    Some("h264"),
                    true,
                    true,
                    canonical,
                    &mut attempts,
                );
                if ok {
                    break true;
                }
                tracing::warn!("accelerated pipeline from intermediate failed");
                state = CascadeState::AccelFromIntermediateTried;
            }
            Action::TrySoftware => {
                let (src, codec, accel_decode) = match intermediate.as_deref() {
                    Some(inter) => (inter, Some("h264"), true),
                    None => (input, input_codec, caps.accel_decode),
                };
                let ok = final_encode_attempt(
                    ctx,
                    "software fallback",
                    src,
                    codec,
                    accel_decode,
                    false,
                    canonical,
                    &mut attempts,
                );
                if ok {
                    break true;
                }
                tracing::error!("software fallback encode failed");
                state = CascadeState::SoftwareFallbackTried;
            }
        }
    };

    if let Some(inter) = intermediate {
        remove_quiet(&inter);
        tracing::debug!("removed compatibility intermediate {}", inter.display());
    }

    CascadeResult { success, attempts }
}

/// One final-encode attempt: build the command, run it against a fresh
/// temporary output, and rename the output into place on success.
#[allow(clippy::too_many_arguments)]
fn final_encode_attempt(
    ctx: &CascadeContext,
    label: &'static str,
    input: &Path,
    source_codec: Option<&str>,
    attempt_accel_decode: bool,
    accel_encode: bool,
    canonical: &Path,
    attempts: &mut Vec<EncodeAttempt>,
) -> bool {
    let temp = attempt_temp_path(canonical, attempts.len(), accel_encode);

    let succeeded = match build_final_encode_args(
        ctx.cfg,
        ctx.target,
        input,
        source_codec,
        &temp,
        attempt_accel_decode,
        accel_encode,
    ) {
        None => {
            tracing::error!(
                "no {} encoder options configured for '{}'",
                if accel_encode { "VAAPI" } else { "software" },
                ctx.target.codec
            );
            false
        }
        Some(args) => {
            tracing::info!("attempt: {label} ({} -> {})", input.display(), temp.display());
            tracing::debug!(
                "ffmpeg args: {}",
                args.iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(" ")
            );
            match ctx.ffmpeg.run(args) {
                Ok(out) if encode_ok(&out, &temp) => match fs::rename(&temp, canonical) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!("failed to move encode result into place: {e}");
                        false
                    }
                },
                Ok(out) => {
                    tracing::warn!(
                        "{label} encode failed ({}): {}",
                        out.status,
                        stderr_tail(&out.stderr, 1000)
                    );
                    false
                }
                Err(e) => {
                    tracing::warn!("{label} encode could not run ffmpeg: {e}");
                    false
                }
            }
        }
    };

    if !succeeded {
        remove_quiet(&temp);
    }

    attempts.push(EncodeAttempt {
        label,
        input: input.to_path_buf(),
        accel_decode: attempt_accel_decode,
        accel_encode,
        succeeded,
    });
    succeeded
}

fn attempt_temp_path(canonical: &Path, index: usize, accel_encode: bool) -> PathBuf {
    let stem = canonical
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "media".to_string());
    let ext = canonical
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("tmp");
    let kind = if accel_encode { "vaapi" } else { "cpu" };
    canonical.with_file_name(format!("{stem}.final_{index}_{kind}.{ext}"))
}

/// Assemble the ffmpeg argument vector for one attempt.
///
/// Returns `None` when the target codec has no encoder options in the
/// relevant table, which the caller treats as attempt failure.
fn build_final_encode_args(
    cfg: &TranscodeConfig,
    target: &TargetFormat,
    input: &Path,
    source_codec: Option<&str>,
    temp_output: &Path,
    attempt_accel_decode: bool,
    accel_encode: bool,
) -> Option<Vec<OsString>> {
    let codec_options = if accel_encode {
        cfg.vaapi_encoder_options.get(&target.codec)?
    } else {
        cfg.cpu_encoder_options.get(&target.codec)?
    };

    let mut args: Vec<OsString> = vec!["-y".into()];

    // Hardware decode only engages when requested AND the source codec
    // is known compatible; a bare accel-encode attempt still needs the
    // device initialized for its filters.
    let hw_decode_active =
        attempt_accel_decode && source_codec.map_or(false, is_accel_decodable);
    let vaapi_needed = attempt_accel_decode || accel_encode;

    if vaapi_needed {
        let mut init = format!("vaapi={VAAPI_DEVICE_NAME}");
        if let Some(device) = &cfg.vaapi_device_path {
            init.push(':');
            init.push_str(&device.to_string_lossy());
        }
        args.extend(["-init_hw_device".into(), init.into()]);
        args.extend(["-filter_hw_device".into(), VAAPI_DEVICE_NAME.into()]);
    }

    if hw_decode_active {
        args.extend([
            "-hwaccel".into(),
            "vaapi".into(),
            "-hwaccel_device".into(),
            VAAPI_DEVICE_NAME.into(),
            "-hwaccel_output_format".into(),
            "vaapi".into(),
        ]);
    }

    args.extend(["-i".into(), input.into()]);
    args.extend(["-map".into(), "0:v:0".into(), "-map".into(), "0:a:0?".into()]);

    let mut vf_parts: Vec<&str> = Vec::new();
    if accel_encode {
        if hw_decode_active {
            // Pixel-format bridge between VAAPI decode and VAAPI encode.
            vf_parts.push("hwupload");
            vf_parts.push("scale_vaapi=w=iw:h=ih:format=nv12");
        } else {
            vf_parts.push("format=pix_fmts=nv12");
        }
    } else if hw_decode_active {
        // Hardware frames must come back down before a software encoder.
        vf_parts.push("hwdownload");
        vf_parts.push("format=pix_fmts=yuv420p");
    } else if target.codec == "av1" {
        vf_parts.push("format=pix_fmts=yuv420p");
    }
    if !vf_parts.is_empty() {
        args.extend(["-vf".into(), vf_parts.join(",").into()]);
    }

    args.extend(codec_options.iter().map(OsString::from));

    // Audio never participates in the retry cascade: fixed codec and
    // bitrate chosen solely by target container.
    if target.extension == ".webm" {
        args.extend(["-c:a".into(), "libopus".into(), "-b:a".into(), "96k".into()]);
    } else {
        args.extend(["-c:a".into(), "aac".into(), "-b:a".into(), "128k".into()]);
    }

    args.extend(cfg.common_options.iter().map(OsString::from));
    args.extend(target.container_options.iter().map(OsString::from));
    args.push(temp_output.into());

    Some(args)
}
