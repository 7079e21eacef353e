//! Per-item pipeline orchestration.
//!
//! [`MediaProcessor`] is constructed once per run; every run-level
//! decision (target format, scaling percentage, acceleration gate) is
//! made in [`MediaProcessor::new`], so [`MediaProcessor::process_item`]
//! only sequences stages and tracks temporary files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use slidecast_av::{probe_video, ProbeResult, ToolRegistry};

use crate::config::{Config, TargetFormat, TranscodeConfig};
use crate::media::{extension_for_mime, sniff_mime, ExtractedStream, MediaItem, ProcessedMedia};
use crate::transcode::cascade::{self, CascadeContext};
use crate::transcode::{remove_quiet, stages, Ffmpeg, StageOutcome};

/// Per-run options supplied by the caller (CLI flags or embedding code).
#[derive(Debug, Clone, Default)]
pub struct ProcessorOptions {
    /// Scale the video to this percentage of its original dimensions
    /// (1..=100). `None` or 100 disables the scaling stage.
    pub scaling_percent: Option<u32>,
    /// Requested target codec; `None` uses the configured default.
    pub codec: Option<String>,
    /// Ask for VAAPI acceleration. Granted only when the platform and
    /// configuration support it.
    pub use_vaapi: bool,
}

/// Failure processing a single item. Stage and encode failures are not
/// errors (the pipeline degrades); these are the cases where no usable
/// artifact can be produced at all.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("media stream is empty")]
    EmptyStream,

    #[error("failed to write working file")]
    Write(#[from] io::Error),

    #[error("no artifact left on disk at {0}")]
    MissingArtifact(PathBuf),
}

/// Sequences probing, pre-resize, scaling, and the final-encode cascade
/// for extracted media streams, one at a time.
pub struct MediaProcessor {
    cfg: TranscodeConfig,
    media_dir: PathBuf,
    ffmpeg: Option<Ffmpeg>,
    ffprobe: Option<PathBuf>,
    timeout: Option<Duration>,
    target: TargetFormat,
    /// Raw caller request, kept verbatim (even when invalid) because the
    /// encode-needed check compares against what was asked for, not what
    /// it resolved to.
    requested_codec: Option<String>,
    scaling_percent: Option<u32>,
    use_vaapi: bool,
    enabled: bool,
}

impl MediaProcessor {
    pub fn new(
        config: Config,
        media_dir: PathBuf,
        registry: &ToolRegistry,
        options: ProcessorOptions,
    ) -> Self {
        let cfg = config.transcode;

        let scaling_percent = match options.scaling_percent {
            Some(p) if (1..=100).contains(&p) => Some(p),
            Some(p) => {
                tracing::warn!("invalid scaling percentage {p}, ignoring (valid: 1-100)");
                None
            }
            None => None,
        };

        let target = cfg.resolve_target(options.codec.as_deref());

        let ffmpeg_path = registry.ffmpeg().map(Path::to_path_buf);
        let ffprobe = registry.ffprobe().map(Path::to_path_buf);
        let timeout = registry.timeout();

        if ffmpeg_path.is_none() {
            tracing::warn!("ffmpeg not found, media will be kept as extracted");
        }
        if ffprobe.is_none() {
            tracing::warn!("ffprobe not found, stream probing disabled");
        }
        if !cfg.enable {
            tracing::info!("transcoding disabled by configuration");
        }

        let enabled = cfg.enable && ffmpeg_path.is_some();
        let use_vaapi =
            options.use_vaapi && ffmpeg_path.is_some() && vaapi_supported(&cfg);

        if options.use_vaapi && !use_vaapi {
            tracing::warn!("VAAPI requested but not usable here, using software encoding");
        }

        Self {
            media_dir,
            ffmpeg: ffmpeg_path.map(|p| Ffmpeg::new(p, timeout)),
            ffprobe,
            timeout,
            target,
            requested_codec: options.codec,
            scaling_percent,
            use_vaapi,
            enabled,
            cfg,
        }
    }

    /// Directory that receives working files and final artifacts.
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Run the full pipeline for one extracted stream.
    ///
    /// `Ok(Some(record))` for a processed (or kept) video, `Ok(None)` for
    /// non-video content, `Err` when no artifact could be produced.
    /// Exactly one file remains on disk per successful item.
    pub fn process_item(
        &self,
        stream: &ExtractedStream,
    ) -> Result<Option<ProcessedMedia>, ItemError> {
        let span = tracing::info_span!(
            "media_item",
            page = stream.page_index,
            annot = stream.annot_index
        );
        let _guard = span.enter();

        if stream.bytes.is_empty() {
            return Err(ItemError::EmptyStream);
        }

        let base = stream.base_identifier();
        fs::create_dir_all(&self.media_dir)?;

        let initial = self.media_dir.join(format!("{base}.tmp.bin"));
        fs::write(&initial, &stream.bytes)?;
        tracing::debug!("wrote {} ({} bytes)", initial.display(), stream.bytes.len());

        let mut info = self.probe(&initial);
        let mut resized = false;

        if self.enabled {
            if let (Some(ffmpeg), Some(probe)) = (&self.ffmpeg, &info) {
                if stages::pre_resize(
                    ffmpeg,
                    &self.cfg.pre_resize,
                    &initial,
                    probe.width,
                    probe.height,
                ) == StageOutcome::Completed
                {
                    resized = true;
                }
            }
        }

        // Detection order: sniffed bytes beat the document's declared
        // type, which beats nothing. A generic octet-stream answer from
        // either source is treated as no answer.
        let mime = sniff_mime(&initial)
            .filter(|m| m != "application/octet-stream")
            .or_else(|| {
                stream
                    .content_type_hint
                    .clone()
                    .filter(|m| m != "application/octet-stream")
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let ext = extension_for_mime(&self.cfg.format_map, &mime);
        let named = self.media_dir.join(format!("{base}{ext}"));
        let current = if named == initial {
            initial.clone()
        } else {
            remove_quiet(&named);
            match fs::rename(&initial, &named) {
                Ok(()) => named,
                Err(e) => {
                    tracing::warn!("could not rename working file: {e}");
                    initial.clone()
                }
            }
        };

        if resized || info.is_none() {
            info = self.probe(&current);
        }

        let mut item = MediaItem {
            base_id: base.clone(),
            path: current,
            content_type: mime,
            codec: info.as_ref().map(|i| i.codec_name.clone()),
        };

        if !item.content_type.starts_with("video/") {
            tracing::debug!(
                "skipping non-video content ({}) for {}",
                item.content_type,
                base
            );
            remove_quiet(&item.path);
            return Ok(None);
        }

        let scaled = self.media_dir.join(format!("{base}.scale_hq_inter.mp4"));
        if let Some(percent) = self.scaling_percent.filter(|p| *p != 100) {
            if self.enabled {
                if let Some(ffmpeg) = &self.ffmpeg {
                    if stages::scale(ffmpeg, percent, &item.path, &scaled)
                        == StageOutcome::Completed
                    {
                        if item.path != scaled {
                            remove_quiet(&item.path);
                        }
                        item.path = scaled.clone();
                        item.content_type = "video/mp4".to_string();
                        item.codec = Some("h264".to_string());
                    }
                }
            }
        }

        let canonical = self.media_dir.join(format!("{base}{}", self.target.extension));
        let (needed, reasons) = cascade::encode_required(
            &self.cfg,
            self.requested_codec.as_deref(),
            item.codec.as_deref(),
            &item.extension(),
        );

        let mut transcoded = false;
        let mut resulting = item.path.clone();

        if needed && self.enabled {
            if let Some(ffmpeg) = &self.ffmpeg {
                tracing::info!(
                    "encode required for {} ({})",
                    base,
                    reasons.join(", ")
                );
                let ctx = CascadeContext {
                    ffmpeg,
                    cfg: &self.cfg,
                    target: &self.target,
                    use_vaapi: self.use_vaapi,
                };
                let result =
                    cascade::run_cascade(&ctx, &item.path, item.codec.as_deref(), &canonical);
                if result.success {
                    resulting = canonical.clone();
                    item.content_type = self.target.mime.clone();
                    transcoded = true;
                } else {
                    tracing::warn!(
                        "all {} encode attempts failed for {}, keeping source encoding",
                        result.attempts.len(),
                        base
                    );
                    resulting = self.rename_into_place(&item.path, &canonical);
                }
            }
        } else if self.ffmpeg.is_some() {
            resulting = self.rename_into_place(&item.path, &canonical);
        }
        // Without ffmpeg the item keeps its detected-type name; renaming
        // to the target extension would promise a container nothing here
        // verified.

        for leftover in [&initial, &scaled, &item.path] {
            if *leftover != resulting {
                remove_quiet(leftover);
            }
        }

        if !resulting.exists() {
            return Err(ItemError::MissingArtifact(resulting));
        }

        let filename = resulting
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| base.clone());

        Ok(Some(ProcessedMedia {
            page_index: stream.page_index,
            annot_index: stream.annot_index,
            output_path: format!("{}/{}", self.cfg.media_dir_name, filename),
            absolute_path: resulting,
            content_type: item.content_type,
            rect: stream.rect,
            transcoded,
        }))
    }

    fn probe(&self, path: &Path) -> Option<ProbeResult> {
        let ffprobe = self.ffprobe.as_deref()?;
        probe_video(ffprobe, path, self.timeout)
    }

    /// Move the working file to the canonical name, keeping the working
    /// file when the rename fails.
    fn rename_into_place(&self, from: &Path, canonical: &Path) -> PathBuf {
        if from == canonical {
            return canonical.to_path_buf();
        }
        remove_quiet(canonical);
        match fs::rename(from, canonical) {
            Ok(()) => canonical.to_path_buf(),
            Err(e) => {
                tracing::warn!(
                    "could not move {} to {}: {e}",
                    from.display(),
                    canonical.display()
                );
                from.to_path_buf()
            }
        }
    }
}

/// VAAPI is worth attempting only on Linux, and only when at least one
/// allowed codec has an accelerated encode profile. A missing render
/// node is reported but not disqualifying; ffmpeg gives the definitive
/// answer at encode time and the cascade absorbs the failure.
fn vaapi_supported(cfg: &TranscodeConfig) -> bool {
    if !cfg!(target_os = "linux") {
        tracing::warn!("VAAPI acceleration is only supported on Linux");
        return false;
    }

    let any_accel = cfg
        .allowed_codecs
        .iter()
        .any(|c| cfg.vaapi_encoder_options.contains_key(c));
    if !any_accel {
        tracing::warn!("no allowed codec has VAAPI encoder options");
        return false;
    }

    let device_present = match &cfg.vaapi_device_path {
        Some(path) => path.exists(),
        None => fs::read_dir("/dev/dri")
            .map(|mut entries| entries.any(|e| {
                e.map(|e| e.file_name().to_string_lossy().starts_with("render"))
                    .unwrap_or(false)
            }))
            .unwrap_or(false),
    };
    if !device_present {
        tracing::warn!("no render device found, VAAPI attempts may fail");
    }

    true
}
