use serde::{Deserialize, Serialize};
use slidecast_av::ToolOverrides;
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level run configuration. Immutable once constructed; passed into
/// the processor by value so concurrent runs can use different settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub tools: ToolOverrides,
}

/// Transcoding policy: target selection, encoder parameter tables, and
/// the skip table for already-acceptable codec/container pairs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Master switch; disabled means extracted media is kept as-is.
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Codec used when the caller does not request one.
    #[serde(default = "default_codec")]
    pub default_codec: String,

    /// Codecs a caller may request.
    #[serde(default = "default_allowed_codecs")]
    pub allowed_codecs: Vec<String>,

    /// Per-codec container extension, MIME type, and container flags.
    #[serde(default = "default_format_map")]
    pub format_map: HashMap<String, FormatInfo>,

    /// Codec/container pairs that need no transcoding: extension
    /// (with leading dot) to acceptable codec names.
    #[serde(default = "default_preferred_formats")]
    pub preferred_formats: HashMap<String, Vec<String>>,

    /// Options appended to every final encode invocation.
    #[serde(default = "default_common_options")]
    pub common_options: Vec<String>,

    /// Per-codec software encoder arguments.
    #[serde(default = "default_cpu_options")]
    pub cpu_encoder_options: HashMap<String, Vec<String>>,

    /// Per-codec VAAPI encoder arguments. A codec absent from this table
    /// has no accelerated encode profile.
    #[serde(default = "default_vaapi_options")]
    pub vaapi_encoder_options: HashMap<String, Vec<String>>,

    /// Explicit render device (e.g. /dev/dri/renderD128); unset lets
    /// ffmpeg pick the default device.
    #[serde(default)]
    pub vaapi_device_path: Option<PathBuf>,

    /// Directory name under the output root that holds processed media;
    /// also the prefix of every relative output path.
    #[serde(default = "default_media_dir_name")]
    pub media_dir_name: String,

    #[serde(default)]
    pub pre_resize: PreResizeConfig,
}

/// Container details for one target codec.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormatInfo {
    /// Container extension including the leading dot.
    pub ext: String,
    /// MIME type of the container.
    pub mime: String,
    /// Extra muxer flags (e.g. `-movflags +faststart`).
    #[serde(default)]
    pub container_options: Vec<String>,
}

/// Fast pre-resize pass for oversized sources. Bounds later encode time;
/// a higher-quality pass follows, so this one trades speed for quality.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreResizeConfig {
    /// Width ceiling in pixels; unset or zero disables the stage.
    #[serde(default = "default_max_width")]
    pub max_width: Option<u32>,

    /// Height ceiling in pixels; unset or zero disables the stage.
    #[serde(default = "default_max_height")]
    pub max_height: Option<u32>,

    /// Encoder arguments for the pre-resize pass.
    #[serde(default = "default_pre_resize_options")]
    pub encoder_options: Vec<String>,
}

/// The effective target format for a run, resolved once from
/// configuration plus an optional caller override.
#[derive(Debug, Clone)]
pub struct TargetFormat {
    pub codec: String,
    pub extension: String,
    pub mime: String,
    pub container_options: Vec<String>,
}

impl TranscodeConfig {
    /// Resolve the effective target format.
    ///
    /// An unknown requested codec falls back to the configured default
    /// with a warning; a default codec missing from the format map falls
    /// back to H.264/MP4.
    pub fn resolve_target(&self, requested: Option<&str>) -> TargetFormat {
        let codec = match requested {
            Some(req) if self.allowed_codecs.iter().any(|c| c == req) => {
                tracing::info!("caller requested target video codec: {req}");
                req.to_string()
            }
            Some(req) => {
                tracing::warn!(
                    "invalid codec '{req}', using default: {}",
                    self.default_codec
                );
                self.default_codec.clone()
            }
            None => self.default_codec.clone(),
        };

        let (codec, info) = match self.format_map.get(&codec) {
            Some(info) => (codec, info.clone()),
            None => {
                tracing::error!("codec '{codec}' missing from format map, falling back to h264/mp4");
                (
                    "h264".to_string(),
                    self.format_map
                        .get("h264")
                        .cloned()
                        .unwrap_or_else(h264_format),
                )
            }
        };

        TargetFormat {
            codec,
            extension: info.ext,
            mime: info.mime,
            container_options: info.container_options,
        }
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enable: true,
            default_codec: default_codec(),
            allowed_codecs: default_allowed_codecs(),
            format_map: default_format_map(),
            preferred_formats: default_preferred_formats(),
            common_options: default_common_options(),
            cpu_encoder_options: default_cpu_options(),
            vaapi_encoder_options: default_vaapi_options(),
            vaapi_device_path: None,
            media_dir_name: default_media_dir_name(),
            pre_resize: PreResizeConfig::default(),
        }
    }
}

impl Default for PreResizeConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            max_height: default_max_height(),
            encoder_options: default_pre_resize_options(),
        }
    }
}

fn svec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn h264_format() -> FormatInfo {
    FormatInfo {
        ext: ".mp4".to_string(),
        mime: "video/mp4".to_string(),
        container_options: svec(&["-movflags", "+faststart"]),
    }
}

fn default_true() -> bool {
    true
}

fn default_codec() -> String {
    "h264".to_string()
}

fn default_allowed_codecs() -> Vec<String> {
    svec(&["h264", "vp9", "av1"])
}

fn default_format_map() -> HashMap<String, FormatInfo> {
    let webm = |_: &str| FormatInfo {
        ext: ".webm".to_string(),
        mime: "video/webm".to_string(),
        container_options: Vec::new(),
    };
    HashMap::from([
        ("h264".to_string(), h264_format()),
        ("vp9".to_string(), webm("vp9")),
        ("av1".to_string(), webm("av1")),
    ])
}

fn default_preferred_formats() -> HashMap<String, Vec<String>> {
    HashMap::from([
        (".mp4".to_string(), svec(&["h264"])),
        (".webm".to_string(), svec(&["vp9", "av1"])),
    ])
}

fn default_common_options() -> Vec<String> {
    svec(&["-map_metadata", "0", "-map_chapters", "0", "-threads", "0"])
}

fn default_cpu_options() -> HashMap<String, Vec<String>> {
    HashMap::from([
        (
            "h264".to_string(),
            svec(&[
                "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-profile:v", "high",
                "-level:v", "4.1",
            ]),
        ),
        (
            "vp9".to_string(),
            svec(&[
                "-c:v",
                "libvpx-vp9",
                "-crf",
                "31",
                "-b:v",
                "0",
                "-deadline",
                "good",
                "-row-mt",
                "1",
            ]),
        ),
        (
            "av1".to_string(),
            svec(&[
                "-c:v",
                "libaom-av1",
                "-crf",
                "35",
                "-b:v",
                "0",
                "-cpu-used",
                "6",
                "-row-mt",
                "1",
                "-tile-columns",
                "2",
                "-tile-rows",
                "2",
            ]),
        ),
    ])
}

fn default_vaapi_options() -> HashMap<String, Vec<String>> {
    HashMap::from([
        (
            "h264".to_string(),
            svec(&["-c:v", "h264_vaapi", "-qp", "23", "-profile:v", "high"]),
        ),
        (
            "vp9".to_string(),
            svec(&["-c:v", "vp9_vaapi", "-qp", "31"]),
        ),
        // av1_vaapi rejects qp mode on common drivers; bitrate mode works.
        (
            "av1".to_string(),
            svec(&["-c:v", "av1_vaapi", "-rc_mode", "2", "-b:v", "1M"]),
        ),
    ])
}

fn default_media_dir_name() -> String {
    "videos".to_string()
}

fn default_max_width() -> Option<u32> {
    Some(3840)
}

fn default_max_height() -> Option<u32> {
    Some(2160)
}

fn default_pre_resize_options() -> Vec<String> {
    svec(&[
        "-c:v", "libx264", "-preset", "ultrafast", "-crf", "8", "-c:a", "copy", "-sn",
    ])
}
