//! Media item records and content-type handling.
//!
//! The document-parsing collaborator hands the core an
//! [`ExtractedStream`] per embedded media annotation; the core hands the
//! presentation-assembly collaborator one [`ProcessedMedia`] per item
//! that survived processing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::FormatInfo;

/// Geometry rectangle supplied by the document collaborator. Opaque to
/// this core; passed through unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// One extracted media stream, as handed over by the document parser.
#[derive(Debug, Clone)]
pub struct ExtractedStream {
    /// Raw stream content.
    pub bytes: Vec<u8>,
    /// Zero-based page index the annotation lives on.
    pub page_index: usize,
    /// Zero-based annotation index within the page.
    pub annot_index: usize,
    /// Object/generation pair of the source stream object, when known.
    pub object_id: Option<(u32, u16)>,
    /// Declared content type from the document; best-effort, may be
    /// generic or wrong.
    pub content_type_hint: Option<String>,
    /// Placement rectangle, passed through to the output record.
    pub rect: Rect,
}

impl ExtractedStream {
    /// Stable, filesystem-safe base identifier for this item. Unique per
    /// page/annotation (plus object id when available), so working files
    /// of distinct items never collide.
    pub fn base_identifier(&self) -> String {
        let stream_id = match self.object_id {
            Some((obj, gen)) => format!("{obj}_{gen}"),
            None => format!("p{}a{}s", self.page_index + 1, self.annot_index + 1),
        };
        let raw = format!(
            "slide_{}_annot_{}_{}",
            self.page_index + 1,
            self.annot_index + 1,
            stream_id
        );
        sanitize_identifier(&raw)
    }
}

/// Working state for one media item as it moves through the pipeline.
/// The current path mutates as stages replace the working file.
#[derive(Debug, Clone)]
pub struct MediaItem {
    /// Filesystem-safe base identifier.
    pub base_id: String,
    /// Current on-disk location of the working file.
    pub path: PathBuf,
    /// Detected MIME type.
    pub content_type: String,
    /// Probed source codec; `None` until probed or when unknown.
    pub codec: Option<String>,
}

impl MediaItem {
    /// Lowercased extension of the current working file, with leading
    /// dot; empty when the file has none.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default()
    }
}

/// Result record for one processed item, handed to the
/// presentation-assembly collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMedia {
    /// Zero-based page index, echoed back.
    pub page_index: usize,
    /// Zero-based annotation index, echoed back.
    pub annot_index: usize,
    /// Container-relative output path, forward-slash normalized.
    pub output_path: String,
    /// Absolute location of the final artifact.
    pub absolute_path: PathBuf,
    /// Resolved MIME type of the final artifact.
    pub content_type: String,
    /// Passthrough geometry.
    pub rect: Rect,
    /// False when the cascade was exhausted and the item was kept in its
    /// original (or best-available) encoding.
    pub transcoded: bool,
}

fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Map a MIME type to a file extension.
///
/// The configured format map wins (so target formats round-trip), then a
/// table of common media types, then a sanitized subtype, then `.bin`.
pub fn extension_for_mime(format_map: &HashMap<String, FormatInfo>, mime: &str) -> String {
    if !mime.contains('/') {
        return ".bin".to_string();
    }

    for info in format_map.values() {
        if info.mime == mime {
            return info.ext.clone();
        }
    }

    let common = match mime {
        "video/mp4" => ".mp4",
        "video/quicktime" => ".mov",
        "video/webm" => ".webm",
        "video/x-matroska" => ".mkv",
        "video/x-msvideo" => ".avi",
        "video/mpeg" => ".mpg",
        "audio/mpeg" => ".mp3",
        "audio/aac" => ".aac",
        "audio/ogg" => ".ogg",
        "audio/wav" => ".wav",
        "audio/flac" => ".flac",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "application/octet-stream" => ".bin",
        _ => "",
    };
    if !common.is_empty() {
        return common.to_string();
    }

    let subtype = mime
        .split('/')
        .nth(1)
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    let safe: String = subtype
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '+')
        .collect();
    if safe.is_empty() {
        ".bin".to_string()
    } else {
        format!(".{safe}")
    }
}

/// Sniff the MIME type of a file from its leading bytes.
///
/// Covers the container signatures that show up in slide decks; anything
/// unrecognized returns `None` so the caller can fall back to the
/// document's declared content type.
pub fn sniff_mime(path: &Path) -> Option<String> {
    let mut buf = [0u8; 64];
    let n = {
        use std::io::Read;
        let mut file = std::fs::File::open(path).ok()?;
        file.read(&mut buf).ok()?
    };
    sniff_mime_bytes(&buf[..n])
}

fn sniff_mime_bytes(head: &[u8]) -> Option<String> {
    if head.len() < 12 {
        return None;
    }

    let mime = if &head[4..8] == b"ftyp" {
        match &head[8..12] {
            b"qt  " => "video/quicktime",
            _ => "video/mp4",
        }
    } else if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        // EBML header; the DocType string distinguishes webm from mkv.
        if contains(head, b"webm") {
            "video/webm"
        } else {
            "video/x-matroska"
        }
    } else if head.starts_with(b"RIFF") && &head[8..12] == b"AVI " {
        "video/x-msvideo"
    } else if head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        "image/webp"
    } else if head.starts_with(b"OggS") {
        "video/ogg"
    } else if head.starts_with(&[0x00, 0x00, 0x01, 0xBA]) {
        "video/mpeg"
    } else if head.starts_with(b"ID3") || head.starts_with(&[0xFF, 0xFB]) {
        "audio/mpeg"
    } else if head.starts_with(b"fLaC") {
        "audio/flac"
    } else if head.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if head.starts_with(b"GIF8") {
        "image/gif"
    } else {
        return None;
    };

    Some(mime.to_string())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}
