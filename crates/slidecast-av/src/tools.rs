//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the
//! external encoding engine binaries (ffmpeg, ffprobe) and provides
//! lookup methods for the rest of the workspace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, ToolCommand};

/// Tool names the registry manages.
const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// User-supplied overrides for tool discovery, deserialized from the
/// `[tools]` section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOverrides {
    /// Explicit path to the ffmpeg binary.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit path to the ffprobe binary.
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
    /// Maximum seconds a single tool invocation may run (unset = no limit).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool locations.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, PathBuf>,
    timeout: Option<Duration>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides).
    ///
    /// An explicit override path that points at a nonexistent file marks
    /// the tool unavailable rather than silently falling back to a
    /// different binary from `PATH`. Tools that are not found are
    /// omitted from the registry; callers degrade accordingly.
    pub fn discover(overrides: &ToolOverrides) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom = match name {
                "ffmpeg" => overrides.ffmpeg_path.as_deref(),
                "ffprobe" => overrides.ffprobe_path.as_deref(),
                _ => None,
            };

            let resolved = match custom {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        "configured path for {} does not exist: {}",
                        name,
                        p.display()
                    );
                    None
                }
                None => which::which(name).ok(),
            };

            if let Some(path) = resolved {
                tools.insert(name.to_string(), path);
            }
        }

        Self {
            tools,
            timeout: overrides.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Look up the resolved path for a tool.
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.tools.get(name).map(PathBuf::as_path)
    }

    /// Resolved ffmpeg path, if the tool was found.
    pub fn ffmpeg(&self) -> Option<&Path> {
        self.get("ffmpeg")
    }

    /// Resolved ffprobe path, if the tool was found.
    pub fn ffprobe(&self) -> Option<&Path> {
        self.get("ffprobe")
    }

    /// Configured per-invocation timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Return the path for a tool, or an [`Error::ToolNotFound`] if the
    /// tool was not found during discovery.
    pub fn require(&self, name: &str) -> Result<&Path> {
        self.get(name).ok_or_else(|| Error::ToolNotFound {
            tool: format!("{name} (is it installed and in PATH?)"),
        })
    }

    /// Build a [`ToolCommand`] for a discovered tool with the registry's
    /// timeout applied.
    pub fn command(&self, name: &str) -> Result<ToolCommand> {
        Ok(ToolCommand::new(self.require(name)?).timeout(self.timeout))
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(path),
                    path: Some(path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_with_default_overrides() {
        let registry = ToolRegistry::discover(&ToolOverrides::default());
        // We cannot guarantee ffmpeg is installed in CI, but the call
        // itself must not panic.
        let _ = registry.check_all();
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let overrides = ToolOverrides {
            ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg")),
            ffprobe_path: Some(PathBuf::from("/nonexistent/ffprobe")),
            timeout_secs: None,
        };
        let registry = ToolRegistry::discover(&overrides);
        assert!(registry.require("ffmpeg").is_err());
        assert!(registry.require("ffprobe").is_err());
    }

    #[test]
    fn nonexistent_override_does_not_fall_back_to_path() {
        let overrides = ToolOverrides {
            ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg")),
            ..Default::default()
        };
        let registry = ToolRegistry::discover(&overrides);
        assert!(registry.ffmpeg().is_none());
    }

    #[test]
    fn existing_override_is_used_directly() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let overrides = ToolOverrides {
            ffmpeg_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let registry = ToolRegistry::discover(&overrides);
        assert_eq!(registry.ffmpeg(), Some(file.path()));
    }

    #[test]
    fn check_all_reports_known_tools() {
        let registry = ToolRegistry::discover(&ToolOverrides::default());
        let names: Vec<String> = registry
            .check_all()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert!(names.contains(&"ffmpeg".to_string()));
        assert!(names.contains(&"ffprobe".to_string()));
    }

    #[test]
    fn timeout_is_parsed_from_overrides() {
        let overrides = ToolOverrides {
            timeout_secs: Some(30),
            ..Default::default()
        };
        let registry = ToolRegistry::discover(&overrides);
        assert_eq!(registry.timeout(), Some(Duration::from_secs(30)));
    }
}
