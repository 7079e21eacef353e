//! External encoding-engine plumbing for slidecast.
//!
//! This crate owns everything that touches external CLI tools: discovery
//! of ffmpeg/ffprobe ([`ToolRegistry`]), blocking subprocess execution
//! with captured output ([`ToolCommand`]), and ffprobe-based stream
//! probing ([`probe_video`]).
//!
//! Policy lives in the `slidecast` crate; nothing here decides whether or
//! how a file should be transcoded.

mod error;
mod exec;
mod probe;
mod tools;

pub use error::{Error, Result};
pub use exec::{ToolCommand, ToolOutput};
pub use probe::{probe_video, ProbeResult};
pub use tools::{ToolInfo, ToolOverrides, ToolRegistry};
