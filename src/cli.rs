use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "slidecast")]
#[command(author, version, about = "Adaptive transcoder for slide-deck media")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one media file through the full pipeline
    Transcode {
        /// Input media file
        #[arg(required = true)]
        input: PathBuf,

        /// Scale video to this percentage of its original size (1-100)
        #[arg(long)]
        scale: Option<u32>,

        /// Target video codec (h264, vp9, av1)
        #[arg(long)]
        codec: Option<String>,

        /// Attempt VAAPI hardware acceleration
        #[arg(long)]
        vaapi: bool,

        /// Directory that receives the media subdirectory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Probe a media file and display stream information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
