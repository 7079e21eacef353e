mod cli;

use slidecast::{config, media, transcode};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use slidecast_av::{probe_video, ToolRegistry};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on
    // the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "slidecast=trace,slidecast_av=trace".to_string()
        } else {
            "slidecast=info,slidecast_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Transcode {
            input,
            scale,
            codec,
            vaapi,
            output_dir,
        } => transcode_file(
            &input,
            cli.config.as_deref(),
            scale,
            codec,
            vaapi,
            output_dir,
        ),
        Commands::Probe { file, json } => probe_file(&file, cli.config.as_deref(), json),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("slidecast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn transcode_file(
    input: &Path,
    config_path: Option<&Path>,
    scale: Option<u32>,
    codec: Option<String>,
    vaapi: bool,
    output_dir: PathBuf,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let bytes = std::fs::read(input)?;
    tracing::info!("Processing file: {:?} ({} bytes)", input, bytes.len());

    let registry = ToolRegistry::discover(&config.tools);
    let media_dir = output_dir.join(&config.transcode.media_dir_name);

    let options = transcode::ProcessorOptions {
        scaling_percent: scale,
        codec,
        use_vaapi: vaapi,
    };
    let processor = transcode::MediaProcessor::new(config, media_dir, &registry, options);

    let stream = media::ExtractedStream {
        bytes,
        page_index: 0,
        annot_index: 0,
        object_id: None,
        content_type_hint: None,
        rect: media::Rect::default(),
    };

    match processor.process_item(&stream)? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        None => {
            println!("Input is not video content; nothing produced.");
        }
    }

    Ok(())
}

fn probe_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let registry = ToolRegistry::discover(&config.tools);
    let ffprobe = registry.require("ffprobe")?;

    match probe_video(ffprobe, file, registry.timeout()) {
        Some(info) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "width": info.width,
                        "height": info.height,
                        "codec": info.codec_name,
                    })
                );
            } else {
                println!("File: {}", file.display());
                println!("Video: {} {}x{}", info.codec_name, info.width, info.height);
            }
        }
        None => {
            if json {
                println!("null");
            } else {
                println!("No probeable video stream found.");
            }
        }
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let registry = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in registry.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable transcoding.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config_summary(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            print_config_summary(&config);
        }
    }

    Ok(())
}

fn print_config_summary(config: &config::Config) {
    println!("  Transcoding enabled: {}", config.transcode.enable);
    println!("  Default codec: {}", config.transcode.default_codec);
    println!(
        "  Allowed codecs: {}",
        config.transcode.allowed_codecs.join(", ")
    );
    println!("  Media directory: {}", config.transcode.media_dir_name);
    match (
        config.transcode.pre_resize.max_width,
        config.transcode.pre_resize.max_height,
    ) {
        (Some(w), Some(h)) => println!("  Pre-resize ceiling: {}x{}", w, h),
        _ => println!("  Pre-resize: disabled"),
    }
}
