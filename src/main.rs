// SPDX-License-Identifier: GPL-3.0-only

use camera_engine::backends::camera::types::{Facing, FlashMode};
use camera_engine::config::Config;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-engine")]
#[command(about = "Capture pictures and videos on the simulated camera platform")]
#[command(version)]
struct Cli {
    /// Configuration file (default: <config dir>/camera-engine/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Drive the cameras through the legacy API only
    #[arg(long, global = true)]
    legacy: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Take a photo
    Photo {
        #[command(flatten)]
        capture: CaptureArgs,
    },

    /// Record a video
    Video {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Recording duration in seconds (default: the configured maximum)
        #[arg(short, long)]
        duration: Option<u64>,
    },
}

#[derive(clap::Args)]
struct CaptureArgs {
    /// Use the front camera
    #[arg(long)]
    front: bool,

    /// Flash mode
    #[arg(long, value_enum)]
    flash: Option<FlashArg>,

    /// Disable the auto-focus pass before pictures
    #[arg(long)]
    no_auto_focus: bool,

    /// Directory for the captured files (default: from the configuration)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FlashArg {
    Off,
    On,
    Auto,
    Torch,
}

impl From<FlashArg> for FlashMode {
    fn from(arg: FlashArg) -> Self {
        match arg {
            FlashArg::Off => FlashMode::Off,
            FlashArg::On => FlashMode::On,
            FlashArg::Auto => FlashMode::Auto,
            FlashArg::Torch => FlashMode::Torch,
        }
    }
}

impl CaptureArgs {
    fn apply(&self, config: &mut Config) {
        if self.front {
            config.capture.facing = Facing::Front;
        }
        if let Some(flash) = self.flash {
            config.capture.flash = flash.into();
        }
        if self.no_auto_focus {
            config.capture.auto_focus = false;
        }
        if let Some(dir) = &self.output {
            config.pictures_dir = Some(dir.clone());
            config.videos_dir = Some(dir.clone());
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_engine=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;
    if cli.legacy {
        config.only_legacy_api = true;
    }

    match cli.command {
        Commands::List => cli::list_cameras(&config),
        Commands::Photo { capture } => {
            capture.apply(&mut config);
            cli::take_photo(config)
        }
        Commands::Video { capture, duration } => {
            capture.apply(&mut config);
            cli::record_video(config, duration)
        }
    }
}
