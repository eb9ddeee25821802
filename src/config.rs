// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::types::{Facing, FlashMode};
use crate::constants::{DEFAULT_SAVE_FOLDER, recording};
use crate::errors::{CameraError, CameraResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Initial camera state handed to the engine at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// Run an AF pass before still captures when the device supports it
    pub auto_focus: bool,
    /// Camera to open first
    pub facing: Facing,
    /// Flash mode applied once the session is open
    pub flash: FlashMode,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            auto_focus: true,
            facing: Facing::Back,
            flash: FlashMode::Off,
        }
    }
}

/// What the capture button produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraMode {
    /// Click for a picture, long press for a video
    #[default]
    Both,
    /// Pictures only
    Picture,
    /// Videos only
    Video,
}

impl CameraMode {
    pub fn allows_picture(&self) -> bool {
        matches!(self, CameraMode::Both | CameraMode::Picture)
    }

    pub fn allows_video(&self) -> bool {
        matches!(self, CameraMode::Both | CameraMode::Video)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial facing, flash and autofocus
    pub capture: CaptureOptions,
    /// Picture, video or both
    pub camera_mode: CameraMode,
    /// Never use the session-based API even when it is available
    pub only_legacy_api: bool,
    /// Longest recording the host allows, in milliseconds
    pub max_video_record_ms: u64,
    /// How many pictures/videos one capture flow may produce
    pub max_product_count: u32,
    /// Where pictures are written (None = platform picture dir)
    pub pictures_dir: Option<PathBuf>,
    /// Where videos are written (None = platform video dir)
    pub videos_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureOptions::default(),
            camera_mode: CameraMode::default(),
            only_legacy_api: false,
            max_video_record_ms: recording::DEFAULT_MAX_DURATION_MS,
            max_product_count: 1,
            pictures_dir: None,
            videos_dir: None,
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("camera-engine")
            .join("config.json")
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub fn load(path: &Path) -> CameraResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| CameraError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config.sanitized())
    }

    /// Write configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> CameraResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CameraError::Config(format!("{}: {}", parent.display(), e)))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| CameraError::Config(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Longest recording the host allows
    pub fn max_video_record_duration(&self) -> Duration {
        Duration::from_millis(self.max_video_record_ms)
    }

    /// Picture directory, resolved against the platform default
    pub fn picture_dir(&self) -> PathBuf {
        self.pictures_dir.clone().unwrap_or_else(|| {
            dirs::picture_dir()
                .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
                .join(DEFAULT_SAVE_FOLDER)
        })
    }

    /// Video directory, resolved against the platform default
    pub fn video_dir(&self) -> PathBuf {
        self.videos_dir.clone().unwrap_or_else(|| {
            dirs::video_dir()
                .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
                .join(DEFAULT_SAVE_FOLDER)
        })
    }

    fn sanitized(mut self) -> Self {
        self.max_product_count = self.max_product_count.max(1);
        self
    }
}
