// SPDX-License-Identifier: GPL-3.0-only

//! Capture flow controller
//!
//! Drives one capture screen on top of a [`CameraEngine`]: click for a
//! picture, long press for a video, flash cycling, touch focus and pinch
//! zoom. Every produced file is collected; [`CaptureFlow::confirm`] hands the
//! most recent ones to whoever started the flow through a one-shot channel.
//! Dropping or cancelling the flow closes the channel without a result.

use crate::backends::camera::hal::Platform;
use crate::backends::camera::types::{Facing, FlashMode, SensorOrientation, ZoomStep};
use crate::backends::camera::{CameraEngine, CameraListener};
use crate::config::{CameraMode, Config};
use crate::constants::gesture::PINCH_THRESHOLD;
use crate::errors::{CameraError, CameraResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// A file produced by the flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub file: PathBuf,
    pub thumbnail: PathBuf,
    pub is_video: bool,
}

/// Receives the confirmed products of a flow
pub type FlowResult = oneshot::Receiver<Vec<Product>>;

/// Records products and forwards every event to the host
struct ProductCollector {
    host: Arc<dyn CameraListener>,
    products: Mutex<Vec<Product>>,
}

impl ProductCollector {
    fn push(&self, product: Product) {
        debug!(file = %product.file.display(), is_video = product.is_video, "New product");
        self.products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(product);
    }

    fn snapshot(&self) -> Vec<Product> {
        self.products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CameraListener for ProductCollector {
    fn on_flash_support(&self, supported: bool) {
        self.host.on_flash_support(supported);
    }

    fn on_sensor_orientation_changed(&self, old: SensorOrientation, new: SensorOrientation) {
        self.host.on_sensor_orientation_changed(old, new);
    }

    fn on_error(&self, error: CameraError) {
        self.host.on_error(error);
    }

    fn on_picture_taken(&self, picture: &Path, thumbnail: &Path) {
        self.push(Product {
            file: picture.to_path_buf(),
            thumbnail: thumbnail.to_path_buf(),
            is_video: false,
        });
        self.host.on_picture_taken(picture, thumbnail);
    }

    fn on_video_recorded(&self, video: &Path, thumbnail: &Path) {
        self.push(Product {
            file: video.to_path_buf(),
            thumbnail: thumbnail.to_path_buf(),
            is_video: true,
        });
        self.host.on_video_recorded(video, thumbnail);
    }
}

/// Turns finger spacing samples of a two-finger gesture into zoom steps
#[derive(Debug, Default)]
pub struct PinchZoom {
    previous: Option<f32>,
}

impl PinchZoom {
    /// Feed the current spacing, returns a step once it moved far enough
    pub fn update(&mut self, spacing: f32) -> Option<ZoomStep> {
        let Some(previous) = self.previous else {
            self.previous = Some(spacing);
            return None;
        };
        if (spacing - previous).abs() < PINCH_THRESHOLD {
            return None;
        }

        self.previous = Some(spacing);
        Some(if spacing > previous {
            ZoomStep::In
        } else {
            ZoomStep::Out
        })
    }

    /// Gesture ended
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Distance between two touch points
pub fn finger_spacing(first: (f32, f32), second: (f32, f32)) -> f32 {
    let x = first.0 - second.0;
    let y = first.1 - second.1;
    (x * x + y * y).sqrt()
}

/// One capture screen
pub struct CaptureFlow {
    engine: CameraEngine,
    collector: Arc<ProductCollector>,
    camera_mode: CameraMode,
    max_product_count: usize,
    /// Flash used for pictures
    flash: FlashMode,
    /// Flash used while recording, Off or Torch
    video_flash: FlashMode,
    facing: Facing,
    /// When the running recording started
    recording_since: Option<Instant>,
    pinch: PinchZoom,
    completion: Option<oneshot::Sender<Vec<Product>>>,
}

impl CaptureFlow {
    /// Create a paused flow and the channel its result arrives on
    pub fn new(
        platform: Platform,
        mut config: Config,
        host: Arc<dyn CameraListener>,
    ) -> CameraResult<(Self, FlowResult)> {
        let flash = config.capture.flash;
        let video_flash = flash.for_video();
        if config.camera_mode == CameraMode::Video {
            config.capture.flash = video_flash;
        }

        let collector = Arc::new(ProductCollector {
            host,
            products: Mutex::new(Vec::new()),
        });
        let camera_mode = config.camera_mode;
        let max_product_count = config.max_product_count.max(1) as usize;
        let facing = config.capture.facing;
        let engine = CameraEngine::new(
            platform,
            config,
            Arc::clone(&collector) as Arc<dyn CameraListener>,
        )?;
        let (tx, rx) = oneshot::channel();

        info!(mode = ?camera_mode, max_product_count, "Capture flow created");
        Ok((
            Self {
                engine,
                collector,
                camera_mode,
                max_product_count,
                flash,
                video_flash,
                facing,
                recording_since: None,
                pinch: PinchZoom::default(),
                completion: Some(tx),
            },
            rx,
        ))
    }

    pub fn engine(&self) -> &CameraEngine {
        &self.engine
    }

    pub fn resume(&self) -> CameraResult<()> {
        self.engine.resume()
    }

    pub fn pause(&mut self) {
        self.recording_since = None;
        self.engine.pause();
    }

    /// Open the camera for a preview view of `width`x`height`
    pub fn open(&self, width: u32, height: u32) {
        self.engine.open(width, height);
    }

    /// Everything produced so far, oldest first
    pub fn products(&self) -> Vec<Product> {
        self.collector.snapshot()
    }

    pub fn is_recording(&self) -> bool {
        self.recording_since.is_some()
    }

    /// When the running recording reaches the configured maximum length
    pub fn recording_deadline(&self) -> Option<Instant> {
        let since = self.recording_since?;
        Some(since + self.engine.config().max_video_record_duration())
    }

    // ===== Capture button =====

    /// Short press: take a picture
    pub fn click(&self) {
        if !self.camera_mode.allows_picture() {
            debug!("Picture capture disabled in video mode");
            return;
        }
        self.engine.take_picture();
    }

    /// Long press started: switch to the video flash and start recording
    ///
    /// Returns whether a recording was started. A press while a picture is
    /// still in flight is ignored and keeps the picture flash.
    pub fn long_press_start(&mut self) -> CameraResult<bool> {
        if !self.camera_mode.allows_video() || self.is_recording() {
            return Ok(false);
        }
        if self.engine.is_capturing() {
            debug!("Capture in flight, ignoring long press");
            return Ok(false);
        }

        self.engine.switch_flash(self.video_flash);
        match self.engine.start_video_record() {
            Ok(true) => {
                self.recording_since = Some(Instant::now());
                Ok(true)
            }
            Ok(false) => {
                debug!("Recording start ignored by the camera");
                self.engine.switch_flash(self.flash);
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Failed to start recording");
                self.engine.switch_flash(self.flash);
                Err(e)
            }
        }
    }

    /// Long press released: restore the picture flash and stop recording
    pub fn long_press_stop(&mut self) -> CameraResult<()> {
        if self.recording_since.take().is_none() {
            return Ok(());
        }

        self.engine.switch_flash(self.flash);
        self.engine.stop_video_record()
    }

    /// Stop the recording once it has reached the maximum length
    ///
    /// Meant to be polled while the button is held. Returns true when this
    /// call ended the recording.
    pub fn enforce_max_duration(&mut self) -> CameraResult<bool> {
        match self.recording_deadline() {
            Some(deadline) if Instant::now() >= deadline => {
                info!("Maximum recording length reached");
                self.long_press_stop()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // ===== Controls =====

    /// Flash mode currently applied
    pub fn flash(&self) -> FlashMode {
        if self.is_recording() || self.camera_mode == CameraMode::Video {
            self.video_flash
        } else {
            self.flash
        }
    }

    /// Advance to the next flash mode of the current capture kind
    pub fn cycle_flash(&mut self) -> FlashMode {
        let mode = if self.is_recording() || self.camera_mode == CameraMode::Video {
            self.video_flash = self.video_flash.next_for_video();
            self.video_flash
        } else {
            self.flash = self.flash.next();
            self.flash
        };
        self.engine.switch_flash(mode);
        mode
    }

    /// Toggle between the back and the front camera
    pub fn switch_facing(&mut self) -> Facing {
        self.facing = self.facing.toggled();
        self.engine.switch_facing(self.facing);
        self.facing
    }

    /// Single-finger tap on the preview
    pub fn touch(&self, x: f32, y: f32, view_width: u32, view_height: u32) {
        self.engine.focus_at(x, y, view_width, view_height);
    }

    /// Two-finger move with the current finger spacing
    pub fn pinch(&mut self, spacing: f32) {
        match self.pinch.update(spacing) {
            Some(ZoomStep::In) => self.engine.zoom_in(),
            Some(ZoomStep::Out) => self.engine.zoom_out(),
            None => {}
        }
    }

    pub fn pinch_end(&mut self) {
        self.pinch.reset();
    }

    // ===== Completion =====

    /// Deliver the most recent products, at most `max_product_count`
    ///
    /// Returns false when the receiving side is gone.
    pub fn confirm(mut self) -> bool {
        let Some(tx) = self.completion.take() else {
            return false;
        };
        let mut products = self.collector.snapshot();
        let skip = products.len().saturating_sub(self.max_product_count);
        products.drain(..skip);

        info!(count = products.len(), "Capture flow confirmed");
        tx.send(products).is_ok()
    }

    /// Close the flow without a result
    pub fn cancel(mut self) {
        self.completion.take();
        info!("Capture flow cancelled");
    }
}
