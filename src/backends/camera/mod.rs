// SPDX-License-Identifier: GPL-3.0-only

//! Camera session backends
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   Host application  │
//! └──────────┬──────────┘
//!            │ commands            ▲ CameraListener events
//!            ▼                     │
//! ┌─────────────────────┐          │
//! │    CameraEngine     │  ← Facade, backend selection, worker lifecycle
//! └──────────┬──────────┘          │
//!            │ WorkerMessage       │
//!            ▼                     │
//! ┌─────────────────────┐          │
//! │   SessionWorker     │──────────┘  ← Owns the device, one thread
//! └──────────┬──────────┘
//!            ▼
//! ┌─────────────────────┐
//! │ SessionBackend Trait│  ← Common interface
//! └──────────┬──────────┘
//!       ┌────┴─────┐
//!       ▼          ▼
//!   ┌──────┐   ┌──────┐
//!   │Legacy│   │Modern│   ← Drive the HAL traits
//!   └──────┘   └──────┘
//! ```

pub mod focus_region;
pub mod hal;
pub mod legacy;
pub mod manager;
pub mod modern;
pub mod negotiation;
pub mod orientation;
pub mod sim;
#[cfg(test)]
pub(crate) mod test_support;
pub mod types;
pub mod worker;

pub use manager::CameraEngine;
pub use types::*;

use crate::backends::sensor::OrientationHandle;
use crate::config::CaptureOptions;
use crate::errors::{CameraError, CameraResult};
use crate::pipelines::photo::encoding;
use crate::storage::MediaStorage;
use hal::{EventSink, HalEvent, HardwareLevel, Platform, RecorderFactory, VideoThumbnailer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};
use worker::WorkerMessage;

/// Events the engine reports to its host
///
/// Called from the session worker thread.
pub trait CameraListener: Send + Sync {
    /// Whether the opened camera has a usable flash
    fn on_flash_support(&self, _supported: bool) {}

    /// Device orientation crossed into a new quadrant
    fn on_sensor_orientation_changed(&self, _old: SensorOrientation, _new: SensorOrientation) {}

    /// Device or session failure; the session stays closed until reopened
    fn on_error(&self, error: CameraError);

    fn on_picture_taken(&self, picture: &Path, thumbnail: &Path);

    fn on_video_recorded(&self, video: &Path, thumbnail: &Path);
}

/// Collaborators handed from the engine to the session worker
#[derive(Clone)]
pub struct SessionResources {
    pub listener: Arc<dyn CameraListener>,
    /// Written only by the worker
    pub capturing: Arc<AtomicBool>,
    pub orientation: OrientationHandle,
    pub storage: MediaStorage,
    pub recorders: Arc<dyn RecorderFactory>,
    pub thumbnailer: Arc<dyn VideoThumbnailer>,
}

/// Worker-side state shared by every backend call
///
/// Tracks the session generation: a new generation starts whenever a device
/// is opened or closed, and hardware events stamped with an older
/// generation never reach the backend.
pub struct SessionContext {
    resources: SessionResources,
    tx: UnboundedSender<WorkerMessage>,
    generation: u64,
}

impl SessionContext {
    pub(crate) fn new(resources: SessionResources, tx: UnboundedSender<WorkerMessage>) -> Self {
        Self {
            resources,
            tx,
            generation: 0,
        }
    }

    /// Start a new generation and return a sink bound to it
    pub fn new_session(&mut self) -> EventSink {
        self.generation += 1;
        EventSink::new(self.generation, self.tx.clone())
    }

    /// Start a new generation, dropping every completion still in flight
    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub fn listener(&self) -> &dyn CameraListener {
        self.resources.listener.as_ref()
    }

    pub fn report_error(&self, err: CameraError) {
        error!(error = %err, "Camera session error");
        self.resources.listener.on_error(err);
    }

    pub fn is_capturing(&self) -> bool {
        self.resources.capturing.load(Ordering::Acquire)
    }

    pub fn set_capturing(&self, capturing: bool) {
        self.resources.capturing.store(capturing, Ordering::Release);
    }

    pub fn device_orientation(&self) -> SensorOrientation {
        self.resources.orientation.get()
    }

    pub fn storage(&self) -> &MediaStorage {
        &self.resources.storage
    }

    pub fn recorders(&self) -> &dyn RecorderFactory {
        self.resources.recorders.as_ref()
    }

    /// Persist a still capture with its thumbnail and announce it
    pub fn deliver_picture(&self, jpeg: &[u8], mirror: bool) {
        match self.save_picture(jpeg, mirror) {
            Ok((picture, thumbnail)) => self.listener().on_picture_taken(&picture, &thumbnail),
            Err(e) => self.report_error(e),
        }
    }

    fn save_picture(&self, jpeg: &[u8], mirror: bool) -> CameraResult<(PathBuf, PathBuf)> {
        let picture = self.storage().next_picture_path()?;
        encoding::save_picture(jpeg, &picture, mirror)?;
        let thumbnail = encoding::picture_thumbnail(&picture)?;
        Ok((picture, thumbnail))
    }

    /// Write the thumbnail of a finished recording and announce it
    pub fn deliver_video(&self, video: &Path) {
        let frame = self.resources.thumbnailer.frame_at_start(video);
        match encoding::video_thumbnail(video, frame) {
            Ok(thumbnail) => self.listener().on_video_recorded(video, &thumbnail),
            Err(e) => self.report_error(e),
        }
    }
}

/// Device session behind the engine
///
/// Every method runs on the session worker. Failures of asynchronous
/// operations are reported through [`SessionContext::report_error`]; only
/// the recording calls return them.
pub trait SessionBackend: Send {
    // ===== Metadata =====

    fn backend_type(&self) -> CameraBackendType;

    /// Capabilities of the open device, `None` while closed
    fn capabilities(&self) -> Option<&CapabilitySet>;

    /// Current facing, flash and autofocus settings
    fn options(&self) -> CaptureOptions;

    // ===== Lifecycle =====

    /// Open the camera matching the current facing and start the preview
    ///
    /// # Arguments
    /// * `view` - Size of the preview view, used for size negotiation
    fn open(&mut self, view: Resolution, ctx: &mut SessionContext);

    /// Release the device and everything attached to it
    ///
    /// An in-flight recording is dropped and pending completions are
    /// invalidated.
    fn close(&mut self, ctx: &mut SessionContext);

    /// Close and reopen with another camera when `facing` differs
    fn switch_facing(&mut self, facing: Facing, ctx: &mut SessionContext);

    // ===== Settings =====

    /// Apply a flash mode, ignored when the device has no flash
    fn switch_flash(&mut self, mode: FlashMode, ctx: &mut SessionContext);

    fn set_auto_focus(&mut self, enabled: bool);

    // ===== Capture =====

    /// Capture a still, no-op while a capture or recording is in flight
    fn take_picture(&mut self, ctx: &mut SessionContext);

    /// Start recording, `Ok(false)` when ignored because a capture or
    /// recording is in flight
    fn start_video_record(&mut self, ctx: &mut SessionContext) -> CameraResult<bool>;

    /// Finish the recording, no-op when nothing is being recorded
    fn stop_video_record(&mut self, ctx: &mut SessionContext) -> CameraResult<()>;

    // ===== Focus and zoom =====

    fn focus_at(&mut self, touch: TouchPoint, ctx: &mut SessionContext);

    fn zoom(&mut self, step: ZoomStep, ctx: &mut SessionContext);

    // ===== Hardware =====

    /// Completion from the current device generation
    fn handle_event(&mut self, event: HalEvent, ctx: &mut SessionContext);
}

/// Decide which API drives the camera
///
/// The session-based API is used unless disabled, or unless the camera
/// matching `facing` only emulates it on top of the legacy stack.
pub fn select_backend_type(
    platform: &Platform,
    only_legacy: bool,
    facing: Facing,
) -> CameraResult<CameraBackendType> {
    if platform.legacy.is_none() && platform.modern.is_none() {
        return Err(CameraError::DeviceUnavailable(
            "no camera service available".into(),
        ));
    }

    let use_modern = !only_legacy
        && platform
            .modern
            .as_ref()
            .is_some_and(|hal| modern_supported(hal.as_ref(), facing));

    let backend_type = if use_modern || platform.legacy.is_none() {
        CameraBackendType::Modern
    } else {
        CameraBackendType::Legacy
    };
    info!(backend = %backend_type, only_legacy, %facing, "Selected camera backend");
    Ok(backend_type)
}

fn modern_supported(hal: &dyn hal::ModernCameraHal, facing: Facing) -> bool {
    let ids = match hal.camera_ids() {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "Cannot list session-based cameras");
            return false;
        }
    };
    ids.iter()
        .filter_map(|id| hal.characteristics(id).ok())
        .find(|c| c.lens_facing == Some(facing))
        .is_some_and(|c| c.hardware_level > HardwareLevel::Legacy)
}

/// Instantiate the backend for `backend_type`
pub fn get_backend_for_type(
    backend_type: CameraBackendType,
    platform: &Platform,
    options: CaptureOptions,
) -> CameraResult<Box<dyn SessionBackend>> {
    match backend_type {
        CameraBackendType::Legacy => match platform.legacy.clone() {
            Some(hal) => Ok(Box::new(legacy::LegacyBackend::new(hal, options))),
            None => Err(CameraError::DeviceUnavailable(
                "legacy camera API unavailable".into(),
            )),
        },
        CameraBackendType::Modern => match platform.modern.clone() {
            Some(hal) => Ok(Box::new(modern::ModernBackend::new(hal, options))),
            None => Err(CameraError::DeviceUnavailable(
                "session-based camera API unavailable".into(),
            )),
        },
    }
}
