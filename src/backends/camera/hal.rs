// SPDX-License-Identifier: GPL-3.0-only

//! Hardware abstraction traits
//!
//! The session backends never talk to a platform camera stack directly. They
//! drive the traits in this module, which platform bindings and the
//! simulator ([`super::sim`]) implement.
//!
//! Hardware completions (auto-focus done, picture data, device and session
//! state, capture results) are not delivered through callbacks. Every device
//! receives an [`EventSink`] when it is opened and posts [`HalEvent`]s into it;
//! the sink forwards them to the session worker stamped with the session
//! generation that was current when the device was opened.

use super::types::{
    BackendResult, CaptureResult, Facing, FlashMode, FocusMode, MeteringRegion, Rect, Resolution,
};
use super::worker::WorkerMessage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// Asynchronous completion reported by a device
#[derive(Debug, Clone, PartialEq)]
pub enum HalEvent {
    // ===== Legacy =====
    /// One-shot auto-focus pass finished
    AutoFocusDone { success: bool },
    /// JPEG data of a still capture
    PictureTaken { jpeg: Vec<u8> },

    // ===== Modern =====
    /// Device finished opening
    DeviceOpened,
    /// Device was taken away (another client, hot unplug)
    DeviceDisconnected,
    /// Device reported a fatal error
    DeviceError(String),
    /// Capture session is ready for requests
    SessionConfigured,
    /// Capture session could not be configured
    SessionConfigureFailed(String),
    /// Metadata of a completed capture request
    CaptureCompleted(CaptureResult),
    /// Still image delivered to the still-capture output
    ImageAvailable { jpeg: Vec<u8> },
}

/// Delivery channel from a device to the session worker
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: UnboundedSender<WorkerMessage>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: UnboundedSender<WorkerMessage>) -> Self {
        Self { generation, tx }
    }

    /// Session generation this sink was issued for
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event for the worker
    pub fn post(&self, event: HalEvent) {
        let message = WorkerMessage::Hardware {
            generation: self.generation,
            event,
        };
        if self.tx.send(message).is_err() {
            trace!(generation = self.generation, "Worker gone, dropping hardware event");
        }
    }
}

// ===== Legacy API =====

/// Static information about a camera of the legacy API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyCameraInfo {
    pub facing: Facing,
    /// Mounting angle of the sensor in degrees
    pub orientation: u32,
}

/// Parameter block of a legacy device
///
/// Read with [`LegacyDevice::parameters`], modified locally and written back
/// with [`LegacyDevice::set_parameters`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacyParameters {
    pub supported_focus_modes: Vec<FocusMode>,
    pub focus_mode: Option<FocusMode>,
    pub supported_flash_modes: Vec<FlashMode>,
    pub flash_mode: Option<FlashMode>,
    pub supported_preview_sizes: Vec<Resolution>,
    pub supported_picture_sizes: Vec<Resolution>,
    /// `None` when the device records at preview sizes
    pub supported_video_sizes: Option<Vec<Resolution>>,
    pub preview_size: Option<Resolution>,
    pub picture_size: Option<Resolution>,
    pub zoom_supported: bool,
    pub max_zoom: u32,
    pub zoom: u32,
    pub max_num_focus_areas: u32,
    pub max_num_metering_areas: u32,
    pub focus_areas: Vec<MeteringRegion>,
    pub metering_areas: Vec<MeteringRegion>,
    /// Rotation written into captured JPEGs
    pub rotation: u32,
}

/// Synchronous camera API
pub trait LegacyCameraHal: Send + Sync {
    /// Number of cameras, addressed by index
    fn number_of_cameras(&self) -> usize;

    /// Facing and mounting angle of the camera at `index`
    fn camera_info(&self, index: usize) -> BackendResult<LegacyCameraInfo>;

    /// Open the camera at `index`
    fn open(&self, index: usize, sink: EventSink) -> BackendResult<Box<dyn LegacyDevice>>;
}

/// An opened legacy camera
pub trait LegacyDevice: Send {
    fn parameters(&self) -> LegacyParameters;
    fn set_parameters(&mut self, params: &LegacyParameters) -> BackendResult<()>;
    fn set_display_orientation(&mut self, degrees: u32) -> BackendResult<()>;
    fn start_preview(&mut self) -> BackendResult<()>;
    fn stop_preview(&mut self);

    /// Start a one-shot AF pass, completion arrives as [`HalEvent::AutoFocusDone`]
    fn auto_focus(&mut self) -> BackendResult<()>;
    fn cancel_auto_focus(&mut self);

    /// Capture a still, data arrives as [`HalEvent::PictureTaken`]
    fn take_picture(&mut self) -> BackendResult<()>;

    /// Hand the device over to the recorder
    fn unlock(&mut self) -> BackendResult<()>;
    /// Take the device back from the recorder
    fn lock(&mut self) -> BackendResult<()>;

    fn release(&mut self);
}

// ===== Session-based API =====

/// Hardware support level of a session-based camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HardwareLevel {
    /// Session API emulated on top of the legacy stack
    Legacy,
    Limited,
    Full,
    Level3,
}

/// Static metadata of a session-based camera
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCharacteristics {
    pub lens_facing: Option<Facing>,
    /// Mounting angle of the sensor in degrees
    pub sensor_orientation: u32,
    pub af_available_modes: Vec<FocusMode>,
    pub flash_available: bool,
    pub max_digital_zoom: Option<f32>,
    pub active_array: Option<Rect>,
    /// Preview output sizes, `None` when no stream configuration is advertised
    pub output_sizes: Option<Vec<Resolution>>,
    pub hardware_level: HardwareLevel,
}

/// Outputs a capture session can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputTarget {
    Preview,
    StillImage,
    Recorder,
}

/// Request templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestTemplate {
    #[default]
    Preview,
    StillCapture,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfTrigger {
    #[default]
    Idle,
    Start,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrecaptureTrigger {
    #[default]
    Idle,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AeMode {
    #[default]
    On,
    OnAutoFlash,
}

/// Flash unit setting of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashSetting {
    #[default]
    Off,
    Single,
    Torch,
}

/// Capture request sent to a session
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<OutputTarget>,
    pub af_mode: Option<FocusMode>,
    pub af_trigger: AfTrigger,
    pub ae_mode: AeMode,
    pub ae_precapture_trigger: PrecaptureTrigger,
    pub flash: FlashSetting,
    pub af_regions: Vec<MeteringRegion>,
    pub ae_regions: Vec<MeteringRegion>,
    pub crop_region: Option<Rect>,
    pub jpeg_orientation: Option<u32>,
}

impl CaptureRequest {
    pub fn new(template: RequestTemplate, targets: Vec<OutputTarget>) -> Self {
        Self {
            template,
            targets,
            ..Default::default()
        }
    }
}

/// Asynchronous session-based camera API
pub trait ModernCameraHal: Send + Sync {
    fn camera_ids(&self) -> BackendResult<Vec<String>>;
    fn characteristics(&self, id: &str) -> BackendResult<CameraCharacteristics>;

    /// Start opening a camera, [`HalEvent::DeviceOpened`] follows
    fn open_camera(&self, id: &str, sink: EventSink) -> BackendResult<Box<dyn ModernDevice>>;
}

/// An opened session-based camera
pub trait ModernDevice: Send {
    /// Replace the capture session, [`HalEvent::SessionConfigured`] follows
    fn create_capture_session(&mut self, outputs: &[OutputTarget]) -> BackendResult<()>;

    /// Install the repeating request, reporting results when `report` is set
    fn set_repeating_request(&mut self, request: &CaptureRequest, report: bool)
    -> BackendResult<()>;
    fn stop_repeating(&mut self) -> BackendResult<()>;

    /// Submit a single request, its result is always reported
    fn capture(&mut self, request: &CaptureRequest) -> BackendResult<()>;

    fn close(&mut self);
}

// ===== Recording =====

/// Where the recorder takes its frames from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSource {
    /// The unlocked legacy camera feeds the recorder directly
    Camera,
    /// The recorder exposes an input the capture session renders into
    Surface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mpeg4,
}

/// Encoder settings of one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    pub source: VideoSource,
    pub orientation_hint: u32,
    pub size: Resolution,
    pub output: PathBuf,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub container: Container,
    pub frame_rate: u32,
    pub bitrate: u32,
}

/// Platform media recorder
pub trait MediaRecorderHal: Send {
    fn prepare(&mut self) -> std::io::Result<()>;
    fn start(&mut self) -> std::io::Result<()>;

    /// Finalize the file, fails with [`BackendError::RecordingTooShort`] when no
    /// frame was written
    ///
    /// [`BackendError::RecordingTooShort`]: super::types::BackendError::RecordingTooShort
    fn stop(&mut self) -> BackendResult<()>;
    fn release(&mut self);
}

/// Creates recorders for a configuration
pub trait RecorderFactory: Send + Sync {
    fn create(&self, config: &RecorderConfig) -> BackendResult<Box<dyn MediaRecorderHal>>;
}

/// Extracts a representative RGB frame from a finished video
pub trait VideoThumbnailer: Send + Sync {
    fn frame_at_start(&self, video: &std::path::Path) -> Option<image::RgbImage>;
}

/// Hardware available to the engine
#[derive(Clone)]
pub struct Platform {
    pub legacy: Option<Arc<dyn LegacyCameraHal>>,
    pub modern: Option<Arc<dyn ModernCameraHal>>,
    pub recorder: Arc<dyn RecorderFactory>,
    pub thumbnailer: Arc<dyn VideoThumbnailer>,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("legacy", &self.legacy.is_some())
            .field("modern", &self.modern.is_some())
            .finish_non_exhaustive()
    }
}
