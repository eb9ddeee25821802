// SPDX-License-Identifier: GPL-3.0-only

//! Simulated camera platform
//!
//! Implements every hardware trait in memory so the engine can run without
//! a camera: the CLI uses it as its only platform and the tests drive the
//! engine against it. Each hardware call is appended to a shared [`SimLog`].
//! Completions are posted to the event sink right away, or held back until
//! [`SimPlatform::flush_deferred`] when deferral is enabled.

use super::hal::{
    AfTrigger, CameraCharacteristics, CaptureRequest, EventSink, HalEvent, HardwareLevel,
    LegacyCameraHal, LegacyCameraInfo, LegacyDevice, LegacyParameters, MediaRecorderHal,
    ModernCameraHal, ModernDevice, OutputTarget, Platform, PrecaptureTrigger, RecorderConfig,
    RecorderFactory, RequestTemplate, VideoThumbnailer,
};
use super::types::{
    AeState, AfState, BackendError, BackendResult, CaptureResult, Facing, FlashMode, FocusMode,
    Rect, Resolution,
};
use crate::constants::encoding::JPEG_QUALITY;
use crate::pipelines::photo::encoding::encode_jpeg;
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Ordered record of hardware calls
#[derive(Debug, Clone, Default)]
pub struct SimLog(Arc<Mutex<Vec<String>>>);

impl SimLog {
    fn push(&self, entry: impl Into<String>) {
        let entry = entry.into();
        debug!(call = %entry, "sim");
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of calls starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    /// Last call starting with `prefix`
    pub fn last(&self, prefix: &str) -> Option<String> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|entry| entry.starts_with(prefix))
            .cloned()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// One simulated camera, exposed through both APIs
#[derive(Debug, Clone, PartialEq)]
pub struct SimCamera {
    pub facing: Facing,
    pub orientation: u32,
    pub af_modes: Vec<FocusMode>,
    pub flash_modes: Vec<FlashMode>,
    pub sizes: Vec<Resolution>,
    pub video_sizes: Option<Vec<Resolution>>,
    /// Legacy zoom index range, 0 when zoom is unsupported
    pub max_zoom: u32,
    pub max_digital_zoom: Option<f32>,
    pub active_array: Rect,
    pub max_focus_areas: u32,
    pub hardware_level: HardwareLevel,
}

impl SimCamera {
    /// Typical back camera: AF, flash, 4x zoom
    pub fn back() -> Self {
        Self {
            facing: Facing::Back,
            orientation: 90,
            af_modes: vec![
                FocusMode::Auto,
                FocusMode::Macro,
                FocusMode::ContinuousPicture,
                FocusMode::ContinuousVideo,
            ],
            flash_modes: FlashMode::ALL.to_vec(),
            sizes: vec![
                Resolution::new(4000, 3000),
                Resolution::new(1920, 1080),
                Resolution::new(1280, 720),
                Resolution::new(640, 480),
            ],
            video_sizes: Some(vec![
                Resolution::new(1920, 1080),
                Resolution::new(1280, 720),
            ]),
            max_zoom: 30,
            max_digital_zoom: Some(4.0),
            active_array: Rect::new(0, 0, 4000, 3000),
            max_focus_areas: 1,
            hardware_level: HardwareLevel::Full,
        }
    }

    /// Typical front camera: fixed focus, no flash, no zoom
    pub fn front() -> Self {
        Self {
            facing: Facing::Front,
            orientation: 270,
            af_modes: vec![FocusMode::Off],
            flash_modes: vec![FlashMode::Off],
            sizes: vec![Resolution::new(1920, 1080), Resolution::new(640, 480)],
            video_sizes: None,
            max_zoom: 0,
            max_digital_zoom: None,
            active_array: Rect::new(0, 0, 1920, 1080),
            max_focus_areas: 0,
            hardware_level: HardwareLevel::Limited,
        }
    }

    pub fn without_autofocus(mut self) -> Self {
        self.af_modes = vec![FocusMode::Off];
        self.max_focus_areas = 0;
        self
    }

    pub fn with_hardware_level(mut self, level: HardwareLevel) -> Self {
        self.hardware_level = level;
        self
    }

    fn legacy_parameters(&self) -> LegacyParameters {
        LegacyParameters {
            supported_focus_modes: self.af_modes.clone(),
            focus_mode: self.af_modes.first().copied(),
            supported_flash_modes: self.flash_modes.clone(),
            flash_mode: Some(FlashMode::Off),
            supported_preview_sizes: self.sizes.clone(),
            supported_picture_sizes: self.sizes.clone(),
            supported_video_sizes: self.video_sizes.clone(),
            zoom_supported: self.max_zoom > 0,
            max_zoom: self.max_zoom,
            max_num_focus_areas: self.max_focus_areas,
            max_num_metering_areas: self.max_focus_areas,
            ..Default::default()
        }
    }

    fn characteristics(&self) -> CameraCharacteristics {
        CameraCharacteristics {
            lens_facing: Some(self.facing),
            sensor_orientation: self.orientation,
            af_available_modes: self.af_modes.clone(),
            flash_available: self.flash_modes.iter().any(|mode| *mode != FlashMode::Off),
            max_digital_zoom: self.max_digital_zoom,
            active_array: Some(self.active_array),
            output_sizes: Some(self.sizes.clone()),
            hardware_level: self.hardware_level,
        }
    }
}

/// Failure injection and scripted hardware responses
#[derive(Debug, Default)]
struct SimControls {
    /// AE states reported after the AF lock, one per capture result
    ae_script: VecDeque<AeState>,
    fail_open: bool,
    fail_session: bool,
    fail_recorder_start: bool,
    fail_recorder_stop: bool,
    defer_events: bool,
    deferred: Vec<(EventSink, HalEvent)>,
}

#[derive(Debug, Default)]
struct SimInner {
    cameras: Vec<SimCamera>,
    log: SimLog,
    controls: Mutex<SimControls>,
}

impl SimInner {
    fn controls(&self) -> MutexGuard<'_, SimControls> {
        self.controls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn camera(&self, index: usize) -> BackendResult<&SimCamera> {
        self.cameras
            .get(index)
            .ok_or_else(|| BackendError::DeviceNotFound(format!("camera {}", index)))
    }

    fn post(&self, sink: &EventSink, event: HalEvent) {
        let mut controls = self.controls();
        if controls.defer_events {
            controls.deferred.push((sink.clone(), event));
        } else {
            drop(controls);
            sink.post(event);
        }
    }
}

/// Simulated platform shared by all simulated devices
#[derive(Debug, Clone, Default)]
pub struct SimPlatform {
    inner: Arc<SimInner>,
}

impl SimPlatform {
    pub fn new(cameras: Vec<SimCamera>) -> Self {
        Self {
            inner: Arc::new(SimInner {
                cameras,
                ..Default::default()
            }),
        }
    }

    /// Back and front camera
    pub fn standard() -> Self {
        Self::new(vec![SimCamera::back(), SimCamera::front()])
    }

    pub fn log(&self) -> &SimLog {
        &self.inner.log
    }

    /// AE states reported one by one once focus has locked
    pub fn script_ae(&self, states: impl IntoIterator<Item = AeState>) {
        self.inner.controls().ae_script = states.into_iter().collect();
    }

    pub fn fail_open(&self, fail: bool) {
        self.inner.controls().fail_open = fail;
    }

    pub fn fail_session(&self, fail: bool) {
        self.inner.controls().fail_session = fail;
    }

    pub fn fail_recorder_start(&self, fail: bool) {
        self.inner.controls().fail_recorder_start = fail;
    }

    pub fn fail_recorder_stop(&self, fail: bool) {
        self.inner.controls().fail_recorder_stop = fail;
    }

    /// Hold completions back until [`Self::flush_deferred`]
    pub fn defer_events(&self, defer: bool) {
        self.inner.controls().defer_events = defer;
    }

    /// Deliver every held-back completion, returns how many were posted
    pub fn flush_deferred(&self) -> usize {
        let deferred = std::mem::take(&mut self.inner.controls().deferred);
        let count = deferred.len();
        for (sink, event) in deferred {
            sink.post(event);
        }
        count
    }

    /// Platform exposing only the legacy API
    pub fn legacy_platform(&self) -> Platform {
        self.platform(true, false)
    }

    /// Platform exposing only the session-based API
    pub fn modern_platform(&self) -> Platform {
        self.platform(false, true)
    }

    /// Platform exposing both APIs
    pub fn full_platform(&self) -> Platform {
        self.platform(true, true)
    }

    fn platform(&self, legacy: bool, modern: bool) -> Platform {
        let hal = Arc::new(SimHal {
            inner: Arc::clone(&self.inner),
        });
        Platform {
            legacy: legacy.then(|| Arc::clone(&hal) as Arc<dyn LegacyCameraHal>),
            modern: modern.then(|| Arc::clone(&hal) as Arc<dyn ModernCameraHal>),
            recorder: Arc::clone(&hal) as Arc<dyn RecorderFactory>,
            thumbnailer: hal,
        }
    }
}

/// Small gradient JPEG standing in for sensor output
fn sample_jpeg() -> Vec<u8> {
    let image = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
    encode_jpeg(&image, JPEG_QUALITY).unwrap_or_default()
}

struct SimHal {
    inner: Arc<SimInner>,
}

// ===== Legacy =====

impl LegacyCameraHal for SimHal {
    fn number_of_cameras(&self) -> usize {
        self.inner.cameras.len()
    }

    fn camera_info(&self, index: usize) -> BackendResult<LegacyCameraInfo> {
        let camera = self.inner.camera(index)?;
        Ok(LegacyCameraInfo {
            facing: camera.facing,
            orientation: camera.orientation,
        })
    }

    fn open(&self, index: usize, sink: EventSink) -> BackendResult<Box<dyn LegacyDevice>> {
        let camera = self.inner.camera(index)?;
        if self.inner.controls().fail_open {
            self.inner.log.push(format!("legacy.open {} failed", index));
            return Err(BackendError::AccessDenied(format!("camera {} is busy", index)));
        }
        self.inner.log.push(format!("legacy.open {}", index));
        Ok(Box::new(SimLegacyDevice {
            inner: Arc::clone(&self.inner),
            sink,
            params: camera.legacy_parameters(),
        }))
    }
}

struct SimLegacyDevice {
    inner: Arc<SimInner>,
    sink: EventSink,
    params: LegacyParameters,
}

impl LegacyDevice for SimLegacyDevice {
    fn parameters(&self) -> LegacyParameters {
        self.params.clone()
    }

    fn set_parameters(&mut self, params: &LegacyParameters) -> BackendResult<()> {
        self.inner.log.push(format!(
            "legacy.set_parameters focus={:?} flash={:?} zoom={}",
            params.focus_mode, params.flash_mode, params.zoom
        ));
        self.params = params.clone();
        Ok(())
    }

    fn set_display_orientation(&mut self, degrees: u32) -> BackendResult<()> {
        self.inner
            .log
            .push(format!("legacy.display_orientation {}", degrees));
        Ok(())
    }

    fn start_preview(&mut self) -> BackendResult<()> {
        self.inner.log.push("legacy.start_preview");
        Ok(())
    }

    fn stop_preview(&mut self) {
        self.inner.log.push("legacy.stop_preview");
    }

    fn auto_focus(&mut self) -> BackendResult<()> {
        self.inner.log.push("legacy.auto_focus");
        self.inner
            .post(&self.sink, HalEvent::AutoFocusDone { success: true });
        Ok(())
    }

    fn cancel_auto_focus(&mut self) {
        self.inner.log.push("legacy.cancel_auto_focus");
    }

    fn take_picture(&mut self) -> BackendResult<()> {
        self.inner
            .log
            .push(format!("legacy.take_picture rotation={}", self.params.rotation));
        self.inner
            .post(&self.sink, HalEvent::PictureTaken { jpeg: sample_jpeg() });
        Ok(())
    }

    fn unlock(&mut self) -> BackendResult<()> {
        self.inner.log.push("legacy.unlock");
        Ok(())
    }

    fn lock(&mut self) -> BackendResult<()> {
        self.inner.log.push("legacy.lock");
        Ok(())
    }

    fn release(&mut self) {
        self.inner.log.push("legacy.release");
    }
}

// ===== Session-based =====

impl ModernCameraHal for SimHal {
    fn camera_ids(&self) -> BackendResult<Vec<String>> {
        Ok((0..self.inner.cameras.len()).map(|i| i.to_string()).collect())
    }

    fn characteristics(&self, id: &str) -> BackendResult<CameraCharacteristics> {
        let index = parse_id(id)?;
        Ok(self.inner.camera(index)?.characteristics())
    }

    fn open_camera(&self, id: &str, sink: EventSink) -> BackendResult<Box<dyn ModernDevice>> {
        let index = parse_id(id)?;
        self.inner.camera(index)?;
        if self.inner.controls().fail_open {
            self.inner.log.push(format!("modern.open {} failed", id));
            return Err(BackendError::AccessDenied(format!("camera {} is busy", id)));
        }
        self.inner.log.push(format!("modern.open {}", id));
        self.inner.post(&sink, HalEvent::DeviceOpened);
        Ok(Box::new(SimModernDevice {
            inner: Arc::clone(&self.inner),
            sink,
        }))
    }
}

fn parse_id(id: &str) -> BackendResult<usize> {
    id.parse()
        .map_err(|_| BackendError::DeviceNotFound(format!("camera {}", id)))
}

struct SimModernDevice {
    inner: Arc<SimInner>,
    sink: EventSink,
}

impl SimModernDevice {
    fn report(&self, af_state: Option<AfState>, ae_state: Option<AeState>) {
        self.inner.post(
            &self.sink,
            HalEvent::CaptureCompleted(CaptureResult { af_state, ae_state }),
        );
    }
}

impl ModernDevice for SimModernDevice {
    fn create_capture_session(&mut self, outputs: &[OutputTarget]) -> BackendResult<()> {
        let names: Vec<String> = outputs.iter().map(|o| format!("{:?}", o)).collect();
        self.inner
            .log
            .push(format!("modern.session {}", names.join("+")));
        if self.inner.controls().fail_session {
            self.inner.post(
                &self.sink,
                HalEvent::SessionConfigureFailed("outputs rejected".into()),
            );
        } else {
            self.inner.post(&self.sink, HalEvent::SessionConfigured);
        }
        Ok(())
    }

    fn set_repeating_request(
        &mut self,
        request: &CaptureRequest,
        report: bool,
    ) -> BackendResult<()> {
        self.inner.log.push(format!(
            "modern.repeating {:?} af={:?} flash={:?} crop={:?}",
            request.template, request.af_mode, request.flash, request.crop_region
        ));
        if report && request.af_trigger == AfTrigger::Start {
            self.report(Some(AfState::FocusedLocked), Some(AeState::Converged));
        }
        Ok(())
    }

    fn stop_repeating(&mut self) -> BackendResult<()> {
        self.inner.log.push("modern.stop_repeating");
        Ok(())
    }

    fn capture(&mut self, request: &CaptureRequest) -> BackendResult<()> {
        if request.template == RequestTemplate::StillCapture {
            self.inner.log.push(format!(
                "modern.capture still orientation={:?} flash={:?}",
                request.jpeg_orientation, request.flash
            ));
            self.inner
                .post(&self.sink, HalEvent::ImageAvailable { jpeg: sample_jpeg() });
            return Ok(());
        }

        self.inner.log.push(format!(
            "modern.capture af_trigger={:?} precapture={:?}",
            request.af_trigger, request.ae_precapture_trigger
        ));
        if request.af_trigger == AfTrigger::Start {
            let ae = self.inner.controls().ae_script.pop_front();
            self.report(
                Some(AfState::FocusedLocked),
                Some(ae.unwrap_or(AeState::Converged)),
            );
        } else if request.ae_precapture_trigger == PrecaptureTrigger::Start {
            let script: Vec<AeState> = self.inner.controls().ae_script.drain(..).collect();
            for ae in script {
                self.report(Some(AfState::FocusedLocked), Some(ae));
            }
            self.report(Some(AfState::FocusedLocked), Some(AeState::Converged));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.inner.log.push("modern.close");
    }
}

// ===== Recording =====

impl RecorderFactory for SimHal {
    fn create(&self, config: &RecorderConfig) -> BackendResult<Box<dyn MediaRecorderHal>> {
        self.inner.log.push(format!(
            "recorder.create {:?} {} orientation={}",
            config.source, config.size, config.orientation_hint
        ));
        Ok(Box::new(SimRecorder {
            inner: Arc::clone(&self.inner),
            output: config.output.clone(),
        }))
    }
}

struct SimRecorder {
    inner: Arc<SimInner>,
    output: std::path::PathBuf,
}

impl MediaRecorderHal for SimRecorder {
    fn prepare(&mut self) -> std::io::Result<()> {
        self.inner.log.push("recorder.prepare");
        if self.inner.controls().fail_recorder_start {
            return Err(std::io::Error::other("encoder unavailable"));
        }
        Ok(())
    }

    fn start(&mut self) -> std::io::Result<()> {
        self.inner.log.push("recorder.start");
        std::fs::write(&self.output, b"simulated mp4")
    }

    fn stop(&mut self) -> BackendResult<()> {
        self.inner.log.push("recorder.stop");
        if self.inner.controls().fail_recorder_stop {
            return Err(BackendError::RecordingTooShort);
        }
        Ok(())
    }

    fn release(&mut self) {
        self.inner.log.push("recorder.release");
    }
}

impl VideoThumbnailer for SimHal {
    fn frame_at_start(&self, video: &Path) -> Option<RgbImage> {
        video
            .exists()
            .then(|| RgbImage::from_pixel(96, 54, Rgb([40, 40, 40])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::worker::WorkerMessage;
    use tokio::sync::mpsc;

    fn sink() -> (EventSink, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink::new(7, tx), rx)
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<WorkerMessage>) -> Option<HalEvent> {
        match rx.try_recv().ok()? {
            WorkerMessage::Hardware { generation, event } => {
                assert_eq!(generation, 7);
                Some(event)
            }
            _ => None,
        }
    }

    #[test]
    fn test_precapture_reports_script_then_converges() {
        let sim = SimPlatform::standard();
        sim.script_ae([AeState::Searching, AeState::Precapture]);
        let (sink, mut rx) = sink();
        let platform = sim.modern_platform();
        let hal = platform.modern.unwrap();
        let mut device = hal.open_camera("0", sink).unwrap();
        assert_eq!(next_event(&mut rx), Some(HalEvent::DeviceOpened));

        let mut lock = CaptureRequest::new(RequestTemplate::Preview, vec![OutputTarget::Preview]);
        lock.af_trigger = AfTrigger::Start;
        device.capture(&lock).unwrap();
        let Some(HalEvent::CaptureCompleted(result)) = next_event(&mut rx) else {
            panic!("expected a capture result");
        };
        assert_eq!(result.ae_state, Some(AeState::Searching));

        let mut precapture =
            CaptureRequest::new(RequestTemplate::Preview, vec![OutputTarget::Preview]);
        precapture.ae_precapture_trigger = PrecaptureTrigger::Start;
        device.capture(&precapture).unwrap();
        let states: Vec<_> = std::iter::from_fn(|| next_event(&mut rx))
            .filter_map(|event| match event {
                HalEvent::CaptureCompleted(result) => result.ae_state,
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![AeState::Precapture, AeState::Converged]);
    }

    #[test]
    fn test_deferred_events_wait_for_flush() {
        let sim = SimPlatform::standard();
        sim.defer_events(true);
        let (sink, mut rx) = sink();
        let platform = sim.legacy_platform();
        let mut device = platform.legacy.unwrap().open(0, sink).unwrap();

        device.take_picture().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(sim.flush_deferred(), 1);
        assert!(matches!(
            next_event(&mut rx),
            Some(HalEvent::PictureTaken { .. })
        ));
    }

    #[test]
    fn test_characteristics_follow_camera() {
        let sim = SimPlatform::standard();
        let platform = sim.modern_platform();
        let hal = platform.modern.unwrap();
        assert_eq!(hal.camera_ids().unwrap(), vec!["0", "1"]);

        let back = hal.characteristics("0").unwrap();
        assert!(back.flash_available);
        assert_eq!(back.lens_facing, Some(Facing::Back));
        let front = hal.characteristics("1").unwrap();
        assert!(!front.flash_available);
        assert!(hal.characteristics("9").is_err());
    }
}
