// SPDX-License-Identifier: GPL-3.0-only

//! Camera engine lifecycle manager
//!
//! The engine provides:
//! - Backend selection (once, at construction)
//! - Worker lifecycle across resume/pause
//! - Thread-safe command forwarding to the session worker

use super::hal::Platform;
use super::types::*;
use super::worker::{SessionCommand, SessionWorker};
use super::{
    CameraListener, SessionBackend, SessionResources, get_backend_for_type, select_backend_type,
};
use crate::backends::sensor::OrientationSensorWatcher;
use crate::config::{CameraMode, CaptureOptions, Config};
use crate::constants::worker::THREAD_NAME;
use crate::errors::{CameraError, CameraResult};
use crate::storage::MediaStorage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Internal engine state
struct EngineState {
    /// Running session worker, `None` while paused
    worker: Option<SessionWorker>,
    /// Focus, facing and flash, handed to the backend on every resume
    options: CaptureOptions,
    /// Preview view size of the last `open`, reopened on resume
    view: Option<Resolution>,
}

/// Backend-agnostic camera facade
///
/// Commands return immediately and are executed in order on the session
/// worker; results arrive through the [`CameraListener`]. The recording
/// calls, [`Self::capabilities`] and [`Self::wait_idle`] block until the
/// worker answers and must not be called from inside an async runtime.
/// Called from a listener callback they fail instead of blocking, since the
/// callback itself runs on the worker.
pub struct CameraEngine {
    state: Mutex<EngineState>,
    backend_type: CameraBackendType,
    platform: Platform,
    config: Config,
    listener: Arc<dyn CameraListener>,
    capturing: Arc<AtomicBool>,
    orientation: OrientationSensorWatcher,
    storage: MediaStorage,
}

impl CameraEngine {
    /// Create a paused engine
    ///
    /// # Arguments
    /// * `platform` - Available camera APIs and recorder
    /// * `config` - Initial options, camera mode and output directories
    /// * `listener` - Receives every session event
    pub fn new(
        platform: Platform,
        config: Config,
        listener: Arc<dyn CameraListener>,
    ) -> CameraResult<Self> {
        let backend_type =
            select_backend_type(&platform, config.only_legacy_api, config.capture.facing)?;
        let storage = MediaStorage::new(config.picture_dir(), config.video_dir());
        info!(
            backend = %backend_type,
            pictures = %storage.pictures_dir().display(),
            videos = %storage.videos_dir().display(),
            "Creating camera engine"
        );

        Ok(Self {
            state: Mutex::new(EngineState {
                worker: None,
                options: config.capture,
                view: None,
            }),
            backend_type,
            platform,
            config,
            listener,
            capturing: Arc::new(AtomicBool::new(false)),
            orientation: OrientationSensorWatcher::new(),
            storage,
        })
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn backend_type(&self) -> CameraBackendType {
        self.backend_type
    }

    /// Settings the engine was created with
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &MediaStorage {
        &self.storage
    }

    /// Last requested facing, flash and autofocus settings
    pub fn options(&self) -> CaptureOptions {
        self.state().options
    }

    // ===== Lifecycle =====

    /// Start the session worker, reopening the camera if it was open
    pub fn resume(&self) -> CameraResult<()> {
        let mut state = self.state();
        if state.worker.is_some() {
            debug!("Engine already resumed");
            return Ok(());
        }

        let backend: Box<dyn SessionBackend> =
            get_backend_for_type(self.backend_type, &self.platform, state.options)?;
        let resources = SessionResources {
            listener: Arc::clone(&self.listener),
            capturing: Arc::clone(&self.capturing),
            orientation: self.orientation.handle(),
            storage: self.storage.clone(),
            recorders: Arc::clone(&self.platform.recorder),
            thumbnailer: Arc::clone(&self.platform.thumbnailer),
        };
        let worker = SessionWorker::start(THREAD_NAME, backend, resources)
            .map_err(|e| CameraError::DeviceUnavailable(format!("cannot start worker: {}", e)))?;

        if let Some(view) = state.view {
            worker.send(SessionCommand::Open(view));
        }
        state.worker = Some(worker);
        info!("Camera engine resumed");
        Ok(())
    }

    /// Close the device and join the session worker
    ///
    /// An in-flight recording is dropped and its recorder released. Pending
    /// completions of the closed device are discarded. From a listener
    /// callback the worker is told to shut down but not joined; it closes
    /// the device once the callback returns.
    pub fn pause(&self) {
        let mut state = self.state();
        let Some(mut worker) = state.worker.take() else {
            return;
        };
        if let Some(backend) = worker.stop() {
            state.options = backend.options();
        }
        self.capturing.store(false, Ordering::Release);
        info!("Camera engine paused");
    }

    pub fn is_resumed(&self) -> bool {
        self.state().worker.is_some()
    }

    /// Open the camera for a preview view of `width`x`height`
    ///
    /// Remembered across pause/resume. Completion is signalled through
    /// [`CameraListener::on_flash_support`] or [`CameraListener::on_error`].
    pub fn open(&self, width: u32, height: u32) {
        let view = Resolution::new(width, height);
        let mut state = self.state();
        state.view = Some(view);
        info!(view = %view, "Opening camera");
        Self::forward(&state, SessionCommand::Open(view));
    }

    pub fn close(&self) {
        let mut state = self.state();
        state.view = None;
        Self::forward(&state, SessionCommand::Close);
    }

    // ===== Settings =====

    /// Close and reopen with the camera facing `facing`
    pub fn switch_facing(&self, facing: Facing) {
        let mut state = self.state();
        state.options.facing = facing;
        Self::forward(&state, SessionCommand::SwitchFacing(facing));
    }

    pub fn switch_flash(&self, mode: FlashMode) {
        let mut state = self.state();
        state.options.flash = mode;
        Self::forward(&state, SessionCommand::SwitchFlash(mode));
    }

    pub fn set_auto_focus(&self, enabled: bool) {
        let mut state = self.state();
        state.options.auto_focus = enabled;
        Self::forward(&state, SessionCommand::SetAutoFocus(enabled));
    }

    pub fn is_auto_focus(&self) -> bool {
        self.state().options.auto_focus
    }

    // ===== Capture =====

    /// Capture a still, ignored while a capture or recording is in flight
    pub fn take_picture(&self) {
        Self::forward(&self.state(), SessionCommand::TakePicture);
    }

    /// Start recording
    ///
    /// Returns `Ok(false)` when a capture or recording is already in flight
    /// and the request was ignored.
    pub fn start_video_record(&self) -> CameraResult<bool> {
        if self.on_worker_thread() {
            return Err(CameraError::RecordingStartFailed(
                "cannot start from a listener callback".into(),
            ));
        }
        let (reply, result) = oneshot::channel();
        if !Self::forward(&self.state(), SessionCommand::StartVideo(reply)) {
            return Err(CameraError::RecordingStartFailed("camera is paused".into()));
        }
        result.blocking_recv().unwrap_or_else(|_| {
            Err(CameraError::RecordingStartFailed(
                "session worker stopped".into(),
            ))
        })
    }

    /// Finish the recording
    ///
    /// When the recorder fails to stop (too short a clip) in
    /// [`CameraMode::Both`], a still is taken instead and the failure is not
    /// reported. The recorder is released either way.
    pub fn stop_video_record(&self) -> CameraResult<()> {
        if self.on_worker_thread() {
            return Err(CameraError::RecordingStopFailed(
                "cannot stop from a listener callback".into(),
            ));
        }
        let (reply, result) = oneshot::channel();
        if !Self::forward(&self.state(), SessionCommand::StopVideo(reply)) {
            return Ok(());
        }
        let result = result.blocking_recv().unwrap_or_else(|_| {
            Err(CameraError::RecordingStopFailed(
                "session worker stopped".into(),
            ))
        });

        match result {
            Err(CameraError::RecordingStopFailed(reason))
                if self.config.camera_mode == CameraMode::Both =>
            {
                warn!(%reason, "Recording too short, taking a picture instead");
                self.take_picture();
                Ok(())
            }
            other => other,
        }
    }

    /// True while a still capture or recording is in flight
    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    // ===== Focus and zoom =====

    /// Focus and meter on a touch at (`x`, `y`) of a `view_width`x`view_height` view
    pub fn focus_at(&self, x: f32, y: f32, view_width: u32, view_height: u32) {
        let touch = TouchPoint {
            x,
            y,
            view_width,
            view_height,
        };
        Self::forward(&self.state(), SessionCommand::FocusAt(touch));
    }

    pub fn zoom_in(&self) {
        Self::forward(&self.state(), SessionCommand::Zoom(ZoomStep::In));
    }

    pub fn zoom_out(&self) {
        Self::forward(&self.state(), SessionCommand::Zoom(ZoomStep::Out));
    }

    // ===== Sensors =====

    /// Feed an accelerometer reading
    ///
    /// Quadrant changes are reported through
    /// [`CameraListener::on_sensor_orientation_changed`] and used for the
    /// rotation of later captures.
    pub fn on_accelerometer(&self, x: f32, y: f32) {
        if let Some((old, new)) = self.orientation.process(x, y) {
            self.listener.on_sensor_orientation_changed(old, new);
        }
    }

    pub fn sensor_orientation(&self) -> SensorOrientation {
        self.orientation.current()
    }

    // ===== Queries =====

    /// Capabilities of the open device, `None` while closed or paused
    pub fn capabilities(&self) -> Option<CapabilitySet> {
        if self.on_worker_thread() {
            warn!("Capabilities requested from a listener callback");
            return None;
        }
        let (reply, result) = oneshot::channel();
        if !Self::forward(&self.state(), SessionCommand::Capabilities(reply)) {
            return None;
        }
        result.blocking_recv().ok().flatten()
    }

    /// Block until the worker has handled every queued command and completion
    ///
    /// Returns immediately with `false` while paused or when called from a
    /// listener callback.
    pub fn wait_idle(&self) -> bool {
        let state = self.state();
        match state.worker.as_ref() {
            Some(worker) if worker.is_current_thread() => {
                warn!("wait_idle called from a listener callback");
                false
            }
            Some(worker) => {
                let (reply, done) = oneshot::channel();
                if !worker.request_idle(reply) {
                    return false;
                }
                drop(state);
                done.blocking_recv().is_ok()
            }
            None => false,
        }
    }

    fn on_worker_thread(&self) -> bool {
        self.state()
            .worker
            .as_ref()
            .is_some_and(SessionWorker::is_current_thread)
    }

    /// Queue `command`, returns false while paused
    fn forward(state: &EngineState, command: SessionCommand) -> bool {
        match state.worker.as_ref() {
            Some(worker) => worker.send(command),
            None => {
                debug!(?command, "Engine paused, dropping command");
                false
            }
        }
    }
}

impl Drop for CameraEngine {
    fn drop(&mut self) {
        self.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::hal::HardwareLevel;
    use crate::backends::camera::sim::{SimCamera, SimPlatform};
    use crate::backends::camera::test_support::RecordingListener;

    fn engine(
        name: &str,
        platform: Platform,
        config: Config,
    ) -> (CameraEngine, Arc<RecordingListener>) {
        let dir = std::env::temp_dir().join(format!(
            "camera-engine-manager-{}-{}",
            name,
            std::process::id()
        ));
        let config = Config {
            pictures_dir: Some(dir.join("pictures")),
            videos_dir: Some(dir.join("videos")),
            ..config
        };
        let listener = Arc::new(RecordingListener::default());
        let engine = CameraEngine::new(
            platform,
            config,
            Arc::clone(&listener) as Arc<dyn CameraListener>,
        )
        .unwrap();
        (engine, listener)
    }

    #[test]
    fn test_backend_selection() {
        let sim = SimPlatform::standard();
        let (modern, _) = engine("select-modern", sim.full_platform(), Config::default());
        assert_eq!(modern.backend_type(), CameraBackendType::Modern);

        let config = Config {
            only_legacy_api: true,
            ..Default::default()
        };
        let (forced, _) = engine("select-forced", sim.full_platform(), config);
        assert_eq!(forced.backend_type(), CameraBackendType::Legacy);

        let emulated_sim = SimPlatform::new(vec![
            SimCamera::back().with_hardware_level(HardwareLevel::Legacy),
        ]);
        let (emulated, _) =
            engine("select-emulated", emulated_sim.full_platform(), Config::default());
        assert_eq!(emulated.backend_type(), CameraBackendType::Legacy);
    }

    #[test]
    fn test_no_camera_api_is_rejected() {
        let sim = SimPlatform::standard();
        let platform = Platform {
            legacy: None,
            modern: None,
            ..sim.full_platform()
        };
        let listener = Arc::new(RecordingListener::default());
        let result = CameraEngine::new(platform, Config::default(), listener);
        assert!(matches!(result, Err(CameraError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_commands_while_paused_are_dropped() {
        let sim = SimPlatform::standard();
        let (engine, _) = engine("paused", sim.full_platform(), Config::default());

        engine.open(1280, 720);
        engine.take_picture();
        assert!(!engine.wait_idle());
        assert!(engine.capabilities().is_none());
        assert!(matches!(
            engine.start_video_record(),
            Err(CameraError::RecordingStartFailed(_))
        ));
        assert!(engine.stop_video_record().is_ok());
        assert!(sim.log().entries().is_empty());
    }

    #[test]
    fn test_resume_reopens_last_view() {
        let sim = SimPlatform::standard();
        let (engine, _) = engine("resume", sim.full_platform(), Config::default());
        engine.open(1280, 720);

        engine.resume().unwrap();
        assert!(engine.wait_idle());
        assert!(engine.capabilities().is_some());

        engine.pause();
        assert!(!engine.is_resumed());
        assert_eq!(sim.log().count("modern.close"), 1);

        engine.resume().unwrap();
        engine.wait_idle();
        assert_eq!(sim.log().count("modern.open"), 2);
    }

    #[test]
    fn test_settings_survive_pause() {
        let sim = SimPlatform::standard();
        let (engine, _) = engine("settings", sim.full_platform(), Config::default());
        engine.set_auto_focus(false);
        engine.switch_flash(FlashMode::Torch);
        assert!(!engine.is_auto_focus());

        engine.resume().unwrap();
        engine.open(1280, 720);
        engine.wait_idle();
        assert_eq!(
            sim.log().last("modern.repeating").unwrap(),
            "modern.repeating Preview af=Some(Off) flash=Torch crop=None"
        );

        engine.pause();
        assert_eq!(engine.options().flash, FlashMode::Torch);
        assert!(!engine.options().auto_focus);
    }

    #[test]
    fn test_orientation_changes_reach_listener() {
        use crate::backends::camera::test_support::Event;

        let sim = SimPlatform::standard();
        let (engine, listener) = engine("orientation", sim.full_platform(), Config::default());
        engine.on_accelerometer(0.0, 9.8);
        engine.on_accelerometer(9.8, 0.0);
        engine.on_accelerometer(9.6, 0.3);

        assert_eq!(engine.sensor_orientation(), SensorOrientation::Left);
        assert_eq!(
            listener.events(),
            vec![Event::Orientation(SensorOrientation::Up, SensorOrientation::Left)]
        );
    }
}
