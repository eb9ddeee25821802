// SPDX-License-Identifier: GPL-3.0-only

//! Backend for the synchronous parameter-based camera API
//!
//! The device is configured through a parameter block that is read once when
//! the camera opens and written back after every change. Still capture runs
//! a single auto-focus pass first when autofocus is available and enabled,
//! and fires the capture from its completion. Recording hands the unlocked
//! device to the recorder.

use super::focus_region::{legacy_region, weighted};
use super::hal::{
    HalEvent, LegacyCameraHal, LegacyCameraInfo, LegacyDevice, LegacyParameters, VideoSource,
};
use super::negotiation::optimal_size;
use super::orientation::{capture_rotation, display_orientation};
use super::types::*;
use super::{SessionBackend, SessionContext};
use crate::config::CaptureOptions;
use crate::errors::{CameraError, CameraResult};
use crate::pipelines::video::recorder::VideoRecorder;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Open legacy device and what was negotiated for it
struct LegacySession {
    device: Box<dyn LegacyDevice>,
    params: LegacyParameters,
    info: LegacyCameraInfo,
    capabilities: CapabilitySet,
    view: Resolution,
    video_size: Resolution,
    recorder: Option<VideoRecorder>,
    /// A still capture fires when the running AF pass completes
    capture_after_focus: bool,
    /// Focus mode to restore once a touch AF pass completes
    touch_focus: Option<Option<FocusMode>>,
}

impl LegacySession {
    fn apply(&mut self) -> BackendResult<()> {
        self.device.set_parameters(&self.params)
    }
}

/// Legacy camera API backend
pub struct LegacyBackend {
    hal: Arc<dyn LegacyCameraHal>,
    options: CaptureOptions,
    session: Option<LegacySession>,
}

impl LegacyBackend {
    pub fn new(hal: Arc<dyn LegacyCameraHal>, options: CaptureOptions) -> Self {
        Self {
            hal,
            options,
            session: None,
        }
    }

    /// First camera with the requested facing, else camera 0
    fn find_camera(&self) -> CameraResult<(usize, LegacyCameraInfo)> {
        let count = self.hal.number_of_cameras();
        if count == 0 {
            return Err(CameraError::DeviceUnavailable("no camera found".into()));
        }

        let index = (0..count)
            .find(|&index| {
                self.hal
                    .camera_info(index)
                    .is_ok_and(|info| info.facing == self.options.facing)
            })
            .unwrap_or_else(|| {
                warn!(
                    facing = %self.options.facing,
                    "No camera with requested facing, using camera 0"
                );
                0
            });
        Ok((index, self.hal.camera_info(index)?))
    }

    fn open_session(
        &self,
        view: Resolution,
        ctx: &mut SessionContext,
    ) -> CameraResult<LegacySession> {
        let (index, info) = self.find_camera()?;
        let sink = ctx.new_session();
        let mut device = self.hal.open(index, sink)?;

        match self.configure(device.as_mut(), &info, view, ctx) {
            Ok((params, capabilities, video_size)) => {
                info!(
                    index,
                    facing = %info.facing,
                    preview = ?params.preview_size,
                    picture = ?params.picture_size,
                    video = %video_size,
                    "Legacy camera opened"
                );
                Ok(LegacySession {
                    device,
                    params,
                    info,
                    capabilities,
                    view,
                    video_size,
                    recorder: None,
                    capture_after_focus: false,
                    touch_focus: None,
                })
            }
            Err(e) => {
                device.release();
                Err(e)
            }
        }
    }

    /// Negotiate focus, flash and sizes, then start the preview
    fn configure(
        &self,
        device: &mut dyn LegacyDevice,
        info: &LegacyCameraInfo,
        view: Resolution,
        ctx: &SessionContext,
    ) -> CameraResult<(LegacyParameters, CapabilitySet, Resolution)> {
        let mut params = device.parameters();

        let af_available = params
            .supported_focus_modes
            .iter()
            .any(|mode| *mode != FocusMode::Off);
        if self.options.auto_focus
            && params
                .supported_focus_modes
                .contains(&FocusMode::ContinuousPicture)
        {
            params.focus_mode = Some(FocusMode::ContinuousPicture);
        }
        device.cancel_auto_focus();

        let flash_available = params
            .supported_flash_modes
            .iter()
            .any(|mode| *mode != FlashMode::Off);
        if flash_available {
            params.flash_mode = Some(self.options.flash);
        }

        let preview = optimal_size(&params.supported_preview_sizes, view);
        params.preview_size = Some(preview);
        params.picture_size = Some(optimal_size(&params.supported_picture_sizes, preview));
        let video_sizes = params
            .supported_video_sizes
            .as_deref()
            .unwrap_or(&params.supported_preview_sizes);
        let video_size = optimal_size(video_sizes, preview);

        let capabilities = CapabilitySet {
            af_available,
            flash_available,
            zoom: params
                .zoom_supported
                .then_some(ZoomRange::Index { max: params.max_zoom }),
            supported_flash_modes: params.supported_flash_modes.clone(),
        };

        let degrees = display_orientation(info.orientation, ctx.device_orientation(), info.facing);
        let started = device
            .set_parameters(&params)
            .and_then(|()| device.set_display_orientation(degrees))
            .and_then(|()| device.start_preview());
        if let Err(e) = started {
            return Err(CameraError::SessionConfigurationFailed(e.to_string()));
        }

        ctx.listener().on_flash_support(flash_available);
        Ok((params, capabilities, video_size))
    }

    fn capture_still(session: &mut LegacySession, ctx: &mut SessionContext) {
        let rotation = capture_rotation(
            session.info.orientation,
            ctx.device_orientation(),
            session.info.facing,
        );
        session.params.rotation = rotation;

        let result = session.apply().and_then(|()| session.device.take_picture());
        if let Err(e) = result {
            ctx.set_capturing(false);
            ctx.report_error(e.into());
        } else {
            debug!(rotation, "Still capture requested");
        }
    }

    fn start_recorder(
        session: &mut LegacySession,
        ctx: &SessionContext,
    ) -> CameraResult<VideoRecorder> {
        session
            .device
            .unlock()
            .map_err(|e| CameraError::RecordingStartFailed(e.to_string()))?;
        let output = ctx
            .storage()
            .next_video_path()
            .map_err(|e| CameraError::RecordingStartFailed(e.to_string()))?;
        let orientation = capture_rotation(
            session.info.orientation,
            ctx.device_orientation(),
            session.info.facing,
        );
        let config =
            VideoRecorder::config(VideoSource::Camera, orientation, session.video_size, output);
        VideoRecorder::start(ctx.recorders(), config)
    }

    fn on_auto_focus(session: &mut LegacySession, success: bool, ctx: &mut SessionContext) {
        debug!(success, "Auto-focus pass finished");

        if let Some(mode) = session.touch_focus.take() {
            session.params.focus_mode = mode;
            if let Err(e) = session.apply() {
                warn!(error = %e, "Failed to restore focus mode");
            }
        }

        if std::mem::take(&mut session.capture_after_focus) {
            Self::capture_still(session, ctx);
        }
    }

    fn on_picture(session: &mut LegacySession, jpeg: &[u8], ctx: &mut SessionContext) {
        ctx.deliver_picture(jpeg, session.info.facing == Facing::Front);

        session.device.cancel_auto_focus();
        if let Err(e) = session.device.start_preview() {
            ctx.report_error(CameraError::SessionConfigurationFailed(e.to_string()));
        }
        ctx.set_capturing(false);
    }
}

impl SessionBackend for LegacyBackend {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Legacy
    }

    fn capabilities(&self) -> Option<&CapabilitySet> {
        self.session.as_ref().map(|s| &s.capabilities)
    }

    fn options(&self) -> CaptureOptions {
        self.options
    }

    fn open(&mut self, view: Resolution, ctx: &mut SessionContext) {
        if self.session.is_some() {
            self.close(ctx);
        }

        match self.open_session(view, ctx) {
            Ok(session) => self.session = Some(session),
            Err(e) => {
                ctx.invalidate();
                ctx.report_error(e);
            }
        }
    }

    fn close(&mut self, ctx: &mut SessionContext) {
        ctx.invalidate();
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Some(recorder) = session.recorder.take() {
            warn!(output = %recorder.output().display(), "Closing camera while recording");
            drop(recorder);
            if let Err(e) = session.device.lock() {
                debug!(error = %e, "Failed to lock camera after recording");
            }
        }
        session.device.stop_preview();
        session.device.release();
        ctx.set_capturing(false);
        info!("Legacy camera closed");
    }

    fn switch_facing(&mut self, facing: Facing, ctx: &mut SessionContext) {
        if facing == self.options.facing {
            return;
        }
        self.options.facing = facing;

        if let Some(view) = self.session.as_ref().map(|s| s.view) {
            self.close(ctx);
            self.open(view, ctx);
        }
    }

    fn switch_flash(&mut self, mode: FlashMode, ctx: &mut SessionContext) {
        let Some(session) = self.session.as_mut() else {
            self.options.flash = mode;
            return;
        };
        if !session.capabilities.flash_available {
            debug!(%mode, "Flash unsupported, ignoring");
            return;
        }

        self.options.flash = mode;
        session.params.flash_mode = Some(mode);
        if let Err(e) = session.apply() {
            ctx.report_error(e.into());
        }
    }

    fn set_auto_focus(&mut self, enabled: bool) {
        self.options.auto_focus = enabled;
    }

    fn take_picture(&mut self, ctx: &mut SessionContext) {
        if ctx.is_capturing() {
            debug!("Capture in flight, ignoring picture request");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            warn!("Picture requested without an open camera");
            return;
        };
        ctx.set_capturing(true);

        if session.capabilities.af_available && self.options.auto_focus {
            session.device.cancel_auto_focus();
            session.capture_after_focus = true;
            if let Err(e) = session.device.auto_focus() {
                warn!(error = %e, "Auto-focus failed, capturing without it");
                session.capture_after_focus = false;
                Self::capture_still(session, ctx);
            }
        } else {
            Self::capture_still(session, ctx);
        }
    }

    fn start_video_record(&mut self, ctx: &mut SessionContext) -> CameraResult<bool> {
        if ctx.is_capturing() {
            debug!("Capture in flight, ignoring video request");
            return Ok(false);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(CameraError::RecordingStartFailed("camera is not open".into()));
        };
        ctx.set_capturing(true);

        match Self::start_recorder(session, ctx) {
            Ok(recorder) => {
                session.recorder = Some(recorder);
                Ok(true)
            }
            Err(e) => {
                if let Err(lock_err) = session.device.lock() {
                    debug!(error = %lock_err, "Failed to lock camera after failed start");
                }
                ctx.set_capturing(false);
                Err(e)
            }
        }
    }

    fn stop_video_record(&mut self, ctx: &mut SessionContext) -> CameraResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let Some(recorder) = session.recorder.take() else {
            return Ok(());
        };

        if let Err(e) = session.device.lock() {
            warn!(error = %e, "Failed to take the camera back from the recorder");
        }
        let result = recorder.stop();
        ctx.set_capturing(false);

        let video = result?;
        ctx.deliver_video(&video);
        Ok(())
    }

    fn focus_at(&mut self, touch: TouchPoint, ctx: &mut SessionContext) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.recorder.is_some() {
            debug!("Camera is recording, ignoring focus request");
            return;
        }

        session.device.cancel_auto_focus();
        if session.touch_focus.is_none() {
            session.touch_focus = Some(session.params.focus_mode);
        }

        let region = weighted(legacy_region(&touch));
        if session.params.max_num_focus_areas > 0 {
            session.params.focus_areas = vec![region];
            session.params.focus_mode = Some(FocusMode::Macro);
        }
        if session.params.max_num_metering_areas > 0 {
            session.params.metering_areas = vec![region];
        }
        debug!(rect = ?region.rect, "Focusing on touch");

        let result = session.apply().and_then(|()| session.device.auto_focus());
        if let Err(e) = result {
            warn!(error = %e, "Touch focus failed");
            Self::on_auto_focus(session, false, ctx);
        }
    }

    fn zoom(&mut self, step: ZoomStep, ctx: &mut SessionContext) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.params.zoom_supported {
            return;
        }

        let current = session.params.zoom;
        let Some(level) = current
            .checked_add_signed(step.delta())
            .filter(|level| *level <= session.params.max_zoom)
        else {
            debug!(zoom = current, ?step, "Zoom limit reached");
            return;
        };

        session.params.zoom = level;
        if let Err(e) = session.apply() {
            session.params.zoom = current;
            ctx.report_error(e.into());
        }
    }

    fn handle_event(&mut self, event: HalEvent, ctx: &mut SessionContext) {
        let Some(session) = self.session.as_mut() else {
            trace!(?event, "No open camera, dropping event");
            return;
        };

        match event {
            HalEvent::AutoFocusDone { success } => Self::on_auto_focus(session, success, ctx),
            HalEvent::PictureTaken { jpeg } => Self::on_picture(session, &jpeg, ctx),
            other => trace!(event = ?other, "Ignoring event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::sim::{SimCamera, SimPlatform};
    use crate::backends::camera::test_support::{Event, Harness};

    fn backend(name: &str, sim: &SimPlatform, options: CaptureOptions) -> (LegacyBackend, Harness) {
        let platform = sim.legacy_platform();
        let harness = Harness::new(&format!("legacy-{}", name), &platform);
        let hal = platform.legacy.unwrap();
        (LegacyBackend::new(hal, options), harness)
    }

    fn open(backend: &mut LegacyBackend, h: &mut Harness) {
        backend.open(Resolution::new(1280, 720), &mut h.ctx);
        h.pump(backend);
    }

    #[test]
    fn test_open_negotiates_back_camera() {
        let sim = SimPlatform::standard();
        let (mut backend, mut h) = backend("open", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);

        let caps = backend.capabilities().unwrap();
        assert!(caps.af_available);
        assert!(caps.flash_available);
        assert_eq!(caps.zoom, Some(ZoomRange::Index { max: 30 }));

        let session = backend.session.as_ref().unwrap();
        assert_eq!(session.params.preview_size, Some(Resolution::new(1280, 720)));
        assert_eq!(session.params.focus_mode, Some(FocusMode::ContinuousPicture));
        assert_eq!(session.video_size, Resolution::new(1280, 720));

        let log = sim.log().entries();
        assert_eq!(log[0], "legacy.open 0");
        // Sensor at 90 degrees, device upright
        assert!(log.contains(&"legacy.display_orientation 90".to_string()));
        assert_eq!(log.last().unwrap(), "legacy.start_preview");
        assert_eq!(h.listener.events(), vec![Event::FlashSupport(true)]);
    }

    #[test]
    fn test_picture_waits_for_focus() {
        let sim = SimPlatform::standard();
        let (mut backend, mut h) = backend("af-picture", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);
        sim.log().clear();

        backend.take_picture(&mut h.ctx);
        assert!(h.ctx.is_capturing());
        assert_eq!(sim.log().count("legacy.take_picture"), 0);

        // Focus completion fires the capture, the capture delivers the picture
        h.pump(&mut backend);
        assert_eq!(
            sim.log().entries(),
            vec![
                "legacy.cancel_auto_focus",
                "legacy.auto_focus",
                "legacy.set_parameters focus=Some(ContinuousPicture) flash=Some(Off) zoom=0",
                "legacy.take_picture rotation=90",
                "legacy.cancel_auto_focus",
                "legacy.start_preview",
            ]
        );
        assert!(!h.ctx.is_capturing());
        let pictures = h.listener.pictures();
        assert_eq!(pictures.len(), 1);
        assert!(pictures[0].exists());
    }

    #[test]
    fn test_picture_without_autofocus_captures_directly() {
        let sim = SimPlatform::new(vec![SimCamera::back().without_autofocus()]);
        let (mut backend, mut h) = backend("no-af", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);

        backend.take_picture(&mut h.ctx);
        h.pump(&mut backend);

        assert_eq!(sim.log().count("legacy.auto_focus"), 0);
        assert_eq!(h.listener.pictures().len(), 1);
        assert!(!h.ctx.is_capturing());
    }

    #[test]
    fn test_second_picture_is_ignored_while_capturing() {
        let sim = SimPlatform::standard();
        let (mut backend, mut h) = backend("second", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);

        backend.take_picture(&mut h.ctx);
        backend.take_picture(&mut h.ctx);
        assert_eq!(backend.start_video_record(&mut h.ctx), Ok(false));
        h.pump(&mut backend);

        assert_eq!(sim.log().count("legacy.take_picture"), 1);
        assert_eq!(sim.log().count("recorder.create"), 0);
        assert_eq!(h.listener.pictures().len(), 1);
    }

    #[test]
    fn test_front_camera_is_found_by_facing() {
        let sim = SimPlatform::standard();
        let options = CaptureOptions {
            facing: Facing::Front,
            ..Default::default()
        };
        let (mut backend, mut h) = backend("front", &sim, options);
        open(&mut backend, &mut h);

        assert_eq!(sim.log().entries()[0], "legacy.open 1");
        // (270 + 0 + 180) % 360
        assert_eq!(
            sim.log().last("legacy.display_orientation").unwrap(),
            "legacy.display_orientation 90"
        );
        let caps = backend.capabilities().unwrap();
        assert!(!caps.af_available);
        assert!(!caps.flash_available);
        assert_eq!(caps.zoom, None);
        assert_eq!(h.listener.events(), vec![Event::FlashSupport(false)]);
    }

    #[test]
    fn test_missing_facing_falls_back_to_first_camera() {
        let sim = SimPlatform::new(vec![SimCamera::back()]);
        let options = CaptureOptions {
            facing: Facing::Front,
            ..Default::default()
        };
        let (mut backend, mut h) = backend("fallback", &sim, options);
        open(&mut backend, &mut h);
        assert_eq!(sim.log().entries()[0], "legacy.open 0");
        assert!(backend.capabilities().is_some());
    }

    #[test]
    fn test_open_failure_is_reported() {
        let sim = SimPlatform::standard();
        sim.fail_open(true);
        let (mut backend, mut h) = backend("open-fail", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);

        assert!(backend.capabilities().is_none());
        assert!(matches!(
            h.listener.errors().as_slice(),
            [CameraError::DeviceUnavailable(_)]
        ));
    }

    #[test]
    fn test_video_record_cycle() {
        let sim = SimPlatform::standard();
        let (mut backend, mut h) = backend("video", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);
        sim.log().clear();

        assert!(backend.start_video_record(&mut h.ctx).unwrap());
        assert!(h.ctx.is_capturing());
        backend.take_picture(&mut h.ctx);
        backend.stop_video_record(&mut h.ctx).unwrap();
        assert!(!h.ctx.is_capturing());

        assert_eq!(
            sim.log().entries(),
            vec![
                "legacy.unlock",
                "recorder.create Camera 1280x720 orientation=90",
                "recorder.prepare",
                "recorder.start",
                "legacy.lock",
                "recorder.stop",
                "recorder.release",
            ]
        );
        assert!(matches!(
            h.listener.events().last(),
            Some(Event::Video(video, thumb)) if video.exists() && thumb.exists()
        ));
    }

    #[test]
    fn test_failed_start_releases_and_clears_capturing() {
        let sim = SimPlatform::standard();
        sim.fail_recorder_start(true);
        let (mut backend, mut h) = backend("start-fail", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);

        let err = backend.start_video_record(&mut h.ctx).unwrap_err();
        assert!(matches!(err, CameraError::RecordingStartFailed(_)));
        assert!(!h.ctx.is_capturing());
        assert_eq!(sim.log().count("recorder.release"), 1);
        assert_eq!(sim.log().count("legacy.lock"), 1);
    }

    #[test]
    fn test_failed_stop_still_releases_once() {
        let sim = SimPlatform::standard();
        sim.fail_recorder_stop(true);
        let (mut backend, mut h) = backend("stop-fail", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);

        backend.start_video_record(&mut h.ctx).unwrap();
        let err = backend.stop_video_record(&mut h.ctx).unwrap_err();
        assert!(matches!(err, CameraError::RecordingStopFailed(_)));
        assert!(!h.ctx.is_capturing());
        assert_eq!(sim.log().count("recorder.release"), 1);

        // Nothing left to stop
        assert!(backend.stop_video_record(&mut h.ctx).is_ok());
        assert_eq!(sim.log().count("recorder.stop"), 1);
    }

    #[test]
    fn test_touch_focus_restores_mode() {
        let sim = SimPlatform::standard();
        let (mut backend, mut h) = backend("touch", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);
        sim.log().clear();

        let touch = TouchPoint {
            x: 640.0,
            y: 360.0,
            view_width: 1280,
            view_height: 720,
        };
        backend.focus_at(touch, &mut h.ctx);
        {
            let session = backend.session.as_ref().unwrap();
            assert_eq!(session.params.focus_mode, Some(FocusMode::Macro));
            assert_eq!(session.params.focus_areas.len(), 1);
            assert_eq!(session.params.focus_areas[0].weight, 800);
            assert_eq!(session.params.metering_areas, session.params.focus_areas);
        }

        h.pump(&mut backend);
        let session = backend.session.as_ref().unwrap();
        assert_eq!(session.params.focus_mode, Some(FocusMode::ContinuousPicture));
        assert_eq!(
            sim.log().last("legacy.set_parameters").unwrap(),
            "legacy.set_parameters focus=Some(ContinuousPicture) flash=Some(Off) zoom=0"
        );
    }

    #[test]
    fn test_zoom_steps_within_range() {
        let sim = SimPlatform::standard();
        let (mut backend, mut h) = backend("zoom", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);

        backend.zoom(ZoomStep::Out, &mut h.ctx);
        assert_eq!(backend.session.as_ref().unwrap().params.zoom, 0);

        for _ in 0..40 {
            backend.zoom(ZoomStep::In, &mut h.ctx);
        }
        assert_eq!(backend.session.as_ref().unwrap().params.zoom, 30);

        backend.zoom(ZoomStep::Out, &mut h.ctx);
        assert_eq!(backend.session.as_ref().unwrap().params.zoom, 29);
    }

    #[test]
    fn test_flash_and_facing_switch() {
        let sim = SimPlatform::standard();
        let (mut backend, mut h) = backend("switch", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);

        backend.switch_flash(FlashMode::Torch, &mut h.ctx);
        assert_eq!(
            backend.session.as_ref().unwrap().params.flash_mode,
            Some(FlashMode::Torch)
        );

        sim.log().clear();
        backend.switch_facing(Facing::Front, &mut h.ctx);
        let log = sim.log().entries();
        assert_eq!(&log[..3], ["legacy.stop_preview", "legacy.release", "legacy.open 1"]);
        assert_eq!(sim.log().count("legacy.open"), 1);

        // No flash on the front camera: the request is dropped
        backend.switch_flash(FlashMode::On, &mut h.ctx);
        assert_eq!(backend.options().flash, FlashMode::Torch);

        // Same facing again is a no-op
        sim.log().clear();
        backend.switch_facing(Facing::Front, &mut h.ctx);
        assert!(sim.log().entries().is_empty());
    }

    #[test]
    fn test_close_drops_pending_completions() {
        let sim = SimPlatform::standard();
        let (mut backend, mut h) = backend("late", &sim, CaptureOptions::default());
        open(&mut backend, &mut h);

        backend.take_picture(&mut h.ctx);
        backend.close(&mut h.ctx);
        assert!(!h.ctx.is_capturing());

        // The auto-focus completion belongs to the closed device
        assert_eq!(h.pump(&mut backend), 0);
        assert_eq!(sim.log().count("legacy.take_picture"), 0);
        assert!(h.listener.pictures().is_empty());
    }
}
