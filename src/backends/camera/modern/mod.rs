// SPDX-License-Identifier: GPL-3.0-only

//! Backend for the asynchronous session-based camera API
//!
//! Opening is a chain of completions: the device opens, then a capture
//! session with a preview and a still-image output is configured, then the
//! repeating preview request is installed. Still captures are sequenced by
//! the [`FocusMeteringStateMachine`]. Recording swaps the still-image output
//! for the recorder input and recreates the session.

pub mod focus_metering;
pub mod zoom;

pub use focus_metering::{FocusMeteringAction, FocusMeteringState, FocusMeteringStateMachine};
pub use zoom::CropZoom;

use super::focus_region::{active_array_region, weighted};
use super::hal::{
    AeMode, AfTrigger, CameraCharacteristics, CaptureRequest, FlashSetting, HalEvent,
    ModernCameraHal, ModernDevice, OutputTarget, PrecaptureTrigger, RequestTemplate, VideoSource,
};
use super::negotiation::optimal_size;
use super::orientation::capture_rotation;
use super::types::*;
use super::{SessionBackend, SessionContext};
use crate::config::CaptureOptions;
use crate::constants::sizing::{MAX_PREVIEW_HEIGHT, MAX_PREVIEW_WIDTH};
use crate::errors::{CameraError, CameraResult};
use crate::pipelines::video::recorder::VideoRecorder;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// AE mode and flash unit setting for a flash mode
pub fn flash_settings(mode: FlashMode) -> (AeMode, FlashSetting) {
    match mode {
        FlashMode::Off => (AeMode::On, FlashSetting::Off),
        FlashMode::On => (AeMode::On, FlashSetting::Single),
        FlashMode::Torch => (AeMode::On, FlashSetting::Torch),
        FlashMode::Auto => (AeMode::OnAutoFlash, FlashSetting::Single),
    }
}

fn apply_flash(request: &mut CaptureRequest, mode: FlashMode) {
    let (ae_mode, flash) = flash_settings(mode);
    request.ae_mode = ae_mode;
    request.flash = flash;
}

struct ModernSession {
    device: Box<dyn ModernDevice>,
    characteristics: CameraCharacteristics,
    capabilities: CapabilitySet,
    facing: Facing,
    view: Resolution,
    preview_size: Resolution,
    /// Template of the repeating request, rebuilt with every session
    preview: CaptureRequest,
    /// Repeating request installed and accepting captures
    configured: bool,
    recorder: Option<VideoRecorder>,
    focus: FocusMeteringStateMachine,
    /// The pending still capture locked focus first
    af_engaged: bool,
    touch_focus_pending: bool,
    zoom: Option<CropZoom>,
}

impl ModernSession {
    fn is_recording(&self) -> bool {
        self.preview.template == RequestTemplate::Record
    }

    fn still_rotation(&self, ctx: &SessionContext) -> u32 {
        capture_rotation(
            self.characteristics.sensor_orientation,
            ctx.device_orientation(),
            self.facing,
        )
    }

    /// Replace the capture session, [`HalEvent::SessionConfigured`] follows
    fn create_session(&mut self, template: RequestTemplate, ctx: &SessionContext) {
        self.focus.reset();
        if self.configured {
            if let Err(e) = self.device.stop_repeating() {
                debug!(error = %e, "Failed to stop repeating request");
            }
            self.configured = false;
        }

        let (outputs, targets) = match template {
            RequestTemplate::Record => (
                vec![OutputTarget::Preview, OutputTarget::Recorder],
                vec![OutputTarget::Preview, OutputTarget::Recorder],
            ),
            _ => (
                vec![OutputTarget::Preview, OutputTarget::StillImage],
                vec![OutputTarget::Preview],
            ),
        };
        let mut preview = CaptureRequest::new(template, targets);
        preview.crop_region = self.zoom.and_then(|zoom| zoom.crop_region());
        self.preview = preview;

        debug!(?template, ?outputs, "Creating capture session");
        if let Err(e) = self.device.create_capture_session(&outputs) {
            ctx.report_error(CameraError::SessionConfigurationFailed(e.to_string()));
        }
    }

    /// Reinstall the repeating request with the current focus and flash
    fn update_preview(&mut self, options: &CaptureOptions, ctx: &SessionContext) {
        let recording = self.is_recording();
        self.preview.af_mode = Some(if self.capabilities.af_available && options.auto_focus {
            if recording {
                FocusMode::ContinuousVideo
            } else {
                FocusMode::ContinuousPicture
            }
        } else {
            FocusMode::Off
        });
        apply_flash(&mut self.preview, options.flash);

        if let Err(e) = self.device.set_repeating_request(&self.preview, !recording) {
            ctx.report_error(CameraError::SessionConfigurationFailed(e.to_string()));
        }
    }

    fn capture_still(&mut self, options: &CaptureOptions, ctx: &mut SessionContext) {
        let mut request =
            CaptureRequest::new(RequestTemplate::StillCapture, vec![OutputTarget::StillImage]);
        request.af_mode = self.preview.af_mode;
        request.crop_region = self.preview.crop_region;
        request.jpeg_orientation = Some(self.still_rotation(ctx));
        apply_flash(&mut request, options.flash);

        if let Err(e) = self.device.capture(&request) {
            self.abort_capture(ctx, e.into());
        }
    }

    fn run_precapture(&mut self, ctx: &mut SessionContext) {
        let mut request = self.preview.clone();
        request.ae_precapture_trigger = PrecaptureTrigger::Start;
        match self.device.capture(&request) {
            Ok(()) => self.focus.precapture_started(),
            Err(e) => self.abort_capture(ctx, e.into()),
        }
    }

    /// Cancel the AF lock and go back to continuous focus
    fn unlock_focus(&mut self, options: &CaptureOptions, ctx: &SessionContext) {
        let mut request = self.preview.clone();
        request.af_trigger = AfTrigger::Cancel;
        if let Err(e) = self.device.capture(&request) {
            warn!(error = %e, "Failed to cancel focus lock");
        }
        self.update_preview(options, ctx);
    }

    fn abort_capture(&mut self, ctx: &mut SessionContext, err: CameraError) {
        self.focus.reset();
        self.af_engaged = false;
        ctx.set_capturing(false);
        ctx.report_error(err);
    }
}

/// Session-based camera API backend
pub struct ModernBackend {
    hal: Arc<dyn ModernCameraHal>,
    options: CaptureOptions,
    session: Option<ModernSession>,
}

impl ModernBackend {
    pub fn new(hal: Arc<dyn ModernCameraHal>, options: CaptureOptions) -> Self {
        Self {
            hal,
            options,
            session: None,
        }
    }

    /// Focus/metering progress of the open session
    pub fn focus_state(&self) -> Option<FocusMeteringState> {
        self.session.as_ref().map(|s| s.focus.state())
    }

    /// First camera with the requested facing, else the first camera
    fn find_camera(&self) -> CameraResult<(String, CameraCharacteristics)> {
        let ids = self.hal.camera_ids()?;
        let Some(first) = ids.first() else {
            return Err(CameraError::DeviceUnavailable("no camera found".into()));
        };

        for id in &ids {
            match self.hal.characteristics(id) {
                Ok(c) if c.lens_facing == Some(self.options.facing) => return Ok((id.clone(), c)),
                Ok(_) => {}
                Err(e) => debug!(id = %id, error = %e, "Skipping camera"),
            }
        }

        warn!(
            facing = %self.options.facing,
            "No camera with requested facing, using the first one"
        );
        Ok((first.clone(), self.hal.characteristics(first)?))
    }

    fn open_session(
        &self,
        view: Resolution,
        ctx: &mut SessionContext,
    ) -> CameraResult<ModernSession> {
        let (id, characteristics) = self.find_camera()?;

        let Some(sizes) = characteristics.output_sizes.as_deref() else {
            return Err(CameraError::SessionConfigurationFailed(
                "camera advertises no stream configuration".into(),
            ));
        };
        let preview_size =
            optimal_size(sizes, Resolution::new(MAX_PREVIEW_WIDTH, MAX_PREVIEW_HEIGHT));

        let flash_available = characteristics.flash_available;
        let af_available = characteristics
            .af_available_modes
            .iter()
            .any(|mode| *mode != FocusMode::Off);
        let zoom = CropZoom::new(characteristics.max_digital_zoom, characteristics.active_array);
        let capabilities = CapabilitySet {
            af_available,
            flash_available,
            zoom: zoom
                .and(characteristics.max_digital_zoom)
                .map(|max_ratio| ZoomRange::Crop { max_ratio }),
            supported_flash_modes: if flash_available {
                FlashMode::ALL.to_vec()
            } else {
                vec![FlashMode::Off]
            },
        };
        ctx.listener().on_flash_support(flash_available);

        let sink = ctx.new_session();
        let device = self.hal.open_camera(&id, sink)?;
        info!(
            id = %id,
            facing = %self.options.facing,
            preview = %preview_size,
            af_available,
            flash_available,
            "Opening camera"
        );

        Ok(ModernSession {
            device,
            facing: characteristics.lens_facing.unwrap_or(self.options.facing),
            characteristics,
            capabilities,
            view,
            preview_size,
            preview: CaptureRequest::default(),
            configured: false,
            recorder: None,
            focus: FocusMeteringStateMachine::new(),
            af_engaged: false,
            touch_focus_pending: false,
            zoom,
        })
    }

    fn on_capture_result(&mut self, result: CaptureResult, ctx: &mut SessionContext) {
        let options = self.options;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.focus.is_active() {
            match session.focus.process(&result) {
                FocusMeteringAction::None => {}
                FocusMeteringAction::RunPrecapture => session.run_precapture(ctx),
                FocusMeteringAction::CaptureStill => session.capture_still(&options, ctx),
            }
        } else if session.touch_focus_pending && result.af_state.is_some_and(|af| af.is_locked()) {
            debug!(af = ?result.af_state, "Touch focus finished");
            session.touch_focus_pending = false;
            session.unlock_focus(&options, ctx);
        }
    }

    fn on_image(&mut self, jpeg: &[u8], ctx: &mut SessionContext) {
        let options = self.options;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        ctx.deliver_picture(jpeg, session.facing == Facing::Front);
        if std::mem::take(&mut session.af_engaged) {
            session.unlock_focus(&options, ctx);
        }
        session.focus.reset();
        ctx.set_capturing(false);
    }

    /// Drop the device after a failure and tell the host
    fn fail(&mut self, err: CameraError, ctx: &mut SessionContext) {
        self.close(ctx);
        ctx.report_error(err);
    }
}

impl SessionBackend for ModernBackend {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Modern
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
        }
        if session.configured
            && let Err(e) = session.device.stop_repeating()
        {
            debug!(error = %e, "Failed to stop repeating request");
        }
        session.device.close();
        ctx.set_capturing(false);
        info!("Camera closed");
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
        if session.configured {
            session.update_preview(&self.options, ctx);
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
        let options = self.options;
        let Some(session) = self.session.as_mut().filter(|s| s.configured) else {
            warn!("Picture requested before the session is ready");
            return;
        };
        ctx.set_capturing(true);

        if session.capabilities.af_available && options.auto_focus {
            let mut request = session.preview.clone();
            request.af_trigger = AfTrigger::Start;
            match session.device.capture(&request) {
                Ok(()) => {
                    session.af_engaged = true;
                    session.focus.start_locking();
                }
                Err(e) => session.abort_capture(ctx, e.into()),
            }
        } else {
            session.focus.capture_directly();
            session.capture_still(&options, ctx);
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

        let started = ctx
            .storage()
            .next_video_path()
            .map_err(|e| CameraError::RecordingStartFailed(e.to_string()))
            .and_then(|output| {
                let config = VideoRecorder::config(
                    VideoSource::Surface,
                    session.still_rotation(ctx),
                    session.preview_size,
                    output,
                );
                VideoRecorder::start(ctx.recorders(), config)
            });

        match started {
            Ok(recorder) => {
                session.recorder = Some(recorder);
                session.create_session(RequestTemplate::Record, ctx);
                Ok(true)
            }
            Err(e) => {
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

        let result = recorder.stop();
        session.create_session(RequestTemplate::Preview, ctx);
        ctx.set_capturing(false);

        let video = result?;
        ctx.deliver_video(&video);
        Ok(())
    }

    fn focus_at(&mut self, touch: TouchPoint, ctx: &mut SessionContext) {
        let Some(session) = self.session.as_mut().filter(|s| s.configured) else {
            return;
        };
        if session.focus.is_active() {
            debug!("Still capture in flight, ignoring focus request");
            return;
        }
        let Some(active_array) = session.characteristics.active_array else {
            return;
        };

        let region = weighted(active_array_region(&touch, &active_array));
        debug!(rect = ?region.rect, "Focusing on touch");

        let preview = &mut session.preview;
        preview.af_regions = vec![region];
        preview.ae_regions = vec![region];
        preview.af_mode = Some(FocusMode::Auto);
        preview.af_trigger = AfTrigger::Start;
        preview.ae_precapture_trigger = PrecaptureTrigger::Start;
        let result = session.device.set_repeating_request(&session.preview, true);

        session.preview.af_trigger = AfTrigger::Idle;
        session.preview.ae_precapture_trigger = PrecaptureTrigger::Idle;
        match result {
            Ok(()) => session.touch_focus_pending = true,
            Err(e) => {
                warn!(error = %e, "Touch focus failed");
                session.update_preview(&self.options, ctx);
            }
        }
    }

    fn zoom(&mut self, step: ZoomStep, ctx: &mut SessionContext) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(zoom) = session.zoom.as_mut() else {
            return;
        };
        if !zoom.step(step) {
            return;
        }

        session.preview.crop_region = zoom.crop_region();
        trace!(level = zoom.level(), crop = ?session.preview.crop_region, "Zoom");
        if session.configured {
            session.update_preview(&self.options, ctx);
        }
    }

    fn handle_event(&mut self, event: HalEvent, ctx: &mut SessionContext) {
        let options = self.options;
        match event {
            HalEvent::DeviceOpened => {
                if let Some(session) = self.session.as_mut() {
                    session.create_session(RequestTemplate::Preview, ctx);
                }
            }
            HalEvent::DeviceDisconnected => {
                self.fail(CameraError::DeviceUnavailable("camera disconnected".into()), ctx);
            }
            HalEvent::DeviceError(message) => {
                self.fail(CameraError::DeviceUnavailable(message), ctx);
            }
            HalEvent::SessionConfigured => {
                if let Some(session) = self.session.as_mut() {
                    session.configured = true;
                    session.update_preview(&options, ctx);
                }
            }
            HalEvent::SessionConfigureFailed(message) => {
                self.fail(CameraError::SessionConfigurationFailed(message), ctx);
            }
            HalEvent::CaptureCompleted(result) => self.on_capture_result(result, ctx),
            HalEvent::ImageAvailable { jpeg } => self.on_image(&jpeg, ctx),
            other => trace!(event = ?other, "Ignoring event"),
        }
    }
}
