// SPDX-License-Identifier: GPL-3.0-only

//! Video recording session
//!
//! Wraps one platform recorder for the duration of a single recording. The
//! encoder settings are fixed: H.264 video and AAC audio in an MP4 container
//! at 30 fps with a 6 MiB/s budget. The platform recorder is released exactly
//! once, whichever way the recording ends.

use crate::backends::camera::hal::{
    AudioCodec, Container, MediaRecorderHal, RecorderConfig, RecorderFactory, VideoCodec,
    VideoSource,
};
use crate::backends::camera::types::{BackendError, Resolution};
use crate::constants::recording::{FRAME_RATE, VIDEO_BITRATE};
use crate::errors::{CameraError, CameraResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Recorder owned by an in-flight recording
pub struct VideoRecorder {
    recorder: Option<Box<dyn MediaRecorderHal>>,
    config: RecorderConfig,
}

impl std::fmt::Debug for VideoRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoRecorder")
            .field("config", &self.config)
            .field("released", &self.recorder.is_none())
            .finish()
    }
}

impl VideoRecorder {
    /// Fixed encoder policy for a recording
    pub fn config(
        source: VideoSource,
        orientation_hint: u32,
        size: Resolution,
        output: PathBuf,
    ) -> RecorderConfig {
        RecorderConfig {
            source,
            orientation_hint,
            size,
            output,
            video_codec: VideoCodec::H264,
            audio_codec: AudioCodec::Aac,
            container: Container::Mpeg4,
            frame_rate: FRAME_RATE,
            bitrate: VIDEO_BITRATE,
        }
    }

    /// Create and start a recorder
    ///
    /// Nothing stays allocated when this fails.
    pub fn start(factory: &dyn RecorderFactory, config: RecorderConfig) -> CameraResult<Self> {
        info!(
            output = %config.output.display(),
            size = %config.size,
            orientation = config.orientation_hint,
            source = ?config.source,
            "Starting video recorder"
        );

        let recorder = factory
            .create(&config)
            .map_err(|e| CameraError::RecordingStartFailed(e.to_string()))?;
        let mut recorder = Self {
            recorder: Some(recorder),
            config,
        };

        if let Err(e) = recorder.prepare_and_start() {
            recorder.release();
            return Err(CameraError::RecordingStartFailed(e.to_string()));
        }
        Ok(recorder)
    }

    fn prepare_and_start(&mut self) -> std::io::Result<()> {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.prepare()?;
            recorder.start()?;
        }
        Ok(())
    }

    pub fn output(&self) -> &Path {
        &self.config.output
    }

    /// Finalize the file; the recorder is released even when stopping fails
    pub fn stop(mut self) -> CameraResult<PathBuf> {
        let result = match self.recorder.as_mut() {
            Some(recorder) => recorder.stop(),
            None => Err(BackendError::Other("recorder already released".into())),
        };
        self.release();

        match result {
            Ok(()) => {
                info!(path = %self.config.output.display(), "Recording saved");
                Ok(self.config.output.clone())
            }
            Err(e) => {
                warn!(error = %e, "Recorder stop failed");
                Err(CameraError::RecordingStopFailed(e.to_string()))
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut recorder) = self.recorder.take() {
            debug!("Releasing video recorder");
            recorder.release();
        }
    }
}

impl Drop for VideoRecorder {
    fn drop(&mut self) {
        // Dropped mid-recording (pause, device loss)
        if let Some(recorder) = self.recorder.as_mut()
            && let Err(e) = recorder.stop()
        {
            debug!(error = %e, "Stop on drop failed");
        }
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::sim::SimPlatform;

    fn output(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "camera-engine-recorder-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("VID_test.mp4")
    }

    fn config(path: PathBuf) -> RecorderConfig {
        VideoRecorder::config(VideoSource::Surface, 90, Resolution::new(1920, 1080), path)
    }

    #[test]
    fn test_fixed_encoder_policy() {
        let c = config(PathBuf::from("out.mp4"));
        assert_eq!(c.video_codec, VideoCodec::H264);
        assert_eq!(c.audio_codec, AudioCodec::Aac);
        assert_eq!(c.container, Container::Mpeg4);
        assert_eq!(c.frame_rate, 30);
        assert_eq!(c.bitrate, 6 * 1024 * 1024);
        assert_eq!(c.orientation_hint, 90);
    }

    #[test]
    fn test_start_then_stop_releases_once() {
        let sim = SimPlatform::standard();
        let platform = sim.modern_platform();
        let path = output("stop");

        let recorder = VideoRecorder::start(platform.recorder.as_ref(), config(path.clone()))
            .expect("recorder starts");
        assert_eq!(recorder.output(), path.as_path());
        assert_eq!(recorder.stop().unwrap(), path);

        assert_eq!(
            sim.log().entries(),
            vec![
                "recorder.create Surface 1920x1080 orientation=90",
                "recorder.prepare",
                "recorder.start",
                "recorder.stop",
                "recorder.release",
            ]
        );
    }

    #[test]
    fn test_failed_start_releases() {
        let sim = SimPlatform::standard();
        sim.fail_recorder_start(true);
        let platform = sim.modern_platform();

        let err = VideoRecorder::start(platform.recorder.as_ref(), config(output("start")))
            .unwrap_err();
        assert!(matches!(err, CameraError::RecordingStartFailed(_)));
        assert_eq!(sim.log().count("recorder.release"), 1);
        assert_eq!(sim.log().count("recorder.start"), 0);
    }

    #[test]
    fn test_failed_stop_still_releases() {
        let sim = SimPlatform::standard();
        sim.fail_recorder_stop(true);
        let platform = sim.modern_platform();

        let recorder =
            VideoRecorder::start(platform.recorder.as_ref(), config(output("short"))).unwrap();
        let err = recorder.stop().unwrap_err();
        assert!(matches!(err, CameraError::RecordingStopFailed(_)));
        assert_eq!(sim.log().count("recorder.stop"), 1);
        assert_eq!(sim.log().count("recorder.release"), 1);
    }

    #[test]
    fn test_drop_stops_and_releases() {
        let sim = SimPlatform::standard();
        let platform = sim.modern_platform();

        let recorder =
            VideoRecorder::start(platform.recorder.as_ref(), config(output("drop"))).unwrap();
        drop(recorder);
        assert_eq!(sim.log().count("recorder.stop"), 1);
        assert_eq!(sim.log().count("recorder.release"), 1);
    }
}
