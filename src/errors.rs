// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture engine

use crate::backends::camera::types::BackendError;
use std::fmt;

/// Result type alias using CameraError
pub type CameraResult<T> = Result<T, CameraError>;

/// Errors surfaced by the capture engine
///
/// Device and session failures reach the host through
/// [`CameraListener::on_error`](crate::CameraListener::on_error); recording
/// failures are returned synchronously from the recording calls.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraError {
    /// No matching camera, or the hardware service is inaccessible
    DeviceUnavailable(String),
    /// Capture session setup rejected by the hardware
    SessionConfigurationFailed(String),
    /// Encoder or recorder preparation failed
    RecordingStartFailed(String),
    /// Recorder stop failed (usually stopped too soon)
    RecordingStopFailed(String),
    /// Picture, video or thumbnail could not be written
    Storage(String),
    /// Configuration file could not be read or written
    Config(String),
}

impl CameraError {
    /// Errors after which the host is expected to leave the capture screen
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CameraError::DeviceUnavailable(_) | CameraError::SessionConfigurationFailed(_)
        )
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::DeviceUnavailable(msg) => write!(f, "Camera unavailable: {}", msg),
            CameraError::SessionConfigurationFailed(msg) => {
                write!(f, "Failed to create capture session: {}", msg)
            }
            CameraError::RecordingStartFailed(msg) => {
                write!(f, "Failed to start recording: {}", msg)
            }
            CameraError::RecordingStopFailed(msg) => write!(f, "Failed to stop recording: {}", msg),
            CameraError::Storage(msg) => write!(f, "Storage error: {}", msg),
            CameraError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::Storage(err.to_string())
    }
}

impl From<image::ImageError> for CameraError {
    fn from(err: image::ImageError) -> Self {
        CameraError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CameraError {
    fn from(err: serde_json::Error) -> Self {
        CameraError::Config(err.to_string())
    }
}

// Hardware errors outside of recording are device-level failures
impl From<BackendError> for CameraError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::ConfigurationFailed(msg) => CameraError::SessionConfigurationFailed(msg),
            BackendError::IoError(msg) => CameraError::Storage(msg),
            other => CameraError::DeviceUnavailable(other.to_string()),
        }
    }
}
