// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraBackendType {
    /// Synchronous parameter-based capture API
    Legacy,
    /// Asynchronous session-based capture API
    #[default]
    Modern,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::Legacy => write!(f, "legacy"),
            CameraBackendType::Modern => write!(f, "modern"),
        }
    }
}

/// Which physical camera is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Facing {
    #[default]
    Back,
    Front,
}

impl Facing {
    /// The opposite camera
    pub fn toggled(self) -> Self {
        match self {
            Facing::Back => Facing::Front,
            Facing::Front => Facing::Back,
        }
    }
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::Back => write!(f, "back"),
            Facing::Front => write!(f, "front"),
        }
    }
}

/// Flash operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlashMode {
    /// Flash LED is off
    #[default]
    Off,
    /// Flash fires on every still capture
    On,
    /// Flash fires when auto exposure asks for it
    Auto,
    /// Torch mode (LED stays on continuously)
    Torch,
}

impl FlashMode {
    /// Modes offered while taking pictures, in cycling order
    pub const ALL: [FlashMode; 4] = [
        FlashMode::Off,
        FlashMode::On,
        FlashMode::Auto,
        FlashMode::Torch,
    ];

    /// Modes offered while recording video, in cycling order
    pub const VIDEO: [FlashMode; 2] = [FlashMode::Off, FlashMode::Torch];

    /// Cycle to the next mode: Off -> On -> Auto -> Torch -> Off
    pub fn next(self) -> Self {
        match self {
            FlashMode::Off => FlashMode::On,
            FlashMode::On => FlashMode::Auto,
            FlashMode::Auto => FlashMode::Torch,
            FlashMode::Torch => FlashMode::Off,
        }
    }

    /// Cycle between the modes usable while recording: Off <-> Torch
    pub fn next_for_video(self) -> Self {
        match self.for_video() {
            FlashMode::Torch => FlashMode::Off,
            _ => FlashMode::Torch,
        }
    }

    /// Map onto the modes usable while recording, falling back to Off
    pub fn for_video(self) -> Self {
        if Self::VIDEO.contains(&self) {
            self
        } else {
            FlashMode::Off
        }
    }
}

impl std::fmt::Display for FlashMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlashMode::Off => write!(f, "off"),
            FlashMode::On => write!(f, "on"),
            FlashMode::Auto => write!(f, "auto"),
            FlashMode::Torch => write!(f, "torch"),
        }
    }
}

/// Focus modes a device can advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusMode {
    Off,
    Auto,
    Macro,
    ContinuousPicture,
    ContinuousVideo,
    Fixed,
    Infinity,
}

/// Width x height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Integer rectangle in device coordinates (right/bottom exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Whether `other` lies entirely inside this rectangle
    pub fn contains(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }
}

/// Focus or metering area with its weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeteringRegion {
    pub rect: Rect,
    pub weight: u32,
}

/// Quantized device tilt reported by the motion sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SensorOrientation {
    /// Held upright (portrait)
    #[default]
    Up,
    /// Upside down
    Down,
    /// Rotated so the top edge points left
    Left,
    /// Rotated so the top edge points right
    Right,
}

impl SensorOrientation {
    /// Device tilt in degrees, as subtracted from the sensor mounting angle
    pub fn degrees(&self) -> u32 {
        match self {
            SensorOrientation::Up => 0,
            SensorOrientation::Left => 90,
            SensorOrientation::Down => 180,
            SensorOrientation::Right => 270,
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            SensorOrientation::Up => 0,
            SensorOrientation::Left => 1,
            SensorOrientation::Down => 2,
            SensorOrientation::Right => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => SensorOrientation::Left,
            2 => SensorOrientation::Down,
            3 => SensorOrientation::Right,
            _ => SensorOrientation::Up,
        }
    }
}

impl std::fmt::Display for SensorOrientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorOrientation::Up => write!(f, "up"),
            SensorOrientation::Down => write!(f, "down"),
            SensorOrientation::Left => write!(f, "left"),
            SensorOrientation::Right => write!(f, "right"),
        }
    }
}

/// Supported digital zoom range
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomRange {
    /// Legacy zoom index in `[0, max]`
    Index { max: u32 },
    /// Modern crop zoom, `max_ratio` being the maximum digital zoom factor
    Crop { max_ratio: f32 },
}

/// Capabilities negotiated once per session open
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CapabilitySet {
    /// Device reports at least one AF mode other than off
    pub af_available: bool,
    /// Device reports at least one flash mode other than off
    pub flash_available: bool,
    /// Digital zoom support, `None` when unsupported
    pub zoom: Option<ZoomRange>,
    /// Flash modes the device accepts
    pub supported_flash_modes: Vec<FlashMode>,
}

/// Autofocus state reported in capture results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfState {
    #[default]
    Inactive,
    PassiveScan,
    PassiveFocused,
    PassiveUnfocused,
    ActiveScan,
    FocusedLocked,
    NotFocusedLocked,
}

impl AfState {
    /// A one-shot AF pass has finished, successfully or not
    pub fn is_locked(&self) -> bool {
        matches!(self, AfState::FocusedLocked | AfState::NotFocusedLocked)
    }
}

/// Auto exposure state reported in capture results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AeState {
    #[default]
    Inactive,
    Searching,
    Converged,
    Locked,
    FlashRequired,
    Precapture,
}

/// Subset of a capture result the engine cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureResult {
    pub af_state: Option<AfState>,
    pub ae_state: Option<AeState>,
}

/// Touch position on the preview view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub x: f32,
    pub y: f32,
    pub view_width: u32,
    pub view_height: u32,
}

/// Direction of a single zoom step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomStep {
    In,
    Out,
}

impl ZoomStep {
    pub fn delta(&self) -> i32 {
        match self {
            ZoomStep::In => 1,
            ZoomStep::Out => -1,
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for hardware-level operations
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Hardware service refused access
    AccessDenied(String),
    /// Session or parameter configuration rejected
    ConfigurationFailed(String),
    /// Recorder stopped before any frame was written
    RecordingTooShort,
    /// General I/O error
    IoError(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::AccessDenied(msg) => write!(f, "Access denied: {}", msg),
            BackendError::ConfigurationFailed(msg) => write!(f, "Configuration failed: {}", msg),
            BackendError::RecordingTooShort => write!(f, "Recording stopped too soon"),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_cycle_visits_every_mode() {
        let mut mode = FlashMode::Off;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(mode);
            mode = mode.next();
        }
        assert_eq!(seen, FlashMode::ALL);
        assert_eq!(mode, FlashMode::Off);
    }

    #[test]
    fn test_video_flash_only_off_and_torch() {
        assert_eq!(FlashMode::Auto.for_video(), FlashMode::Off);
        assert_eq!(FlashMode::Torch.for_video(), FlashMode::Torch);
        assert_eq!(FlashMode::Off.next_for_video(), FlashMode::Torch);
        assert_eq!(FlashMode::Torch.next_for_video(), FlashMode::Off);
        assert_eq!(FlashMode::On.next_for_video(), FlashMode::Torch);
    }

    #[test]
    fn test_facing_toggles() {
        assert_eq!(Facing::Back.toggled(), Facing::Front);
        assert_eq!(Facing::Front.toggled(), Facing::Back);
    }

    #[test]
    fn test_rect_contains() {
        let outer = Rect::new(0, 0, 100, 100);
        assert!(outer.contains(&Rect::new(10, 10, 90, 90)));
        assert!(!outer.contains(&Rect::new(-1, 10, 90, 90)));
    }
}
