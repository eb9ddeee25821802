// SPDX-License-Identifier: GPL-3.0-only

//! Engine-wide constants

/// File suffix for captured pictures and every thumbnail
pub const PICTURE_SUFFIX: &str = ".jpg";

/// File suffix for recorded videos
pub const VIDEO_SUFFIX: &str = ".mp4";

/// Suffix inserted before the extension of thumbnail files
pub const THUMB_SUFFIX: &str = "_thumb";

/// Default folder name for saving photos and videos
pub const DEFAULT_SAVE_FOLDER: &str = "Camera";

/// Size negotiation constants
pub mod sizing {
    /// Allowed difference between candidate and target aspect ratios
    pub const ASPECT_TOLERANCE: f64 = 0.1;

    /// Largest preview the session-based API guarantees
    pub const MAX_PREVIEW_WIDTH: u32 = 1920;
    pub const MAX_PREVIEW_HEIGHT: u32 = 1080;
}

/// Touch focus and metering
pub mod focus {
    /// Half the side length of the square focus region
    pub const HALF_AREA_SIZE: i32 = 150;

    /// Legacy API metering coordinates span `[-1000, 1000]`
    pub const LEGACY_COORD_MIN: i32 = -1000;
    pub const LEGACY_COORD_MAX: i32 = 1000;

    /// Weight applied to every focus/metering region
    pub const METERING_WEIGHT: u32 = 800;
}

/// Motion sensor quantization
pub mod sensor {
    /// Dead zone on each accelerometer axis (m/s², about 0.15 g)
    pub const AXIS_THRESHOLD: f32 = 1.5;
}

/// Zoom
pub mod zoom {
    /// Modern zoom levels per unit of digital zoom ratio
    pub const LEVELS_PER_RATIO: f32 = 10.0;

    /// Divisor applied to the maximum crop inset before scaling by level
    pub const CROP_STEPS: i32 = 100;

    /// Crop offsets are aligned down to this many pixels
    pub const CROP_ALIGNMENT: i32 = 4;
}

/// Video recording policy
pub mod recording {
    /// Target frame rate
    pub const FRAME_RATE: u32 = 30;

    /// Fixed video bitrate budget (6 MiB/s)
    pub const VIDEO_BITRATE: u32 = 6 * 1024 * 1024;

    /// Default maximum recording duration offered to the host
    pub const DEFAULT_MAX_DURATION_MS: u64 = 10 * 1000;
}

/// Picture and thumbnail encoding
pub mod encoding {
    /// JPEG quality used when re-encoding (mirrored pictures, thumbnails)
    pub const JPEG_QUALITY: u8 = 100;

    /// Picture thumbnails are the picture downscaled by this factor
    pub const THUMB_SAMPLE_SIZE: u32 = 4;

    /// Size of the blank thumbnail used when no video frame can be extracted
    pub const VIDEO_THUMB_WIDTH: u32 = 512;
    pub const VIDEO_THUMB_HEIGHT: u32 = 384;
}

/// Worker thread
pub mod worker {
    /// Name of the background thread owning the device
    pub const THREAD_NAME: &str = "camera-background";
}

/// Touch gestures of the capture flow
pub mod gesture {
    /// Change in finger spacing, in pixels, that counts as one zoom step
    pub const PINCH_THRESHOLD: f32 = 15.0;
}
