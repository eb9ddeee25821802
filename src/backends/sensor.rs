// SPDX-License-Identifier: GPL-3.0-only

//! Accelerometer quantization into four device orientations
//!
//! A reading only moves the state when one axis is inside the dead band and
//! the other is clearly outside of it. Diagonal holds and small tilts keep
//! the previous state, so jitter around a boundary never produces a
//! transition.

use super::camera::types::SensorOrientation;
use crate::constants::sensor::AXIS_THRESHOLD;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// Quantize one accelerometer reading, `None` when it is ambiguous
pub fn classify(x: f32, y: f32) -> Option<SensorOrientation> {
    let inside = |v: f32| v > -AXIS_THRESHOLD && v < AXIS_THRESHOLD;

    if inside(x) {
        if y > AXIS_THRESHOLD {
            Some(SensorOrientation::Up)
        } else if y < -AXIS_THRESHOLD {
            Some(SensorOrientation::Down)
        } else {
            None
        }
    } else if inside(y) {
        if x > AXIS_THRESHOLD {
            Some(SensorOrientation::Left)
        } else if x < -AXIS_THRESHOLD {
            Some(SensorOrientation::Right)
        } else {
            None
        }
    } else {
        None
    }
}

/// Tracks the quantized device orientation
#[derive(Debug, Default)]
pub struct OrientationSensorWatcher {
    state: Arc<AtomicU8>,
}

impl OrientationSensorWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one reading, returns `(old, new)` when the orientation changed
    pub fn process(&self, x: f32, y: f32) -> Option<(SensorOrientation, SensorOrientation)> {
        let new = classify(x, y)?;
        let old = SensorOrientation::from_u8(self.state.swap(new.to_u8(), Ordering::AcqRel));
        if old == new {
            return None;
        }
        debug!(%old, %new, "Device orientation changed");
        Some((old, new))
    }

    pub fn current(&self) -> SensorOrientation {
        SensorOrientation::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Read-only view shared with the session worker
    pub fn handle(&self) -> OrientationHandle {
        OrientationHandle(Arc::clone(&self.state))
    }
}

/// Read-only view of the current device orientation
#[derive(Debug, Clone, Default)]
pub struct OrientationHandle(Arc<AtomicU8>);

impl OrientationHandle {
    pub fn get(&self) -> SensorOrientation {
        SensorOrientation::from_u8(self.0.load(Ordering::Acquire))
    }
}
