// SPDX-License-Identifier: GPL-3.0-only

//! Rotation corrections from sensor mounting angle and device tilt
//!
//! Front cameras see the scene mirrored, so the device tilt is added to the
//! mounting angle instead of subtracted. The legacy preview transform of a
//! front camera additionally compensates the mirror with a half turn.

use super::types::{Facing, SensorOrientation};

/// Rotation of the legacy preview transform, in degrees
pub fn display_orientation(sensor_degrees: u32, device: SensorOrientation, facing: Facing) -> u32 {
    let sensor = sensor_degrees as i32;
    let device = device.degrees() as i32;
    let degrees = match facing {
        Facing::Back => sensor - device + 360,
        Facing::Front => sensor + device + 180,
    };
    degrees.rem_euclid(360) as u32
}

/// Rotation embedded into captured pictures and recordings, in degrees
pub fn capture_rotation(sensor_degrees: u32, device: SensorOrientation, facing: Facing) -> u32 {
    let sensor = sensor_degrees as i32;
    let device = device.degrees() as i32;
    let degrees = match facing {
        Facing::Back => sensor - device,
        Facing::Front => sensor + device,
    };
    degrees.rem_euclid(360) as u32
}
