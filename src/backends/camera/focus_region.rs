// SPDX-License-Identifier: GPL-3.0-only

//! Touch point to focus/metering rectangle
//!
//! Sensors are mounted landscape. When the view is portrait the touch point
//! is rotated a quarter turn into sensor space before it is scaled.

use super::types::{MeteringRegion, Rect, TouchPoint};
use crate::constants::focus::{
    HALF_AREA_SIZE, LEGACY_COORD_MAX, LEGACY_COORD_MIN, METERING_WEIGHT,
};

/// Touch position rotated into landscape sensor space
struct SensorPoint {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

fn to_sensor_space(touch: &TouchPoint) -> SensorPoint {
    if touch.view_width < touch.view_height {
        // x is truncated before it is mirrored
        SensorPoint {
            x: touch.y,
            y: touch.view_width as f32 - touch.x.trunc(),
            width: touch.view_height as f32,
            height: touch.view_width as f32,
        }
    } else {
        SensorPoint {
            x: touch.x,
            y: touch.y,
            width: touch.view_width as f32,
            height: touch.view_height as f32,
        }
    }
}

fn square(center_x: i32, center_y: i32, min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Rect {
    Rect::new(
        (center_x - HALF_AREA_SIZE).clamp(min_x, max_x),
        (center_y - HALF_AREA_SIZE).clamp(min_y, max_y),
        (center_x + HALF_AREA_SIZE).clamp(min_x, max_x),
        (center_y + HALF_AREA_SIZE).clamp(min_y, max_y),
    )
}

/// Focus rectangle in legacy camera coordinates (`-1000..=1000` on both axes)
pub fn legacy_region(touch: &TouchPoint) -> Rect {
    let point = to_sensor_space(touch);
    let span = (LEGACY_COORD_MAX - LEGACY_COORD_MIN) as f32;
    let center_x = (point.x / point.width * span + LEGACY_COORD_MIN as f32) as i32;
    let center_y = (point.y / point.height * span + LEGACY_COORD_MIN as f32) as i32;
    square(
        center_x,
        center_y,
        LEGACY_COORD_MIN,
        LEGACY_COORD_MAX,
        LEGACY_COORD_MIN,
        LEGACY_COORD_MAX,
    )
}

/// Focus rectangle in pixels of the active sensor array
pub fn active_array_region(touch: &TouchPoint, active_array: &Rect) -> Rect {
    let point = to_sensor_space(touch);
    let width = active_array.width();
    let height = active_array.height();
    let center_x = (point.x / point.width * width as f32) as i32;
    let center_y = (point.y / point.height * height as f32) as i32;
    square(center_x, center_y, 0, width, 0, height)
}

/// Wrap a rectangle with the weight used for touch focus
pub fn weighted(rect: Rect) -> MeteringRegion {
    MeteringRegion {
        rect,
        weight: METERING_WEIGHT,
    }
}
