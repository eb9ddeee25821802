// SPDX-License-Identifier: GPL-3.0-only

//! Digital zoom as a crop of the active sensor array
//!
//! Level 0 leaves the full array visible and is only the state before the
//! first zoom; once zoomed the level stays within 1 and the maximum. Each
//! level insets the crop by a fixed share of the largest inset the maximum
//! zoom ratio allows.

use crate::backends::camera::types::{Rect, ZoomStep};
use crate::constants::zoom::{CROP_ALIGNMENT, CROP_STEPS, LEVELS_PER_RATIO};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropZoom {
    active_array: Rect,
    max_level: f32,
    level: u32,
}

impl CropZoom {
    /// `None` unless the device reports both a zoom ratio and an active array
    pub fn new(max_digital_zoom: Option<f32>, active_array: Option<Rect>) -> Option<Self> {
        let ratio = max_digital_zoom.filter(|ratio| *ratio > 1.0)?;
        Some(Self {
            active_array: active_array?,
            max_level: ratio * LEVELS_PER_RATIO,
            level: 0,
        })
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Move one level, returns false and leaves the level alone at a limit
    pub fn step(&mut self, step: ZoomStep) -> bool {
        let Some(level) = self
            .level
            .checked_add_signed(step.delta())
            .filter(|level| *level >= 1)
        else {
            debug!(level = self.level, "Zoom already at its lowest level");
            return false;
        };
        if level as f32 > self.max_level {
            debug!(level, max = self.max_level, "Zoom limit reached");
            return false;
        }
        self.level = level;
        true
    }

    /// Crop region for the current level, `None` at level 0
    pub fn crop_region(&self) -> Option<Rect> {
        if self.level == 0 {
            return None;
        }

        let width = self.active_array.width();
        let height = self.active_array.height();
        let inset = |side: i32| {
            let max_inset = (side as f32 - side as f32 / self.max_level) as i32;
            let inset = max_inset / CROP_STEPS * self.level as i32;
            inset - (inset & (CROP_ALIGNMENT - 1))
        };
        let crop_w = inset(width);
        let crop_h = inset(height);
        Some(Rect::new(crop_w, crop_h, width - crop_w, height - crop_h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zoom() -> CropZoom {
        CropZoom::new(Some(4.0), Some(Rect::new(0, 0, 4000, 3000))).unwrap()
    }

    #[test]
    fn test_unsupported_without_ratio_or_array() {
        assert!(CropZoom::new(None, Some(Rect::new(0, 0, 10, 10))).is_none());
        assert!(CropZoom::new(Some(1.0), Some(Rect::new(0, 0, 10, 10))).is_none());
        assert!(CropZoom::new(Some(4.0), None).is_none());
    }

    #[test]
    fn test_first_level_crop_is_aligned() {
        let mut zoom = zoom();
        assert_eq!(zoom.crop_region(), None);
        assert!(zoom.step(ZoomStep::In));
        // 3900 / 100 = 39 -> 36, 2925 / 100 = 29 -> 28
        assert_eq!(zoom.crop_region(), Some(Rect::new(36, 28, 3964, 2972)));
    }

    #[test]
    fn test_levels_stay_in_range() {
        let mut zoom = zoom();
        assert!(!zoom.step(ZoomStep::Out));
        assert_eq!(zoom.level(), 0);

        while zoom.step(ZoomStep::In) {}
        assert_eq!(zoom.level(), 40);
        assert_eq!(zoom.crop_region(), Some(Rect::new(1560, 1160, 2440, 1840)));

        let before = zoom.crop_region();
        assert!(!zoom.step(ZoomStep::In));
        assert_eq!(zoom.level(), 40);
        assert_eq!(zoom.crop_region(), before);
    }

    #[test]
    fn test_zoom_out_at_level_one_is_rejected() {
        let mut zoom = zoom();
        assert!(zoom.step(ZoomStep::In));
        assert!(zoom.step(ZoomStep::In));
        assert!(zoom.step(ZoomStep::Out));
        assert_eq!(zoom.level(), 1);

        let before = zoom.crop_region();
        assert!(!zoom.step(ZoomStep::Out));
        assert_eq!(zoom.level(), 1);
        assert_eq!(zoom.crop_region(), before);
        assert!(before.is_some());
    }

    #[test]
    fn test_step_and_reverse_restores_crop() {
        let mut zoom = zoom();
        zoom.step(ZoomStep::In);
        for level in 1..40 {
            assert_eq!(zoom.level(), level);
            let before = zoom.crop_region();
            assert!(zoom.step(ZoomStep::In));
            assert!(zoom.step(ZoomStep::Out));
            assert_eq!(zoom.crop_region(), before);
            zoom.step(ZoomStep::In);
        }
    }

    #[test]
    fn test_crop_is_multiple_of_four() {
        let mut zoom = CropZoom::new(Some(3.7), Some(Rect::new(0, 0, 4032, 3024))).unwrap();
        while zoom.step(ZoomStep::In) {
            let crop = zoom.crop_region().unwrap();
            assert_eq!(crop.left % 4, 0);
            assert_eq!(crop.top % 4, 0);
            assert!(crop.width() > 0 && crop.height() > 0);
        }
    }
}
