// SPDX-License-Identifier: GPL-3.0-only

//! Resolution negotiation
//!
//! Sensors advertise sizes in landscape while the target comes from the view,
//! which is usually portrait. The target ratio is therefore taken as
//! `height / width` of the target and compared against `width / height` of
//! each candidate.

use super::types::Resolution;
use crate::constants::sizing::ASPECT_TOLERANCE;
use tracing::debug;

/// Pick the advertised size that best fits `target`
///
/// 1. Keep candidates whose ratio is within [`ASPECT_TOLERANCE`] of the target.
/// 2. Among those, take the one whose height is closest to the target height.
///    The first candidate wins a tie.
/// 3. When nothing matches the ratio, take the globally closest height.
///
/// An empty list yields `target` itself.
pub fn optimal_size(candidates: &[Resolution], target: Resolution) -> Resolution {
    if target.width == 0 {
        return candidates.first().copied().unwrap_or(target);
    }

    let target_ratio = target.height as f64 / target.width as f64;
    let height_diff = |size: &Resolution| (size.height as i64 - target.height as i64).abs();

    // `min_by_key` returns the first of several equal minimums
    let selected = candidates
        .iter()
        .filter(|size| {
            size.height > 0 && (size.aspect_ratio() - target_ratio).abs() <= ASPECT_TOLERANCE
        })
        .min_by_key(|size| height_diff(*size))
        .or_else(|| candidates.iter().min_by_key(|size| height_diff(*size)))
        .copied();

    match selected {
        Some(size) => {
            debug!(target = %target, selected = %size, "Negotiated size");
            size
        }
        None => target,
    }
}
