// SPDX-License-Identifier: GPL-3.0-only

//! Video pipeline: media recorder configuration and lifecycle

pub mod recorder;

pub use recorder::VideoRecorder;
