// SPDX-License-Identifier: GPL-3.0-only

//! Photo pipeline: write captured JPEG buffers and their thumbnails

pub mod encoding;

pub use encoding::{encode_jpeg, picture_thumbnail, save_picture, video_thumbnail};
