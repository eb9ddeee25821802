// SPDX-License-Identifier: GPL-3.0-only

//! Picture persistence and thumbnails
//!
//! Back camera JPEGs are written as delivered by the hardware. Front camera
//! pictures are decoded, mirrored horizontally and re-encoded so they match
//! what the user saw in the preview.

use crate::constants::encoding::{
    JPEG_QUALITY, THUMB_SAMPLE_SIZE, VIDEO_THUMB_HEIGHT, VIDEO_THUMB_WIDTH,
};
use crate::errors::{CameraError, CameraResult};
use crate::storage::thumbnail_path;
use image::RgbImage;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Write a still capture to `path`, mirroring it when `mirror` is set
pub fn save_picture(jpeg: &[u8], path: &Path, mirror: bool) -> CameraResult<()> {
    if mirror {
        let image = image::load_from_memory(jpeg)?.to_rgb8();
        let mirrored = image::imageops::flip_horizontal(&image);
        std::fs::write(path, encode_jpeg(&mirrored, JPEG_QUALITY)?)?;
    } else {
        std::fs::write(path, jpeg)?;
    }

    info!(path = %path.display(), mirror, "Picture saved");
    Ok(())
}

/// Downscale a saved picture into `<stem>_thumb.jpg`
pub fn picture_thumbnail(picture: &Path) -> CameraResult<PathBuf> {
    let image = image::open(picture)?.to_rgb8();
    let width = (image.width() / THUMB_SAMPLE_SIZE).max(1);
    let height = (image.height() / THUMB_SAMPLE_SIZE).max(1);
    let thumb = image::imageops::resize(&image, width, height, FilterType::Triangle);

    let path = thumbnail_path(picture);
    std::fs::write(&path, encode_jpeg(&thumb, JPEG_QUALITY)?)?;
    debug!(path = %path.display(), width, height, "Picture thumbnail saved");
    Ok(path)
}

/// Save `frame` as the thumbnail of `video`, or a blank frame when none could
/// be extracted
pub fn video_thumbnail(video: &Path, frame: Option<RgbImage>) -> CameraResult<PathBuf> {
    let frame = frame.unwrap_or_else(|| {
        warn!(path = %video.display(), "No frame extracted from video, using blank thumbnail");
        RgbImage::new(VIDEO_THUMB_WIDTH, VIDEO_THUMB_HEIGHT)
    });

    let path = thumbnail_path(video);
    std::fs::write(&path, encode_jpeg(&frame, JPEG_QUALITY)?)?;
    debug!(path = %path.display(), "Video thumbnail saved");
    Ok(path)
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> CameraResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);

    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| CameraError::Storage(format!("JPEG encoding failed: {}", e)))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "camera-engine-encoding-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Left half black, right half white
    fn split_image() -> RgbImage {
        RgbImage::from_fn(64, 32, |x, _| {
            if x < 32 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn test_front_pictures_are_mirrored() {
        let dir = scratch_dir("mirror");
        let jpeg = encode_jpeg(&split_image(), 100).unwrap();

        let path = dir.join("IMG_front.jpg");
        save_picture(&jpeg, &path, true).unwrap();
        let saved = image::open(&path).unwrap().to_rgb8();
        assert!(saved.get_pixel(2, 16)[0] > 200);
        assert!(saved.get_pixel(61, 16)[0] < 50);

        let path = dir.join("IMG_back.jpg");
        save_picture(&jpeg, &path, false).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), jpeg);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_picture_thumbnail_is_quarter_size() {
        let dir = scratch_dir("thumb");
        let path = dir.join("IMG_1.jpg");
        std::fs::write(&path, encode_jpeg(&split_image(), 90).unwrap()).unwrap();

        let thumb = picture_thumbnail(&path).unwrap();
        assert_eq!(thumb, dir.join("IMG_1_thumb.jpg"));
        let image = image::open(&thumb).unwrap();
        assert_eq!((image.width(), image.height()), (16, 8));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_video_thumbnail_falls_back_to_blank_frame() {
        let dir = scratch_dir("video");
        let video = dir.join("VID_1.mp4");

        let thumb = video_thumbnail(&video, None).unwrap();
        assert_eq!(thumb, dir.join("VID_1_thumb.jpg"));
        let image = image::open(&thumb).unwrap();
        assert_eq!((image.width(), image.height()), (512, 384));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_picture_is_a_storage_error() {
        let dir = scratch_dir("corrupt");
        let err = save_picture(b"not a jpeg", &dir.join("x.jpg"), true).unwrap_err();
        assert!(matches!(err, CameraError::Storage(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
