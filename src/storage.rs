// SPDX-License-Identifier: GPL-3.0-only

//! Output file naming for pictures, videos and their thumbnails

use crate::constants::{PICTURE_SUFFIX, THUMB_SUFFIX, VIDEO_SUFFIX};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Caller-supplied output directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStorage {
    pictures_dir: PathBuf,
    videos_dir: PathBuf,
}

impl MediaStorage {
    pub fn new(pictures_dir: impl Into<PathBuf>, videos_dir: impl Into<PathBuf>) -> Self {
        Self {
            pictures_dir: pictures_dir.into(),
            videos_dir: videos_dir.into(),
        }
    }

    pub fn pictures_dir(&self) -> &Path {
        &self.pictures_dir
    }

    pub fn videos_dir(&self) -> &Path {
        &self.videos_dir
    }

    /// Fresh `IMG_<timestamp>.jpg` path, creating the directory when needed
    pub fn next_picture_path(&self) -> std::io::Result<PathBuf> {
        next_free_path(&self.pictures_dir, "IMG", PICTURE_SUFFIX)
    }

    /// Fresh `VID_<timestamp>.mp4` path, creating the directory when needed
    pub fn next_video_path(&self) -> std::io::Result<PathBuf> {
        next_free_path(&self.videos_dir, "VID", VIDEO_SUFFIX)
    }
}

fn next_free_path(dir: &Path, prefix: &str, suffix: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let mut path = dir.join(format!("{}_{}{}", prefix, timestamp, suffix));
    let mut counter = 1;
    // Several captures within one second
    while path.exists() {
        path = dir.join(format!("{}_{}_{}{}", prefix, timestamp, counter, suffix));
        counter += 1;
    }

    debug!(path = %path.display(), "Allocated output path");
    Ok(path)
}

/// `<stem>_thumb.jpg` next to `media`
pub fn thumbnail_path(media: &Path) -> PathBuf {
    let stem = media
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    media.with_file_name(format!("{}{}{}", stem, THUMB_SUFFIX, PICTURE_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "camera-engine-storage-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_thumbnail_path_for_picture_and_video() {
        assert_eq!(
            thumbnail_path(Path::new("/tmp/IMG_20240101_120000.jpg")),
            PathBuf::from("/tmp/IMG_20240101_120000_thumb.jpg")
        );
        assert_eq!(
            thumbnail_path(Path::new("/tmp/VID_20240101_120000.mp4")),
            PathBuf::from("/tmp/VID_20240101_120000_thumb.jpg")
        );
    }

    #[test]
    fn test_names_do_not_collide() {
        let dir = scratch_dir("collide");
        let storage = MediaStorage::new(&dir, &dir);

        let first = storage.next_picture_path().unwrap();
        std::fs::write(&first, b"x").unwrap();
        let second = storage.next_picture_path().unwrap();

        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("IMG_") && name.ends_with(".jpg"));
        assert!(
            storage
                .next_video_path()
                .unwrap()
                .to_string_lossy()
                .ends_with(".mp4")
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
