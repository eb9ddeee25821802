// SPDX-License-Identifier: GPL-3.0-only

//! Helpers for driving a backend without a worker thread

use super::hal::Platform;
use super::types::SensorOrientation;
use super::worker::WorkerMessage;
use super::{CameraListener, SessionBackend, SessionContext, SessionResources};
use crate::backends::sensor::OrientationHandle;
use crate::errors::CameraError;
use crate::storage::MediaStorage;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Listener event, paths rendered as file names
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    FlashSupport(bool),
    Orientation(SensorOrientation, SensorOrientation),
    Error(CameraError),
    Picture(PathBuf, PathBuf),
    Video(PathBuf, PathBuf),
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn pictures(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Picture(path, _) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<CameraError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl CameraListener for RecordingListener {
    fn on_flash_support(&self, supported: bool) {
        self.push(Event::FlashSupport(supported));
    }

    fn on_sensor_orientation_changed(&self, old: SensorOrientation, new: SensorOrientation) {
        self.push(Event::Orientation(old, new));
    }

    fn on_error(&self, error: CameraError) {
        self.push(Event::Error(error));
    }

    fn on_picture_taken(&self, picture: &Path, thumbnail: &Path) {
        self.push(Event::Picture(picture.to_path_buf(), thumbnail.to_path_buf()));
    }

    fn on_video_recorded(&self, video: &Path, thumbnail: &Path) {
        self.push(Event::Video(video.to_path_buf(), thumbnail.to_path_buf()));
    }
}

/// Session context wired to a queue the test drains by hand
pub struct Harness {
    pub ctx: SessionContext,
    pub rx: UnboundedReceiver<WorkerMessage>,
    pub listener: Arc<RecordingListener>,
    pub dir: PathBuf,
}

impl Harness {
    pub fn new(name: &str, platform: &Platform) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "camera-engine-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);

        let listener = Arc::new(RecordingListener::default());
        let resources = SessionResources {
            listener: Arc::clone(&listener) as Arc<dyn CameraListener>,
            capturing: Arc::new(AtomicBool::new(false)),
            orientation: OrientationHandle::default(),
            storage: MediaStorage::new(dir.join("pictures"), dir.join("videos")),
            recorders: Arc::clone(&platform.recorder),
            thumbnailer: Arc::clone(&platform.thumbnailer),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            ctx: SessionContext::new(resources, tx),
            rx,
            listener,
            dir,
        }
    }

    /// Deliver queued completions the way the worker does, returns how many
    /// reached the backend
    pub fn pump(&mut self, backend: &mut dyn SessionBackend) -> usize {
        let mut delivered = 0;
        while let Ok(message) = self.rx.try_recv() {
            if let WorkerMessage::Hardware { generation, event } = message
                && self.ctx.is_current(generation)
            {
                backend.handle_event(event, &mut self.ctx);
                delivered += 1;
            }
        }
        delivered
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
