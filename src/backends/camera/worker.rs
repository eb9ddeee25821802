// SPDX-License-Identifier: GPL-3.0-only

//! Session worker thread
//!
//! One dedicated thread owns the [`SessionBackend`] while the engine is
//! resumed. Commands from the host and completions from the hardware arrive
//! on the same queue, so every state change of the backend happens on this
//! thread and in arrival order.
//!
//! Hardware completions carry the session generation of the device that
//! produced them. Completions from an older generation (a device that has
//! since been closed or replaced) are dropped here and never reach the
//! backend.

use super::hal::HalEvent;
use super::types::{CapabilitySet, Facing, FlashMode, Resolution, TouchPoint, ZoomStep};
use super::{SessionBackend, SessionContext, SessionResources};
use crate::errors::CameraResult;
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

/// Host request forwarded to the backend
#[derive(Debug)]
pub enum SessionCommand {
    Open(Resolution),
    Close,
    SwitchFacing(Facing),
    SwitchFlash(FlashMode),
    SetAutoFocus(bool),
    TakePicture,
    StartVideo(oneshot::Sender<CameraResult<bool>>),
    StopVideo(oneshot::Sender<CameraResult<()>>),
    FocusAt(TouchPoint),
    Zoom(ZoomStep),
    Capabilities(oneshot::Sender<Option<CapabilitySet>>),
}

/// Everything the worker queue carries
#[derive(Debug)]
pub enum WorkerMessage {
    Command(SessionCommand),
    Hardware { generation: u64, event: HalEvent },
    /// Answered once the queue has drained
    Idle(oneshot::Sender<()>),
    Shutdown,
}

/// Handle to the running session thread
///
/// Stopping the worker closes the device and hands the backend back, so the
/// chosen API and the user's settings survive a pause.
pub struct SessionWorker {
    thread_handle: Option<JoinHandle<Box<dyn SessionBackend>>>,
    thread_id: ThreadId,
    tx: UnboundedSender<WorkerMessage>,
    name: String,
}

impl SessionWorker {
    /// Spawn the worker thread around `backend`
    pub fn start(
        name: &str,
        backend: Box<dyn SessionBackend>,
        resources: SessionResources,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = SessionContext::new(resources, tx.clone());
        let name_clone = name.to_string();

        info!(name = %name, backend = %backend.backend_type(), "Starting session worker");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&name_clone, backend, ctx, rx))?;

        Ok(Self {
            thread_id: thread_handle.thread().id(),
            thread_handle: Some(thread_handle),
            tx,
            name: name.to_string(),
        })
    }

    /// Queue a command, returns false once the worker has exited
    pub fn send(&self, command: SessionCommand) -> bool {
        self.tx.send(WorkerMessage::Command(command)).is_ok()
    }

    /// Ask to be signalled on `reply` once the queue has drained
    pub fn request_idle(&self, reply: oneshot::Sender<()>) -> bool {
        self.tx.send(WorkerMessage::Idle(reply)).is_ok()
    }

    /// True when called from the worker thread itself, i.e. from a listener
    /// callback
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Close the device, wait for the thread and take the backend back
    ///
    /// On the worker thread the shutdown is only queued and the thread is
    /// detached; the backend is not handed back.
    pub fn stop(&mut self) -> Option<Box<dyn SessionBackend>> {
        let handle = self.thread_handle.take()?;
        debug!(name = %self.name, "Requesting session worker stop");
        let _ = self.tx.send(WorkerMessage::Shutdown);

        if self.is_current_thread() {
            debug!(name = %self.name, "Stop requested from the worker thread, detaching");
            return None;
        }

        match handle.join() {
            Ok(backend) => {
                debug!(name = %self.name, "Session worker finished");
                Some(backend)
            }
            Err(e) => {
                warn!(name = %self.name, "Session worker panicked: {:?}", e);
                None
            }
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "SessionWorker dropped, stopping thread");
            self.stop();
        }
    }
}

fn run(
    name: &str,
    mut backend: Box<dyn SessionBackend>,
    mut ctx: SessionContext,
    mut rx: UnboundedReceiver<WorkerMessage>,
) -> Box<dyn SessionBackend> {
    debug!(name = %name, "Session worker thread started");
    let mut idle_waiters: Vec<oneshot::Sender<()>> = Vec::new();

    while let Some(message) = rx.blocking_recv() {
        match message {
            WorkerMessage::Command(command) => {
                trace!(?command, "Session command");
                dispatch(backend.as_mut(), command, &mut ctx);
            }
            WorkerMessage::Hardware { generation, event } => {
                if ctx.is_current(generation) {
                    backend.handle_event(event, &mut ctx);
                } else {
                    trace!(
                        generation,
                        current = ctx.generation(),
                        ?event,
                        "Discarding completion from a closed session"
                    );
                }
            }
            WorkerMessage::Idle(reply) => idle_waiters.push(reply),
            WorkerMessage::Shutdown => {
                backend.close(&mut ctx);
                break;
            }
        }

        if !idle_waiters.is_empty() && rx.is_empty() {
            for waiter in idle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    info!(name = %name, "Session worker thread exiting");
    backend
}

fn dispatch(backend: &mut dyn SessionBackend, command: SessionCommand, ctx: &mut SessionContext) {
    match command {
        SessionCommand::Open(view) => backend.open(view, ctx),
        SessionCommand::Close => backend.close(ctx),
        SessionCommand::SwitchFacing(facing) => backend.switch_facing(facing, ctx),
        SessionCommand::SwitchFlash(mode) => backend.switch_flash(mode, ctx),
        SessionCommand::SetAutoFocus(enabled) => backend.set_auto_focus(enabled),
        SessionCommand::TakePicture => backend.take_picture(ctx),
        SessionCommand::StartVideo(reply) => {
            let _ = reply.send(backend.start_video_record(ctx));
        }
        SessionCommand::StopVideo(reply) => {
            let _ = reply.send(backend.stop_video_record(ctx));
        }
        SessionCommand::FocusAt(touch) => backend.focus_at(touch, ctx),
        SessionCommand::Zoom(step) => backend.zoom(step, ctx),
        SessionCommand::Capabilities(reply) => {
            let _ = reply.send(backend.capabilities().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::hal::EventSink;
    use crate::backends::camera::sim::SimPlatform;
    use crate::backends::camera::types::CameraBackendType;
    use crate::backends::camera::{CameraListener, SessionBackend};
    use crate::backends::sensor::OrientationHandle;
    use crate::config::CaptureOptions;
    use crate::errors::CameraError;
    use crate::storage::MediaStorage;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};

    struct NullListener;

    impl CameraListener for NullListener {
        fn on_error(&self, _error: CameraError) {}
        fn on_picture_taken(&self, _picture: &Path, _thumbnail: &Path) {}
        fn on_video_recorded(&self, _video: &Path, _thumbnail: &Path) {}
    }

    /// Records every call and exposes the sink of the open session
    #[derive(Default)]
    struct ScriptedBackend {
        calls: Arc<Mutex<Vec<String>>>,
        sink: Arc<Mutex<Option<EventSink>>>,
    }

    impl ScriptedBackend {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    impl SessionBackend for ScriptedBackend {
        fn backend_type(&self) -> CameraBackendType {
            CameraBackendType::Modern
        }
        fn capabilities(&self) -> Option<&CapabilitySet> {
            None
        }
        fn options(&self) -> CaptureOptions {
            CaptureOptions::default()
        }
        fn open(&mut self, view: Resolution, ctx: &mut SessionContext) {
            self.record(format!("open {}", view));
            *self.sink.lock().unwrap() = Some(ctx.new_session());
        }
        fn close(&mut self, ctx: &mut SessionContext) {
            self.record("close");
            ctx.invalidate();
        }
        fn switch_facing(&mut self, facing: Facing, _ctx: &mut SessionContext) {
            self.record(format!("facing {}", facing));
        }
        fn switch_flash(&mut self, mode: FlashMode, _ctx: &mut SessionContext) {
            self.record(format!("flash {}", mode));
        }
        fn set_auto_focus(&mut self, enabled: bool) {
            self.record(format!("af {}", enabled));
        }
        fn take_picture(&mut self, _ctx: &mut SessionContext) {
            self.record("picture");
        }
        fn start_video_record(&mut self, _ctx: &mut SessionContext) -> CameraResult<bool> {
            self.record("start video");
            Ok(true)
        }
        fn stop_video_record(&mut self, _ctx: &mut SessionContext) -> CameraResult<()> {
            self.record("stop video");
            Err(CameraError::RecordingStopFailed("too short".into()))
        }
        fn focus_at(&mut self, _touch: TouchPoint, _ctx: &mut SessionContext) {
            self.record("focus");
        }
        fn zoom(&mut self, step: ZoomStep, _ctx: &mut SessionContext) {
            self.record(format!("zoom {:?}", step));
        }
        fn handle_event(&mut self, event: HalEvent, _ctx: &mut SessionContext) {
            self.record(format!("event {:?}", event));
        }
    }

    fn resources() -> SessionResources {
        let platform = SimPlatform::standard().full_platform();
        let dir = std::env::temp_dir().join(format!("camera-engine-worker-{}", std::process::id()));
        SessionResources {
            listener: Arc::new(NullListener),
            capturing: Arc::new(AtomicBool::new(false)),
            orientation: OrientationHandle::default(),
            storage: MediaStorage::new(&dir, &dir),
            recorders: platform.recorder,
            thumbnailer: platform.thumbnailer,
        }
    }

    fn wait_idle(worker: &SessionWorker) -> bool {
        let (reply, done) = oneshot::channel();
        worker.request_idle(reply) && done.blocking_recv().is_ok()
    }

    #[test]
    fn test_commands_run_in_order() {
        let backend = ScriptedBackend::default();
        let calls = Arc::clone(&backend.calls);
        let mut worker =
            SessionWorker::start("test-worker", Box::new(backend), resources()).unwrap();

        assert!(worker.send(SessionCommand::Open(Resolution::new(1280, 720))));
        assert!(worker.send(SessionCommand::SwitchFlash(FlashMode::Torch)));
        assert!(worker.send(SessionCommand::TakePicture));
        assert!(wait_idle(&worker));

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["open 1280x720", "flash torch", "picture"]
        );
        worker.stop();
    }

    #[test]
    fn test_replies_reach_caller() {
        let mut worker = SessionWorker::start(
            "test-replies",
            Box::new(ScriptedBackend::default()),
            resources(),
        )
        .unwrap();

        let (reply, result) = oneshot::channel();
        worker.send(SessionCommand::StopVideo(reply));
        assert!(matches!(
            result.blocking_recv().unwrap(),
            Err(CameraError::RecordingStopFailed(_))
        ));

        let (reply, caps) = oneshot::channel();
        worker.send(SessionCommand::Capabilities(reply));
        assert_eq!(caps.blocking_recv().unwrap(), None);
        worker.stop();
    }

    #[test]
    fn test_stale_completions_are_discarded() {
        let backend = ScriptedBackend::default();
        let calls = Arc::clone(&backend.calls);
        let sink = Arc::clone(&backend.sink);
        let mut worker =
            SessionWorker::start("test-stale", Box::new(backend), resources()).unwrap();

        worker.send(SessionCommand::Open(Resolution::new(640, 480)));
        wait_idle(&worker);
        let first = sink.lock().unwrap().clone().unwrap();
        first.post(HalEvent::DeviceOpened);
        wait_idle(&worker);

        worker.send(SessionCommand::Close);
        wait_idle(&worker);
        first.post(HalEvent::SessionConfigured);
        wait_idle(&worker);

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["open 640x480", "event DeviceOpened", "close"]);
        worker.stop();
    }

    #[test]
    fn test_stop_closes_and_returns_backend() {
        let backend = ScriptedBackend::default();
        let calls = Arc::clone(&backend.calls);
        let mut worker = SessionWorker::start("test-stop", Box::new(backend), resources()).unwrap();
        assert!(!worker.is_current_thread());

        let backend = worker.stop();
        assert!(backend.is_some());
        assert_eq!(calls.lock().unwrap().last().map(String::as_str), Some("close"));

        // Stopped workers reject work
        assert!(!worker.send(SessionCommand::TakePicture));
        assert!(!wait_idle(&worker));
        assert!(worker.stop().is_none());
    }
}
