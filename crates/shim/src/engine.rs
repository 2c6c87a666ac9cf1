//! The request thread: a single worker that owns the legacy camera and turns
//! queued capture bursts into preview/still operations.
//!
//! Callers interact only by enqueueing messages ([`RequestEngine::configure`]
//! waits for a reply); the worker is the sole user of the device, the output
//! configuration and the in-flight markers.

use crate::clock::timestamp_now;
use crate::compositor::Compositor;
use crate::config::EngineConfig;
use crate::device::LegacyCamera;
use crate::driver::CaptureDriver;
use crate::errors::{EngineError, Result};
use crate::fps::FpsCounter;
use crate::metadata::MetadataMapper;
use crate::negotiate::{OutputConfiguration, negotiate};
use crate::queue::{RequestQueue, SubmitInfo};
use crate::request::{BurstHolder, CaptureRequest, RequestHolder};
use crate::state::DeviceStateListener;
use crate::surface::SurfaceRef;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};

enum Message {
    Configure {
        outputs: Vec<SurfaceRef>,
        reply: Sender<Result<()>>,
    },
    Submit,
    Cleanup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopState {
    Idle,
    Dispatching,
    Failed(String),
}

/// Worker-side state. Lives on the request thread once started.
struct RequestThread<C: LegacyCamera> {
    name: String,
    driver: CaptureDriver<C>,
    listener: Arc<dyn DeviceStateListener>,
    mapper: Box<dyn MetadataMapper>,
    queue: Arc<RequestQueue>,
    /// Set once on a fatal error; read by callers to refuse new work.
    failure: Arc<OnceLock<String>>,
    configuration: OutputConfiguration,
    last_request: Option<Arc<CaptureRequest>>,
    compositor_started: bool,
    state: LoopState,
    request_counter: Option<FpsCounter>,
}

impl<C: LegacyCamera> RequestThread<C> {
    fn run(mut self, rx: Receiver<Message>, cleanup: Arc<AtomicBool>) {
        tracing::info!(thread = %self.name, "Request thread started");
        let mut requeue = false;

        loop {
            if cleanup.load(Ordering::SeqCst) {
                break;
            }

            // Pending messages go first; with nothing pending and bursts left,
            // keep dispatching without blocking.
            let message = if requeue {
                match rx.try_recv() {
                    Ok(message) => message,
                    Err(TryRecvError::Empty) => Message::Submit,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match rx.recv() {
                    Ok(message) => message,
                    Err(_) => break,
                }
            };

            if cleanup.load(Ordering::SeqCst) {
                break;
            }

            match message {
                Message::Configure { outputs, reply } => {
                    tracing::info!(outputs = outputs.len(), "Configure outputs");
                    let result = self.handle_configure(outputs);
                    if reply.send(result).is_err() {
                        tracing::warn!("Configure caller went away before the reply");
                    }
                }
                Message::Submit => requeue = self.handle_submit(),
                Message::Cleanup => break,
            }
        }

        self.cleanup();
        tracing::info!(thread = %self.name, "Request thread stopped");
    }

    fn handle_configure(&mut self, outputs: Vec<SurfaceRef>) -> Result<()> {
        if let LoopState::Failed(reason) = &self.state {
            return Err(EngineError::Failed(reason.clone()));
        }

        match self.configure_outputs(&outputs) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => {
                self.fail(&e);
                Err(e)
            }
            Err(e) => {
                tracing::error!("Configuration rejected, keeping previous outputs: {}", e);
                Err(e)
            }
        }
    }

    fn configure_outputs(&mut self, outputs: &[SurfaceRef]) -> Result<()> {
        // Negotiate before touching anything so a rejected configuration
        // leaves the current one intact.
        let mut params = self.driver.reload_parameters()?.clone();
        let negotiated = negotiate(outputs, &params)?;

        self.listener.on_configuring();
        self.driver.stop_preview()?;

        let compositor = Arc::clone(self.driver.compositor());
        if self.compositor_started {
            compositor.wait_until_started();
            compositor.ignore_new_frames();
            compositor.wait_until_idle();
        }
        self.driver.clear_in_flight();
        self.configuration = OutputConfiguration::default();

        if let Some(picture) = negotiated.picture {
            tracing::info!(size = %picture.size, "Set take picture size");
            params.picture_size = Some(picture.size);
        }
        self.driver.set_parameters(params);

        if !self.compositor_started {
            compositor.start();
            self.compositor_started = true;
        }
        compositor.wait_until_started();
        compositor.set_configuration_and_wait(&negotiated.preview_outputs);
        compositor.allow_new_frames();
        self.driver
            .set_preview_source(compositor.preview_texture(), negotiated.intermediate_size);

        self.driver.apply_parameters()?;
        // Force the next request to re-apply its settings on the fresh parameters.
        self.last_request = None;
        self.configuration = negotiated;

        self.state = LoopState::Idle;
        self.listener.on_idle();
        Ok(())
    }

    /// Dispatch the next due burst. Returns whether to keep dispatching.
    fn handle_submit(&mut self) -> bool {
        if let LoopState::Failed(reason) = &self.state {
            tracing::debug!(reason = %reason, "Ignoring capture, request thread has failed");
            self.queue.flush();
            return false;
        }

        let Some((burst, first_frame)) = self.queue.get_next() else {
            if self.state != LoopState::Idle {
                self.state = LoopState::Idle;
                self.listener.on_idle();
            }
            if let Err(e) = self.driver.stop_preview() {
                self.fail(&e);
            }
            return false;
        };

        self.state = LoopState::Dispatching;
        match self.process_burst(&burst, first_frame) {
            Ok(()) => true,
            Err(e) if e.is_fatal() => {
                self.fail(&e);
                false
            }
            Err(e) => {
                tracing::error!(
                    request_id = burst.request_id(),
                    "Dropping capture burst: {}",
                    e
                );
                true
            }
        }
    }

    fn process_burst(&mut self, burst: &BurstHolder, first_frame: u64) -> Result<()> {
        let holders = burst.produce_request_holders(first_frame)?;
        for holder in holders {
            self.execute(Arc::new(holder))?;
        }
        if let Some(counter) = &self.request_counter {
            counter.count_and_log();
        }
        Ok(())
    }

    fn execute(&mut self, holder: Arc<RequestHolder>) -> Result<()> {
        let span = tracing::info_span!(
            "capture_request",
            frame_number = holder.frame_number(),
            request_id = holder.request_id()
        );
        let _enter = span.enter();

        if holder.has_preview_targets() && self.configuration.preview_outputs.is_empty() {
            return Err(EngineError::NoPreviewOutputs);
        }

        let request = Arc::clone(holder.request());
        let changed = self
            .last_request
            .as_ref()
            .is_none_or(|last| !Arc::ptr_eq(last, &request));
        if changed {
            self.mapper.apply_request(&request, self.driver.params_mut());
            self.driver.apply_parameters()?;
            self.last_request = Some(Arc::clone(&request));
        }

        self.listener.on_capture_started(&holder);

        let mut timestamp = None;
        if holder.has_preview_targets() {
            self.driver.run_preview(Arc::clone(&holder))?;
            timestamp = self.driver.await_preview();
        }
        if holder.has_still_targets() {
            self.driver.run_still_capture(Arc::clone(&holder))?;
            timestamp = self.driver.await_still().or(timestamp);
        }
        let timestamp = timestamp.unwrap_or_else(timestamp_now);

        let result = self.mapper.result(self.driver.params(), &request, timestamp);
        tracing::trace!(timestamp, "Capture complete");
        self.listener.on_capture_result(&holder, result);
        Ok(())
    }

    fn fail(&mut self, error: &EngineError) {
        tracing::error!("Request thread failed: {}", error);
        let _ = self.failure.set(error.to_string());
        self.state = LoopState::Failed(error.to_string());
        let dropped = self.queue.flush();
        if dropped > 0 {
            tracing::warn!(dropped, "Discarded pending capture bursts after failure");
        }
        self.driver.clear_in_flight();
        if let Err(e) = self.driver.stop_preview() {
            tracing::warn!("Failed to stop preview after error: {}", e);
        }
        self.listener.on_error(error);
    }

    fn cleanup(&mut self) {
        if self.compositor_started {
            self.driver.compositor().quit();
            self.compositor_started = false;
        }
        self.driver.release();
    }
}

enum Worker<C: LegacyCamera> {
    Ready {
        thread: Box<RequestThread<C>>,
        rx: Receiver<Message>,
    },
    Running(JoinHandle<()>),
    Quit,
}

/// Executes capture requests against a legacy camera on a dedicated thread.
///
/// The engine owns the camera for its whole lifetime and releases it on
/// [`quit`](Self::quit).
pub struct RequestEngine<C: LegacyCamera + 'static> {
    name: String,
    queue: Arc<RequestQueue>,
    failure: Arc<OnceLock<String>>,
    tx: Sender<Message>,
    cleanup: Arc<AtomicBool>,
    accepting: AtomicBool,
    worker: Mutex<Worker<C>>,
}

impl<C: LegacyCamera + 'static> RequestEngine<C> {
    pub fn new(
        camera: C,
        compositor: Arc<dyn Compositor>,
        listener: Arc<dyn DeviceStateListener>,
        mapper: Box<dyn MetadataMapper>,
        config: EngineConfig,
    ) -> Self {
        let name = config.thread_name();
        let queue = Arc::new(RequestQueue::new());
        let failure = Arc::new(OnceLock::new());
        let (tx, rx) = crossbeam_channel::unbounded();

        let thread = RequestThread {
            name: name.clone(),
            driver: CaptureDriver::new(camera, compositor, &config),
            listener,
            mapper,
            queue: Arc::clone(&queue),
            failure: Arc::clone(&failure),
            configuration: OutputConfiguration::default(),
            last_request: None,
            compositor_started: false,
            state: LoopState::Idle,
            request_counter: config
                .fps_logging
                .then(|| FpsCounter::new("Incoming Requests")),
        };

        Self {
            name,
            queue,
            failure,
            tx,
            cleanup: Arc::new(AtomicBool::new(false)),
            accepting: AtomicBool::new(false),
            worker: Mutex::new(Worker::Ready {
                thread: Box::new(thread),
                rx,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the request thread.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *worker, Worker::Quit) {
            Worker::Ready { thread: request_thread, rx } => {
                let cleanup = Arc::clone(&self.cleanup);
                let handle = thread::Builder::new()
                    .name(self.name.clone())
                    .spawn(move || request_thread.run(rx, cleanup))
                    .map_err(EngineError::Spawn)?;
                *worker = Worker::Running(handle);
                self.accepting.store(true, Ordering::SeqCst);
                Ok(())
            }
            Worker::Running(handle) => {
                *worker = Worker::Running(handle);
                Err(EngineError::AlreadyStarted)
            }
            Worker::Quit => Err(EngineError::AlreadyQuit),
        }
    }

    /// Stop the request thread and release the camera.
    ///
    /// Cleanup runs before any message still queued; in-progress hardware
    /// waits finish or time out first. Calling this twice is an error.
    pub fn quit(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        self.accepting.store(false, Ordering::SeqCst);

        match std::mem::replace(&mut *worker, Worker::Quit) {
            Worker::Running(handle) => {
                self.cleanup.store(true, Ordering::SeqCst);
                // Only wakes a blocked worker; the flag is what jumps the queue.
                let _ = self.tx.send(Message::Cleanup);
                if handle.join().is_err() {
                    tracing::error!(thread = %self.name, "Request thread panicked");
                }
                Ok(())
            }
            Worker::Ready {
                thread: mut request_thread,
                ..
            } => {
                request_thread.cleanup();
                Ok(())
            }
            Worker::Quit => Err(EngineError::AlreadyQuit),
        }
    }

    /// Discard capture bursts that have not started yet, including the
    /// repeating burst. Requests already executing complete normally.
    pub fn flush(&self) -> usize {
        let dropped = self.queue.flush();
        tracing::info!(dropped, "Flushed pending capture bursts");
        dropped
    }

    /// Replace the output set, blocking until the request thread applied it.
    ///
    /// An empty `outputs` unconfigures the engine.
    pub fn configure(&self, outputs: Vec<SurfaceRef>) -> Result<()> {
        self.ensure_accepting()?;
        let (reply, response) = crossbeam_channel::bounded(1);
        self.tx
            .send(Message::Configure { outputs, reply })
            .map_err(|_| EngineError::NotRunning)?;
        response.recv().map_err(|_| EngineError::NotRunning)?
    }

    /// Queue a burst of requests. A repeating burst replaces the current one.
    ///
    /// Refused with [`EngineError::Failed`] once the request thread stopped on
    /// a fatal error.
    pub fn submit_capture_requests(
        &self,
        requests: Vec<Arc<CaptureRequest>>,
        repeating: bool,
    ) -> Result<SubmitInfo> {
        self.ensure_accepting()?;
        let info = self.queue.submit(requests, repeating)?;
        tracing::debug!(
            request_id = info.request_id,
            repeating,
            last_frame_number = ?info.last_frame_number,
            "Capture burst submitted"
        );
        self.tx
            .send(Message::Submit)
            .map_err(|_| EngineError::NotRunning)?;
        Ok(info)
    }

    /// Stop the repeating burst `request_id`.
    ///
    /// Returns the last frame number it will produce, or `None` if it is not
    /// the active repeating burst. Takes effect on the next queue poll.
    pub fn cancel_repeating(&self, request_id: u32) -> Option<u64> {
        self.queue.stop_repeating(request_id)
    }

    fn ensure_accepting(&self) -> Result<()> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(EngineError::NotRunning);
        }
        match self.failure.get() {
            Some(reason) => Err(EngineError::Failed(reason.clone())),
            None => Ok(()),
        }
    }
}

impl<C: LegacyCamera + 'static> Drop for RequestEngine<C> {
    fn drop(&mut self) {
        let quit = matches!(
            *self.worker.lock().unwrap_or_else(PoisonError::into_inner),
            Worker::Quit
        );
        if !quit {
            tracing::warn!(thread = %self.name, "Engine dropped without quit, shutting down");
            let _ = self.quit();
        }
    }
}
