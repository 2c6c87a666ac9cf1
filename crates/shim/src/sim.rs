//! In-process stand-ins for the camera, compositor and output surfaces.
//!
//! Used by the `shim` binary and by tests that need real callback threads.

use crate::clock::timestamp_now;
use crate::compositor::{Compositor, FrameListener, PreviewTexture};
use crate::device::{
    CameraParameters, LegacyCamera, PictureCallback, PreviewTarget, ShutterCallback,
};
use crate::errors::{DeviceError, EngineError, SurfaceError};
use crate::metadata::CaptureResult;
use crate::request::RequestHolder;
use crate::size::{FpsRange, Size};
use crate::state::DeviceStateListener;
use crate::surface::{Surface, SurfaceFormat, SurfaceRef};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const SHUTTER_DELAY: Duration = Duration::from_millis(20);
const JPEG_DELAY: Duration = Duration::from_millis(80);

struct PreviewWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl PreviewWorker {
    fn spawn(texture: Arc<dyn PreviewTexture>, interval: Duration) -> Result<Self, DeviceError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("sim-preview".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    if flag.load(Ordering::Relaxed) {
                        break;
                    }
                    texture.queue_buffer(timestamp_now());
                }
            })?;
        Ok(Self { stop, handle })
    }

    fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.handle.join().is_err() {
            tracing::warn!("Simulated preview thread panicked");
        }
    }
}

/// A legacy camera that renders synthetic preview frames at the configured
/// rate and answers `take_picture` with a fake JPEG.
pub struct SimulatedCamera {
    params: CameraParameters,
    target: Option<PreviewTarget>,
    preview: Option<PreviewWorker>,
    previewing: bool,
    released: bool,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        let params = CameraParameters {
            supported_preview_sizes: vec![
                Size::new(1920, 1080),
                Size::new(1280, 720),
                Size::new(640, 480),
                Size::new(320, 240),
            ],
            supported_picture_sizes: vec![
                Size::new(4032, 3024),
                Size::new(1920, 1080),
                Size::new(1280, 960),
                Size::new(640, 480),
            ],
            supported_fps_ranges: vec![FpsRange::new(15000, 30000), FpsRange::new(30000, 30000)],
            ..CameraParameters::default()
        };
        Self::with_parameters(params)
    }

    pub fn with_parameters(params: CameraParameters) -> Self {
        Self {
            params,
            target: None,
            preview: None,
            previewing: false,
            released: false,
        }
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.released {
            Err(DeviceError::Released)
        } else {
            Ok(())
        }
    }

    fn frame_interval(&self) -> Duration {
        let max = self
            .params
            .preview_fps_range
            .map(|range| range.max)
            .filter(|max| *max > 0)
            .unwrap_or(30000);
        Duration::from_micros(1_000_000_000 / u64::from(max))
    }

    fn halt_preview(&mut self) {
        if let Some(worker) = self.preview.take() {
            worker.stop();
        }
        self.previewing = false;
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl LegacyCamera for SimulatedCamera {
    fn parameters(&mut self) -> Result<CameraParameters, DeviceError> {
        self.ensure_open()?;
        Ok(self.params.clone())
    }

    fn set_parameters(&mut self, params: &CameraParameters) -> Result<(), DeviceError> {
        self.ensure_open()?;
        if let Some(size) = params.preview_size {
            if !params.supported_preview_sizes.contains(&size) {
                return Err(DeviceError::Rejected {
                    operation: "setParameters",
                    reason: format!("unsupported preview size {size}"),
                });
            }
        }
        self.params = params.clone();
        Ok(())
    }

    fn set_preview_target(&mut self, target: PreviewTarget) -> Result<(), DeviceError> {
        self.ensure_open()?;
        tracing::debug!(target = ?target, "Simulated preview target set");
        self.target = Some(target);
        Ok(())
    }

    fn start_preview(&mut self) -> Result<(), DeviceError> {
        self.ensure_open()?;
        if self.previewing {
            return Ok(());
        }
        match &self.target {
            Some(PreviewTarget::Texture(texture)) => {
                let interval = self.frame_interval();
                self.preview = Some(PreviewWorker::spawn(Arc::clone(texture), interval)?);
            }
            // Frames rendered into the placeholder are never observed.
            Some(PreviewTarget::Placeholder(_)) => {}
            None => {
                return Err(DeviceError::Rejected {
                    operation: "startPreview",
                    reason: "no preview target".to_string(),
                });
            }
        }
        self.previewing = true;
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.halt_preview();
        Ok(())
    }

    fn take_picture(
        &mut self,
        shutter: ShutterCallback,
        picture: PictureCallback,
    ) -> Result<(), DeviceError> {
        self.ensure_open()?;
        if !self.previewing {
            return Err(DeviceError::Rejected {
                operation: "takePicture",
                reason: "preview is not running".to_string(),
            });
        }
        self.halt_preview();

        let size = self.params.picture_size.unwrap_or(Size::new(640, 480));
        thread::Builder::new()
            .name("sim-picture".to_string())
            .spawn(move || {
                thread::sleep(SHUTTER_DELAY);
                shutter();
                thread::sleep(JPEG_DELAY);
                picture(synthetic_jpeg(size));
            })?;
        Ok(())
    }

    fn release(&mut self) {
        self.halt_preview();
        self.target = None;
        self.released = true;
        tracing::info!("Simulated camera released");
    }
}

/// SOI marker, picture dimensions, EOI marker.
fn synthetic_jpeg(size: Size) -> Vec<u8> {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&[0xFF, 0xD8]);
    data.extend_from_slice(&size.width.to_be_bytes());
    data.extend_from_slice(&size.height.to_be_bytes());
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// Preview texture handed to the simulated camera.
#[derive(Default)]
pub struct SimTexture {
    listener: Mutex<Option<FrameListener>>,
    buffer_size: Mutex<Option<Size>>,
}

impl SimTexture {
    pub fn buffer_size(&self) -> Option<Size> {
        *self.buffer_size.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PreviewTexture for SimTexture {
    fn set_default_buffer_size(&self, size: Size) {
        *self.buffer_size.lock().unwrap_or_else(PoisonError::into_inner) = Some(size);
    }

    fn set_frame_listener(&self, listener: FrameListener) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn queue_buffer(&self, timestamp: i64) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(timestamp);
        }
    }
}

#[derive(Default)]
struct CompositorState {
    started: bool,
    accepting: bool,
    outputs: Vec<SurfaceRef>,
}

/// Compositor that copies each released preview frame straight into the
/// targeted outputs on the calling thread.
#[derive(Default)]
pub struct SimulatedCompositor {
    texture: Arc<SimTexture>,
    state: Mutex<CompositorState>,
    rendered: AtomicU64,
    dropped: AtomicU64,
}

impl SimulatedCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture(&self) -> &Arc<SimTexture> {
        &self.texture
    }

    /// Frames rendered into at least one output.
    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }

    /// Frames released without rendering.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CompositorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Compositor for SimulatedCompositor {
    fn start(&self) {
        self.state().started = true;
        tracing::debug!("Simulated compositor started");
    }

    fn wait_until_started(&self) {}

    fn set_configuration_and_wait(&self, outputs: &[SurfaceRef]) {
        self.state().outputs = outputs.to_vec();
    }

    fn allow_new_frames(&self) {
        self.state().accepting = true;
    }

    fn ignore_new_frames(&self) {
        self.state().accepting = false;
    }

    fn wait_until_idle(&self) {}

    fn queue_new_frame(&self, targets: Option<Vec<SurfaceRef>>) {
        let state = self.state();
        let targets = match targets {
            Some(targets) if state.accepting => targets,
            _ => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let configured: HashSet<u64> = state.outputs.iter().map(|s| s.id()).collect();
        let frame = timestamp_now().to_le_bytes();
        let mut rendered = false;
        for surface in targets.iter().filter(|s| configured.contains(&s.id())) {
            match surface.produce_frame(&frame) {
                Ok(()) => rendered = true,
                Err(e) => tracing::warn!("Failed to render preview frame: {}", e),
            }
        }
        if rendered {
            self.rendered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn preview_texture(&self) -> Option<Arc<dyn PreviewTexture>> {
        let state = self.state();
        if state.outputs.is_empty() {
            None
        } else {
            Some(Arc::clone(&self.texture) as Arc<dyn PreviewTexture>)
        }
    }

    fn quit(&self) {
        let mut state = self.state();
        state.started = false;
        state.accepting = false;
        state.outputs.clear();
        tracing::debug!("Simulated compositor stopped");
    }
}

/// Output surface that keeps every buffer it receives.
#[derive(Debug)]
pub struct MemorySurface {
    id: u64,
    format: SurfaceFormat,
    size: Size,
    frames: Mutex<Vec<Vec<u8>>>,
    abandoned: AtomicBool,
}

impl MemorySurface {
    pub fn new(id: u64, format: SurfaceFormat, size: Size) -> Arc<Self> {
        Arc::new(Self {
            id,
            format,
            size,
            frames: Mutex::new(Vec::new()),
            abandoned: AtomicBool::new(false),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn last_frame(&self) -> Option<Vec<u8>> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Simulate the consumer going away. Later queries and writes fail.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SurfaceError> {
        if self.abandoned.load(Ordering::SeqCst) {
            Err(SurfaceError::Abandoned(self.id))
        } else {
            Ok(())
        }
    }
}

impl Surface for MemorySurface {
    fn id(&self) -> u64 {
        self.id
    }

    fn format(&self) -> Result<SurfaceFormat, SurfaceError> {
        self.check()?;
        Ok(self.format)
    }

    fn size(&self) -> Result<Size, SurfaceError> {
        self.check()?;
        Ok(self.size)
    }

    fn produce_frame(&self, data: &[u8]) -> Result<(), SurfaceError> {
        self.check()?;
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data.to_vec());
        Ok(())
    }
}

/// Listener that logs transitions and keeps running totals.
#[derive(Debug, Default)]
pub struct LoggingListener {
    started: AtomicU64,
    results: AtomicU64,
    errors: AtomicU64,
}

impl LoggingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> u64 {
        self.results.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl DeviceStateListener for LoggingListener {
    fn on_configuring(&self) {
        tracing::info!("Device configuring");
    }

    fn on_idle(&self) {
        tracing::info!(
            started = self.started.load(Ordering::Relaxed),
            results = self.results(),
            "Device idle"
        );
    }

    fn on_capture_started(&self, holder: &RequestHolder) {
        self.started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(frame_number = holder.frame_number(), "Capture started");
    }

    fn on_capture_result(&self, holder: &RequestHolder, result: CaptureResult) {
        self.results.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            frame_number = holder.frame_number(),
            request_id = holder.request_id(),
            timestamp = result.sensor_timestamp,
            still = holder.has_still_targets(),
            "Capture result"
        );
    }

    fn on_error(&self, error: &EngineError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!("Device error: {}", error);
    }
}
