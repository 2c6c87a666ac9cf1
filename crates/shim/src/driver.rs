use crate::clock::timestamp_now;
use crate::compositor::{Compositor, FrameListener, PreviewTexture};
use crate::config::EngineConfig;
use crate::device::{CameraParameters, LegacyCamera, PreviewTarget};
use crate::errors::{EngineError, Result};
use crate::fps::FpsCounter;
use crate::inflight::{CompletionSignal, InFlightSlot};
use crate::negotiate::choose_fps_range;
use crate::request::RequestHolder;
use crate::size::Size;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// State touched by hardware callbacks as well as the request thread.
pub(crate) struct DriverShared {
    inflight_preview: InFlightSlot,
    inflight_still: InFlightSlot,
    preview_signal: CompletionSignal,
    still_signal: CompletionSignal,
    last_preview_timestamp: AtomicI64,
    last_shutter_timestamp: AtomicI64,
    compositor: Arc<dyn Compositor>,
    preview_counter: Option<FpsCounter>,
}

impl DriverShared {
    fn on_preview_frame(&self, timestamp: i64) {
        let Some(holder) = self.inflight_preview.take() else {
            // Release the buffer without rendering it anywhere.
            self.compositor.queue_new_frame(None);
            tracing::warn!("Dropping preview frame");
            return;
        };

        if let Some(counter) = &self.preview_counter {
            counter.count_and_log();
        }

        if holder.has_preview_targets() {
            self.compositor.queue_new_frame(Some(holder.preview_targets().to_vec()));
        }

        self.last_preview_timestamp.store(timestamp, Ordering::SeqCst);
        self.preview_signal.notify();
    }

    /// Shutter for the still capture issued for `frame_number`.
    fn on_shutter(&self, frame_number: u64) {
        if !self.inflight_still.holds_frame(frame_number) {
            tracing::warn!(frame_number, "Dropping shutter for a finished capture");
            return;
        }
        self.last_shutter_timestamp.store(timestamp_now(), Ordering::SeqCst);
    }

    /// JPEG for the still capture issued for `frame_number`.
    fn on_picture(&self, frame_number: u64, data: Vec<u8>) {
        tracing::info!(bytes = data.len(), frame_number, "Received jpeg");
        let Some(holder) = self.inflight_still.take_if_frame(frame_number) else {
            tracing::warn!(frame_number, "Dropping jpeg frame");
            return;
        };

        for surface in holder.still_targets() {
            tracing::debug!(surface = surface.id(), "Producing jpeg buffer");
            if let Err(e) = surface.produce_frame(&data) {
                tracing::warn!(
                    surface = surface.id(),
                    frame_number = holder.frame_number(),
                    "Failed to produce jpeg buffer: {}",
                    e
                );
            }
        }
        self.still_signal.notify();
    }
}

/// Issues preview and still-capture operations against the legacy device and
/// waits (bounded) for the matching callbacks.
///
/// Owned and driven exclusively by the request thread.
pub struct CaptureDriver<C: LegacyCamera> {
    camera: C,
    shared: Arc<DriverShared>,
    params: CameraParameters,
    preview_running: bool,
    preview_texture: Option<Arc<dyn PreviewTexture>>,
    intermediate_size: Option<Size>,
    placeholder_size: Size,
    preview_timeout: Duration,
    still_timeout: Duration,
}

impl<C: LegacyCamera> CaptureDriver<C> {
    pub fn new(camera: C, compositor: Arc<dyn Compositor>, config: &EngineConfig) -> Self {
        let preview_counter = config
            .fps_logging
            .then(|| FpsCounter::new("Incoming Preview"));
        Self {
            camera,
            shared: Arc::new(DriverShared {
                inflight_preview: InFlightSlot::new(),
                inflight_still: InFlightSlot::new(),
                preview_signal: CompletionSignal::new(),
                still_signal: CompletionSignal::new(),
                last_preview_timestamp: AtomicI64::new(0),
                last_shutter_timestamp: AtomicI64::new(0),
                compositor,
                preview_counter,
            }),
            params: CameraParameters::default(),
            preview_running: false,
            preview_texture: None,
            intermediate_size: None,
            placeholder_size: config.placeholder_preview_size,
            preview_timeout: config.preview_timeout,
            still_timeout: config.still_timeout,
        }
    }

    pub fn compositor(&self) -> &Arc<dyn Compositor> {
        &self.shared.compositor
    }

    pub fn params(&self) -> &CameraParameters {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut CameraParameters {
        &mut self.params
    }

    /// Re-read the device parameter set, discarding local modifications.
    pub fn reload_parameters(&mut self) -> Result<&CameraParameters> {
        self.params = self.camera.parameters()?;
        Ok(&self.params)
    }

    pub fn set_parameters(&mut self, params: CameraParameters) {
        self.params = params;
    }

    pub fn apply_parameters(&mut self) -> Result<()> {
        self.camera.set_parameters(&self.params)?;
        Ok(())
    }

    /// Listener to install on preview textures. Holds only a weak reference so
    /// a texture outliving the driver never keeps it alive.
    pub fn preview_listener(&self) -> FrameListener {
        let shared: Weak<DriverShared> = Arc::downgrade(&self.shared);
        Arc::new(move |timestamp| {
            if let Some(shared) = shared.upgrade() {
                shared.on_preview_frame(timestamp);
            }
        })
    }

    /// Point preview at a new texture and intermediate buffer size.
    pub fn set_preview_source(
        &mut self,
        texture: Option<Arc<dyn PreviewTexture>>,
        intermediate_size: Option<Size>,
    ) {
        if let Some(texture) = &texture {
            texture.set_frame_listener(self.preview_listener());
        }
        self.preview_texture = texture;
        self.intermediate_size = intermediate_size;
    }

    pub fn clear_in_flight(&self) {
        self.shared.inflight_preview.clear();
        self.shared.inflight_still.clear();
    }

    pub fn start_preview(&mut self) -> Result<()> {
        if !self.preview_running {
            self.camera.start_preview()?;
            self.preview_running = true;
        }
        Ok(())
    }

    pub fn stop_preview(&mut self) -> Result<()> {
        if self.preview_running {
            self.camera.stop_preview()?;
            self.preview_running = false;
        }
        Ok(())
    }

    /// Make `holder` the target of the next preview frame, starting preview on
    /// the compositor's texture if it is not already running.
    pub fn run_preview(&mut self, holder: Arc<RequestHolder>) -> Result<()> {
        self.shared.preview_signal.reset();
        self.shared.inflight_preview.set(holder);
        if self.preview_running {
            return Ok(());
        }

        let result = self.begin_preview();
        if result.is_err() {
            self.shared.inflight_preview.clear();
        }
        result
    }

    fn begin_preview(&mut self) -> Result<()> {
        let (Some(texture), Some(size)) = (self.preview_texture.clone(), self.intermediate_size)
        else {
            return Err(EngineError::NoPreviewOutputs);
        };

        texture.set_default_buffer_size(size);
        self.camera
            .set_preview_target(PreviewTarget::Texture(texture))?;

        let range = choose_fps_range(&self.params.supported_fps_ranges)
            .ok_or(EngineError::NoFpsRanges)?;
        tracing::debug!(range = %range, size = %size, "Starting preview");

        self.params.preview_size = Some(size);
        self.params.preview_fps_range = Some(range);
        self.params.recording_hint = true;
        self.apply_parameters()?;

        self.start_preview()
    }

    /// Wait for the preview callback. Returns its timestamp, or `None` if the
    /// wait timed out.
    pub fn await_preview(&self) -> Option<i64> {
        if self.shared.preview_signal.wait(self.preview_timeout) {
            Some(self.shared.last_preview_timestamp.load(Ordering::SeqCst))
        } else {
            tracing::error!(
                timeout_ms = self.preview_timeout.as_millis() as u64,
                "Hit timeout for preview callback"
            );
            None
        }
    }

    /// Issue a still capture for `holder`. Without an active preview a
    /// placeholder preview sink is attached first.
    pub fn run_still_capture(&mut self, holder: Arc<RequestHolder>) -> Result<()> {
        self.shared.still_signal.reset();
        self.shared.last_shutter_timestamp.store(0, Ordering::SeqCst);

        if !self.preview_running {
            tracing::debug!(size = %self.placeholder_size, "Attaching placeholder preview");
            self.camera
                .set_preview_target(PreviewTarget::Placeholder(self.placeholder_size))?;
            self.start_preview()?;
        }

        let frame_number = holder.frame_number();
        self.shared.inflight_still.set(holder);

        // Callbacks carry the frame they were issued for so a late one from a
        // timed-out capture cannot complete the request that came next.
        let shutter = Arc::downgrade(&self.shared);
        let picture = Arc::downgrade(&self.shared);
        let taken = self.camera.take_picture(
            Box::new(move || {
                if let Some(shared) = shutter.upgrade() {
                    shared.on_shutter(frame_number);
                }
            }),
            Box::new(move |data| {
                if let Some(shared) = picture.upgrade() {
                    shared.on_picture(frame_number, data);
                }
            }),
        );
        // The device stops preview once a picture is requested.
        self.preview_running = false;

        if let Err(e) = taken {
            self.shared.inflight_still.clear();
            return Err(e.into());
        }
        Ok(())
    }

    /// Wait for the still capture to complete, then clear its in-flight
    /// marker. Returns the shutter timestamp, or `None` on timeout.
    pub fn await_still(&self) -> Option<i64> {
        let received = self.shared.still_signal.wait(self.still_timeout);
        self.shared.inflight_still.clear();

        if !received {
            tracing::error!(
                timeout_ms = self.still_timeout.as_millis() as u64,
                "Hit timeout for jpeg callback"
            );
            return None;
        }

        match self.shared.last_shutter_timestamp.load(Ordering::SeqCst) {
            0 => {
                tracing::warn!("Jpeg received without shutter callback");
                None
            }
            timestamp => Some(timestamp),
        }
    }

    pub fn release(&mut self) {
        self.clear_in_flight();
        self.camera.release();
    }
}
