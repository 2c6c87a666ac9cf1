use crate::size::Size;
use crate::surface::SurfaceRef;
use std::sync::Arc;

/// Invoked with the sensor timestamp (ns) each time a preview buffer lands.
pub type FrameListener = Arc<dyn Fn(i64) + Send + Sync>;

/// Buffer queue the legacy device renders preview frames into.
pub trait PreviewTexture: Send + Sync {
    fn set_default_buffer_size(&self, size: Size);

    /// Replace the frame-available listener.
    fn set_frame_listener(&self, listener: FrameListener);

    /// Producer side: the device finished rendering a frame captured at
    /// `timestamp`. Fires the frame listener.
    fn queue_buffer(&self, timestamp: i64);
}

/// The compositing pipeline: converts each preview buffer into every
/// preview-class output surface on its own thread.
///
/// Configuration changes are applied in FIFO order relative to queued frames.
pub trait Compositor: Send + Sync {
    /// Spawn the compositing thread. Called once, on first configuration.
    fn start(&self);

    fn wait_until_started(&self);

    /// Apply a new set of preview outputs and block until the pipeline uses it.
    fn set_configuration_and_wait(&self, outputs: &[SurfaceRef]);

    fn allow_new_frames(&self);

    fn ignore_new_frames(&self);

    fn wait_until_idle(&self);

    /// Render the latest preview buffer into `targets`, or just release it
    /// when `None`.
    fn queue_new_frame(&self, targets: Option<Vec<SurfaceRef>>);

    /// Texture the device should render preview into for the current
    /// configuration, if any preview outputs are configured.
    fn preview_texture(&self) -> Option<Arc<dyn PreviewTexture>>;

    fn quit(&self);
}
