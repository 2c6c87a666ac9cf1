use crate::compositor::PreviewTexture;
use crate::errors::DeviceError;
use crate::size::{FpsRange, Size};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fired when the sensor exposure for a still capture starts.
pub type ShutterCallback = Box<dyn FnOnce() + Send>;

/// Fired with the encoded JPEG once a still capture completes.
pub type PictureCallback = Box<dyn FnOnce(Vec<u8>) + Send>;

/// Snapshot of the legacy device's global parameter set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraParameters {
    pub supported_preview_sizes: Vec<Size>,
    pub supported_picture_sizes: Vec<Size>,
    pub supported_fps_ranges: Vec<FpsRange>,
    pub preview_size: Option<Size>,
    pub picture_size: Option<Size>,
    pub preview_fps_range: Option<FpsRange>,
    pub recording_hint: bool,
    /// Vendor key/value pairs translated from request metadata.
    pub settings: BTreeMap<String, String>,
}

/// Where preview frames go while preview is running.
#[derive(Clone)]
pub enum PreviewTarget {
    /// Texture owned by the compositing pipeline.
    Texture(Arc<dyn PreviewTexture>),
    /// Throwaway sink of the given size. Still capture requires an active
    /// preview on this class of hardware even when no preview output exists.
    Placeholder(Size),
}

impl std::fmt::Debug for PreviewTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreviewTarget::Texture(_) => f.write_str("Texture"),
            PreviewTarget::Placeholder(size) => write!(f, "Placeholder({size})"),
        }
    }
}

/// Handle to a camera exposing the older preview + take-picture model.
///
/// Every call blocks the calling thread; callbacks may fire on any thread.
pub trait LegacyCamera: Send {
    fn parameters(&mut self) -> Result<CameraParameters, DeviceError>;

    fn set_parameters(&mut self, params: &CameraParameters) -> Result<(), DeviceError>;

    fn set_preview_target(&mut self, target: PreviewTarget) -> Result<(), DeviceError>;

    fn start_preview(&mut self) -> Result<(), DeviceError>;

    fn stop_preview(&mut self) -> Result<(), DeviceError>;

    /// Capture a still. Preview stops as a side effect.
    fn take_picture(
        &mut self,
        shutter: ShutterCallback,
        picture: PictureCallback,
    ) -> Result<(), DeviceError>;

    fn release(&mut self);
}
