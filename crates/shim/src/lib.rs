//! Legacy camera request engine: runs capture bursts against a camera that
//! only offers a preview stream and a blocking take-picture call.

pub mod clock;
pub mod compositor;
pub mod config;
pub mod device;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod fps;
pub mod inflight;
pub mod metadata;
pub mod negotiate;
pub mod queue;
pub mod request;
pub mod sim;
pub mod size;
pub mod state;
pub mod surface;

pub use compositor::{Compositor, FrameListener, PreviewTexture};
pub use config::EngineConfig;
pub use device::{CameraParameters, LegacyCamera, PreviewTarget};
pub use engine::RequestEngine;
pub use errors::{DeviceError, EngineError, Result, SurfaceError};
pub use metadata::{CaptureResult, MetadataMapper, SettingsMapper};
pub use negotiate::{OutputConfiguration, PictureSelection, negotiate};
pub use queue::{RequestQueue, SubmitInfo};
pub use request::{BurstHolder, CaptureRequest, RequestHolder};
pub use size::{FpsRange, Size};
pub use state::DeviceStateListener;
pub use surface::{Surface, SurfaceFormat, SurfaceRef};
