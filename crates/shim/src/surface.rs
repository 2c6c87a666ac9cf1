use crate::errors::SurfaceError;
use crate::size::Size;
use std::fmt;
use std::sync::Arc;

/// Pixel format of an output surface as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// Compressed still image; served by the still-capture path.
    Jpeg,
    /// Any other native format code; served from the preview stream.
    Other(u32),
}

impl SurfaceFormat {
    pub fn is_still(&self) -> bool {
        matches!(self, SurfaceFormat::Jpeg)
    }
}

/// Opaque handle to an output buffer queue owned by the application.
pub trait Surface: Send + Sync + fmt::Debug {
    /// Stable identity, unique among live surfaces.
    fn id(&self) -> u64;

    fn format(&self) -> Result<SurfaceFormat, SurfaceError>;

    fn size(&self) -> Result<Size, SurfaceError>;

    /// Queue one buffer: an encoded JPEG or a composited preview frame.
    fn produce_frame(&self, data: &[u8]) -> Result<(), SurfaceError>;
}

pub type SurfaceRef = Arc<dyn Surface>;

/// Outputs split by which legacy path produces them.
#[derive(Debug, Clone, Default)]
pub struct PartitionedOutputs {
    pub preview: Vec<SurfaceRef>,
    pub still: Vec<SurfaceRef>,
}

impl PartitionedOutputs {
    pub fn is_empty(&self) -> bool {
        self.preview.is_empty() && self.still.is_empty()
    }
}

/// Split `outputs` into preview-class and still-class by querying each format.
pub fn partition_outputs(outputs: &[SurfaceRef]) -> Result<PartitionedOutputs, SurfaceError> {
    let mut partitioned = PartitionedOutputs::default();
    for surface in outputs {
        if surface.format()?.is_still() {
            partitioned.still.push(Arc::clone(surface));
        } else {
            partitioned.preview.push(Arc::clone(surface));
        }
    }
    Ok(partitioned)
}

/// Query the dimensions of every surface in `surfaces`.
pub fn surface_sizes(surfaces: &[SurfaceRef]) -> Result<Vec<Size>, SurfaceError> {
    surfaces.iter().map(|s| s.size()).collect()
}
