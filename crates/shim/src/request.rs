use crate::errors::SurfaceError;
use crate::surface::{SurfaceRef, partition_outputs};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One application-level capture request: per-frame settings plus the outputs
/// it should fill.
///
/// Requests are shared as `Arc<CaptureRequest>` and compared by identity, so
/// resubmitting the same `Arc` (as a repeating burst does) lets the engine skip
/// re-applying unchanged parameters.
#[derive(Clone, Default)]
pub struct CaptureRequest {
    settings: BTreeMap<String, String>,
    targets: Vec<SurfaceRef>,
}

impl CaptureRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, surface: SurfaceRef) -> Self {
        self.targets.push(surface);
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }

    pub fn targets(&self) -> &[SurfaceRef] {
        &self.targets
    }
}

impl fmt::Debug for CaptureRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureRequest")
            .field("settings", &self.settings)
            .field(
                "targets",
                &self.targets.iter().map(|t| t.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A single frame scheduled for execution.
#[derive(Debug, Clone)]
pub struct RequestHolder {
    request: Arc<CaptureRequest>,
    request_id: u32,
    frame_number: u64,
    repeating: bool,
    preview_targets: Vec<SurfaceRef>,
    still_targets: Vec<SurfaceRef>,
}

impl RequestHolder {
    fn new(
        request: Arc<CaptureRequest>,
        request_id: u32,
        frame_number: u64,
        repeating: bool,
    ) -> Result<Self, SurfaceError> {
        let targets = partition_outputs(request.targets())?;
        Ok(Self {
            request,
            request_id,
            frame_number,
            repeating,
            preview_targets: targets.preview,
            still_targets: targets.still,
        })
    }

    pub fn request(&self) -> &Arc<CaptureRequest> {
        &self.request
    }

    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn is_repeating(&self) -> bool {
        self.repeating
    }

    pub fn has_preview_targets(&self) -> bool {
        !self.preview_targets.is_empty()
    }

    pub fn has_still_targets(&self) -> bool {
        !self.still_targets.is_empty()
    }

    pub fn preview_targets(&self) -> &[SurfaceRef] {
        &self.preview_targets
    }

    pub fn still_targets(&self) -> &[SurfaceRef] {
        &self.still_targets
    }
}

/// Requests submitted together under one request id.
#[derive(Debug, Clone)]
pub struct BurstHolder {
    request_id: u32,
    repeating: bool,
    requests: Vec<Arc<CaptureRequest>>,
}

impl BurstHolder {
    pub fn new(request_id: u32, repeating: bool, requests: Vec<Arc<CaptureRequest>>) -> Self {
        Self {
            request_id,
            repeating,
            requests,
        }
    }

    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn is_repeating(&self) -> bool {
        self.repeating
    }

    /// Number of frames one expansion of this burst produces.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Expand into per-frame holders numbered from `first_frame_number`.
    pub fn produce_request_holders(
        &self,
        first_frame_number: u64,
    ) -> Result<Vec<RequestHolder>, SurfaceError> {
        self.requests
            .iter()
            .enumerate()
            .map(|(i, request)| {
                RequestHolder::new(
                    Arc::clone(request),
                    self.request_id,
                    first_frame_number + i as u64,
                    self.repeating,
                )
            })
            .collect()
    }
}
