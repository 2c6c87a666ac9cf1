use crate::device::CameraParameters;
use crate::request::CaptureRequest;
use std::collections::BTreeMap;

/// Metadata reported for one completed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    /// Start-of-exposure time in nanoseconds (preview frame time or shutter time).
    pub sensor_timestamp: i64,
    pub entries: BTreeMap<String, String>,
}

/// Translates between request/result metadata and legacy parameters.
pub trait MetadataMapper: Send {
    /// Fold the request's settings into the device parameter set.
    fn apply_request(&self, request: &CaptureRequest, params: &mut CameraParameters);

    fn result(
        &self,
        params: &CameraParameters,
        request: &CaptureRequest,
        timestamp: i64,
    ) -> CaptureResult;
}

/// Copies request settings verbatim into the vendor settings and reports the
/// applied vendor settings back in the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsMapper;

impl MetadataMapper for SettingsMapper {
    fn apply_request(&self, request: &CaptureRequest, params: &mut CameraParameters) {
        for (key, value) in request.settings() {
            params.settings.insert(key.clone(), value.clone());
        }
    }

    fn result(
        &self,
        params: &CameraParameters,
        _request: &CaptureRequest,
        timestamp: i64,
    ) -> CaptureResult {
        let mut entries = params.settings.clone();
        if let Some(size) = params.picture_size {
            entries.insert("jpeg.size".to_string(), size.to_string());
        }
        if let Some(range) = params.preview_fps_range {
            entries.insert("fps.range".to_string(), range.to_string());
        }
        CaptureResult {
            sensor_timestamp: timestamp,
            entries,
        }
    }
}
