use crate::errors::EngineError;
use crate::metadata::CaptureResult;
use crate::request::RequestHolder;

/// Receives lifecycle transitions from the request thread.
///
/// All methods are invoked on the request thread, in order; implementations
/// hand them to outer callers asynchronously.
pub trait DeviceStateListener: Send + Sync {
    fn on_configuring(&self);

    fn on_idle(&self);

    fn on_capture_started(&self, holder: &RequestHolder);

    fn on_capture_result(&self, holder: &RequestHolder, result: CaptureResult);

    /// A fatal error stopped the request thread.
    fn on_error(&self, error: &EngineError);
}
