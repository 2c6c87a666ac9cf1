use crate::size::Size;
use std::io;
use thiserror::Error;

/// Failures reported by the legacy camera handle.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Device rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    #[error("Device already released")]
    Released,
}

/// Failures querying or writing an output surface.
#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Surface {0} has been abandoned")]
    Abandoned(u64),

    #[error("Surface {id} query failed: {reason}")]
    Query { id: u64, reason: String },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("No supported picture size large enough to fit {bound}")]
    NoPictureSize { bound: Size },

    #[error("Preview capture requested with no preview outputs configured")]
    NoPreviewOutputs,

    #[error("Device reports no preview frame rate ranges")]
    NoFpsRanges,

    #[error("Device reports no supported {0} sizes")]
    NoSupportedSizes(&'static str),

    #[error("Capture burst contains no requests")]
    EmptyBurst,

    #[error("Failed to spawn request thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("Request thread is not running")]
    NotRunning,

    #[error("Request thread already started")]
    AlreadyStarted,

    #[error("Request thread already quit")]
    AlreadyQuit,

    #[error("Request thread stopped after a fatal error: {0}")]
    Failed(String),
}

impl EngineError {
    /// Whether the engine can keep serving requests after this error.
    ///
    /// Configuration rejections leave the previous configuration in place;
    /// everything touching hardware is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EngineError::NoPictureSize { .. }
                | EngineError::NoSupportedSizes(_)
                | EngineError::NoPreviewOutputs
                | EngineError::Surface(_)
                | EngineError::EmptyBurst
                | EngineError::NotRunning
                | EngineError::AlreadyStarted
                | EngineError::AlreadyQuit
        )
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = EngineError::NoPictureSize {
            bound: Size::new(4000, 3000),
        };
        assert_eq!(
            err.to_string(),
            "No supported picture size large enough to fit 4000x3000"
        );

        let err = EngineError::from(DeviceError::Rejected {
            operation: "startPreview",
            reason: "busy".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Device error: Device rejected startPreview: busy"
        );

        let err = EngineError::from(SurfaceError::Abandoned(7));
        assert_eq!(err.to_string(), "Surface error: Surface 7 has been abandoned");
    }

    #[test]
    fn io_errors_convert_through_device_error() {
        fn fails() -> Result<(), DeviceError> {
            Err(io::Error::other("ioctl failed").into())
        }

        fn engine_op() -> Result<()> {
            fails()?;
            Ok(())
        }

        match engine_op() {
            Err(EngineError::Device(DeviceError::Io(e))) => {
                assert_eq!(e.to_string(), "ioctl failed")
            }
            other => panic!("Expected Device(Io), got {other:?}"),
        }
    }

    #[test]
    fn fatality_classification() {
        assert!(EngineError::from(DeviceError::Released).is_fatal());
        assert!(!EngineError::NoPreviewOutputs.is_fatal());
        assert!(
            !EngineError::NoPictureSize {
                bound: Size::new(1, 1)
            }
            .is_fatal()
        );
        assert!(!EngineError::AlreadyQuit.is_fatal());
    }
}
