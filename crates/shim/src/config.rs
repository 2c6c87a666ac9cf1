use crate::size::Size;
use common::{env_flag, env_opt, env_or};
use std::time::Duration;

pub use common::Environment;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub environment: Environment,
    pub camera_id: u32,
    /// Bound on waiting for a preview frame callback.
    pub preview_timeout: Duration,
    /// Bound on waiting for shutter + JPEG delivery.
    pub still_timeout: Duration,
    /// Size of the throwaway preview sink used for still-only captures.
    pub placeholder_preview_size: Size,
    /// Count and periodically log preview/request rates.
    pub fps_logging: bool,
    pub otel_endpoint: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            camera_id: 0,
            preview_timeout: Duration::from_millis(300),
            still_timeout: Duration::from_millis(3000),
            placeholder_preview_size: Size::new(640, 480),
            fps_logging: false,
            otel_endpoint: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let preview_timeout_ms = env_or(
            "PREVIEW_FRAME_TIMEOUT_MS",
            defaults.preview_timeout.as_millis() as u64,
        );
        let still_timeout_ms = env_or(
            "JPEG_FRAME_TIMEOUT_MS",
            defaults.still_timeout.as_millis() as u64,
        );

        let placeholder_width = env_or(
            "PLACEHOLDER_PREVIEW_WIDTH",
            defaults.placeholder_preview_size.width,
        );
        let placeholder_height = env_or(
            "PLACEHOLDER_PREVIEW_HEIGHT",
            defaults.placeholder_preview_size.height,
        );
        if placeholder_width == 0 || placeholder_height == 0 {
            anyhow::bail!(
                "Placeholder preview size must be non-zero, got {}x{}",
                placeholder_width,
                placeholder_height
            );
        }

        Ok(Self {
            environment: Environment::from_env(),
            camera_id: env_or("CAMERA_ID", defaults.camera_id),
            preview_timeout: Duration::from_millis(preview_timeout_ms),
            still_timeout: Duration::from_millis(still_timeout_ms),
            placeholder_preview_size: Size::new(placeholder_width, placeholder_height),
            fps_logging: env_flag("FPS_LOGGING"),
            otel_endpoint: env_opt("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    /// Thread name and log prefix for this camera's request thread.
    pub fn thread_name(&self) -> String {
        format!("request-thread-{}", self.camera_id)
    }
}
