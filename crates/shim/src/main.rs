use anyhow::Context;
use common::{TelemetryGuard, TelemetrySettings};
use shim::sim::{LoggingListener, MemorySurface, SimulatedCamera, SimulatedCompositor};
use shim::{
    CaptureRequest, EngineConfig, RequestEngine, SettingsMapper, Size, SurfaceFormat, SurfaceRef,
};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const STILL_INTERVAL: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Android's IMPLEMENTATION_DEFINED pixel format.
const PREVIEW_FORMAT: u32 = 0x22;

fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;

    // TelemetryGuard needs a Tokio runtime for the OTLP batch exporters and
    // installs the subscriber itself.
    let (_telemetry, _runtime) = if let Some(endpoint) = config.otel_endpoint.as_ref() {
        let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
        let settings = TelemetrySettings {
            service_name: "shim".to_string(),
            endpoint: endpoint.clone(),
            environment: config.environment,
            export_interval: Duration::from_secs(10),
            default_directive: "info".to_string(),
        };
        let guard = rt.block_on(async { TelemetryGuard::init(&settings) })?;
        (Some(guard), Some(rt))
    } else {
        common::setup_logging(config.environment, "info");
        (None, None)
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;
    tracing::info!("Signal handlers registered (SIGTERM, SIGINT)");

    tracing::info!("Request engine starting with config: {:?}", config);

    let listener = Arc::new(LoggingListener::new());
    let engine = RequestEngine::new(
        SimulatedCamera::new(),
        Arc::new(SimulatedCompositor::new()),
        listener.clone(),
        Box::new(SettingsMapper),
        config,
    );
    engine.start().context("Failed to start request thread")?;

    let preview: SurfaceRef =
        MemorySurface::new(1, SurfaceFormat::Other(PREVIEW_FORMAT), Size::new(1280, 720));
    let jpeg: SurfaceRef = MemorySurface::new(2, SurfaceFormat::Jpeg, Size::new(1920, 1080));
    engine
        .configure(vec![preview.clone(), jpeg.clone()])
        .context("Failed to configure outputs")?;

    let repeating = engine.submit_capture_requests(
        vec![Arc::new(CaptureRequest::new().with_target(preview.clone()))],
        true,
    )?;
    tracing::info!(request_id = repeating.request_id, "Repeating preview submitted");

    let still = Arc::new(
        CaptureRequest::new()
            .with_target(preview)
            .with_target(jpeg)
            .with_setting("jpeg-quality", "90"),
    );
    let mut last_still = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(POLL_INTERVAL);
        if last_still.elapsed() >= STILL_INTERVAL {
            let info = engine.submit_capture_requests(vec![Arc::clone(&still)], false)?;
            tracing::info!(request_id = info.request_id, "Still capture submitted");
            last_still = Instant::now();
        }
    }

    tracing::info!("Shutdown requested");
    if let Some(last_frame) = engine.cancel_repeating(repeating.request_id) {
        tracing::info!(last_frame, "Repeating preview cancelled");
    }
    engine.quit().context("Failed to stop request thread")?;

    tracing::info!(
        results = listener.results(),
        errors = listener.errors(),
        "Request engine stopped"
    );
    Ok(())
}
