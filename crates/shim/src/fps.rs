use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

const LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct FpsWindow {
    frame_count: u32,
    window_start: Option<Instant>,
    last_log: Option<Instant>,
    last_fps: f64,
}

/// Rolling frames-per-second estimate for one stream, refreshed once per second.
///
/// Every counted frame is also added to the `shim_frames_total` counter tagged
/// with the stream name.
pub struct FpsCounter {
    stream: &'static str,
    window: Mutex<FpsWindow>,
    frames_total: Counter<u64>,
}

impl FpsCounter {
    pub fn new(stream: &'static str) -> Self {
        let frames_total = global::meter("shim")
            .u64_counter("shim_frames_total")
            .with_description("Frames counted per stream")
            .build();
        Self {
            stream,
            window: Mutex::new(FpsWindow::default()),
            frames_total,
        }
    }

    pub fn count_frame(&self) {
        self.count_frame_at(Instant::now());
    }

    fn count_frame_at(&self, now: Instant) {
        self.frames_total
            .add(1, &[KeyValue::new("stream", self.stream)]);

        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        window.frame_count += 1;
        let start = *window.window_start.get_or_insert(now);
        let elapsed = now.duration_since(start);
        if elapsed > Duration::from_secs(1) {
            window.last_fps = window.frame_count as f64 / elapsed.as_secs_f64();
            window.frame_count = 0;
            window.window_start = Some(now);
        }
    }

    pub fn check_fps(&self) -> f64 {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_fps
    }

    /// Log the current rate, at most once every five seconds.
    pub fn staggered_log(&self) {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(latest) = window.window_start else {
            return;
        };
        let due = window
            .last_log
            .is_none_or(|logged| latest.duration_since(logged) > LOG_INTERVAL);
        if due {
            window.last_log = Some(latest);
            tracing::debug!(stream = self.stream, fps = window.last_fps, "Stream rate");
        }
    }

    pub fn count_and_log(&self) {
        self.count_frame();
        self.staggered_log();
    }
}

impl std::fmt::Debug for FpsCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FpsCounter")
            .field("stream", &self.stream)
            .field("fps", &self.check_fps())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let counter = FpsCounter::new("test");
        assert_eq!(counter.check_fps(), 0.0);
    }

    #[test]
    fn rate_updates_after_one_second() {
        let counter = FpsCounter::new("test");
        let start = Instant::now();
        for i in 0..30 {
            counter.count_frame_at(start + Duration::from_millis(i * 35));
        }
        // 30th frame lands at 1015ms, closing the first window
        let fps = counter.check_fps();
        assert!((fps - 30.0 / 1.015).abs() < 0.01, "unexpected fps {fps}");
    }

    #[test]
    fn rate_not_updated_within_first_second() {
        let counter = FpsCounter::new("test");
        let start = Instant::now();
        for i in 0..10 {
            counter.count_frame_at(start + Duration::from_millis(i * 50));
        }
        assert_eq!(counter.check_fps(), 0.0);
    }

    #[test]
    fn staggered_log_without_frames_is_noop() {
        let counter = FpsCounter::new("test");
        counter.staggered_log();
        counter.count_and_log();
        assert_eq!(counter.check_fps(), 0.0);
    }
}
