use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic time in nanoseconds, used for preview, shutter and synthesized
/// timestamps so every result shares one clock domain.
///
/// Never returns zero so a timestamp of `0` can mean "not yet received".
pub fn timestamp_now() -> i64 {
    let epoch = *EPOCH.get_or_init(Instant::now);
    i64::try_from(epoch.elapsed().as_nanos())
        .unwrap_or(i64::MAX)
        .saturating_add(1)
}
