use std::sync::OnceLock;
use std::time::Instant;

fn timings_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var("BX_TIMINGS")
            .ok()
            .is_some_and(|raw| crate::core::config::flag_value(&raw))
    })
}

/// Logs the wall-clock time of a scope when `BX_TIMINGS` is set.
pub(crate) struct TimingGuard {
    label: &'static str,
    start: Instant,
}

impl TimingGuard {
    pub(crate) fn new(label: &'static str) -> Option<Self> {
        timings_enabled().then(|| Self {
            label,
            start: Instant::now(),
        })
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        tracing::info!(
            bx_timing = self.label,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "timing"
        );
    }
}
