//! Caller-side toolkit: size/speed/progress formatting, id generation, and
//! rate-limiting helpers. The core transfer loop does not depend on the
//! throttle/debounce types; they exist for UI layers sitting on top.

use std::sync::Mutex;
use std::time::{Duration, Instant};

const UNIT_STEP: f64 = 1024.0;

/// Formats a byte count with a binary-scaled unit, e.g. `"1.50 MB"`.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= UNIT_STEP && unit < UNITS.len() - 1 {
        size /= UNIT_STEP;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

/// Formats a transfer rate, e.g. `"1.00 MB/s"`. Zero renders as `"0 B/s"`.
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec <= 0.0 {
        return "0 B/s".to_string();
    }
    const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];
    let mut size = bytes_per_sec;
    let mut unit = 0;
    while size >= UNIT_STEP && unit < UNITS.len() - 1 {
        size /= UNIT_STEP;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

/// Percentage complete with two-decimal precision, capped at 100.
pub fn calculate_progress(loaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let progress = loaded as f64 / total as f64 * 100.0;
    ((progress * 100.0).round() / 100.0).min(100.0)
}

/// Generates a unique task id for callers that do not supply their own.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Coalesces bursts of calls: only the last call within each `delay` window
/// actually runs.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedules `f` to run after the delay, cancelling any call still
    /// pending from before. Must be called from within a tokio runtime.
    pub fn call<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        }));
    }
}

/// Lets at most one call through per `interval`; the rest are dropped.
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Runs `f` if the interval has elapsed since the last accepted call.
    /// Returns whether the call went through.
    pub fn call<F: FnOnce()>(&self, f: F) -> bool {
        {
            let mut last = self.last.lock().unwrap();
            let now = Instant::now();
            if let Some(prev) = *last {
                if now.duration_since(prev) < self.interval {
                    return false;
                }
            }
            *last = Some(now);
        }
        f();
        true
    }
}
