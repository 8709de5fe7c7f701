//! Session-scoped message counters.
//!
//! Drivers record every delivered message; a 2-second loop owned by the
//! registry publishes the running total and a messages-per-minute rate
//! computed over a window that resets every 60 seconds. The rate is a
//! display value, not an accurate one.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative message count for one session. Zeroed at session start.
#[derive(Debug, Default)]
pub struct MessageCounters {
    total: AtomicU64,
}

impl MessageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one delivered message, returning the new total.
    pub fn record(&self) -> u64 {
        self.total.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// The sliding window behind the messages-per-minute figure.
///
/// `rate = (total_now - total_at_window_start) / elapsed * 60`, with the
/// window restarted once a minute so stale bursts age out.
#[derive(Debug)]
pub struct RateWindow {
    window_secs: u64,
    start_count: u64,
    elapsed_secs: u64,
}

impl RateWindow {
    pub fn new() -> Self {
        Self::with_window(60)
    }

    pub fn with_window(window_secs: u64) -> Self {
        Self {
            window_secs,
            start_count: 0,
            elapsed_secs: 0,
        }
    }

    /// Advance the window by `tick_secs` and return the current rate.
    pub fn tick(&mut self, total_now: u64, tick_secs: u64) -> f64 {
        self.elapsed_secs += tick_secs;
        let in_window = total_now.saturating_sub(self.start_count);
        let rate = if self.elapsed_secs > 0 {
            (in_window as f64 / self.elapsed_secs as f64) * 60.0
        } else {
            0.0
        };

        if self.elapsed_secs >= self.window_secs {
            self.start_count = total_now;
            self.elapsed_secs = 0;
        }

        rate
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new()
    }
}
