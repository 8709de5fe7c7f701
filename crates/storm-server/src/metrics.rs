use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use storm_core::StormEvent;
use storm_session::{MemSample, MemoryProbe};

pub const METRICS_INTERVAL: Duration = Duration::from_secs(2);

/// Aggregate CPU usage from `/proc/stat`, measured between consecutive
/// samples. The first sample primes the baseline and reports zero.
#[derive(Debug, Default)]
pub struct CpuTracker {
    prev_busy: u64,
    prev_total: u64,
}

impl CpuTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self) -> f64 {
        match read_cpu_jiffies() {
            Some((busy, total)) => self.advance(busy, total),
            None => 0.0,
        }
    }

    fn advance(&mut self, busy: u64, total: u64) -> f64 {
        let delta_busy = busy.saturating_sub(self.prev_busy);
        let delta_total = total.saturating_sub(self.prev_total);
        let primed = self.prev_total > 0;
        self.prev_busy = busy;
        self.prev_total = total;
        if !primed || delta_total == 0 {
            return 0.0;
        }
        round2(delta_busy as f64 / delta_total as f64 * 100.0)
    }
}

#[cfg(target_os = "linux")]
fn read_cpu_jiffies() -> Option<(u64, u64)> {
    let text = std::fs::read_to_string("/proc/stat").ok()?;
    parse_cpu_line(text.lines().next()?)
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_jiffies() -> Option<(u64, u64)> {
    None
}

/// Parse the aggregate `cpu  ...` line into (busy, total) jiffies. idle and
/// iowait count as not busy.
pub fn parse_cpu_line(line: &str) -> Option<(u64, u64)> {
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = fields.filter_map(|v| v.parse().ok()).collect();
    if values.len() < 5 {
        return None;
    }
    let total: u64 = values.iter().sum();
    let idle = values[3] + values[4];
    Some((total - idle, total))
}

/// Build the `system_metrics` event from one memory sample. A blind probe
/// reports zeros rather than nonsense.
pub fn metrics_event(sample: &MemSample, cpu_percent: f64) -> StormEvent {
    if sample.is_unknown() {
        return StormEvent::SystemMetrics {
            cpu_percent,
            ram_percent: 0.0,
            used_ram_gb: 0.0,
            free_ram_percent: 0.0,
            free_ram_gb: 0.0,
            free_ram_mb: 0,
        };
    }
    StormEvent::SystemMetrics {
        cpu_percent,
        ram_percent: round2(sample.used_percent()),
        used_ram_gb: round2(sample.used_gb()),
        free_ram_percent: round2(sample.free_percent()),
        free_ram_gb: round2(sample.free_gb()),
        free_ram_mb: sample.free_mb(),
    }
}

/// Reply body for `GET /get_ram_info`, in gigabytes.
pub fn ram_info(sample: &MemSample) -> serde_json::Value {
    serde_json::json!({
        "free": round2(sample.free_gb()),
        "total": round2(sample.total_gb()),
    })
}

/// Push `system_metrics` onto the bus every two seconds.
pub fn spawn_metrics_task(
    probe: Arc<dyn MemoryProbe>,
    events: broadcast::Sender<StormEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut cpu = CpuTracker::new();
        let mut ticker = tokio::time::interval(METRICS_INTERVAL);
        loop {
            ticker.tick().await;
            let event = metrics_event(&probe.sample(), cpu.sample());
            let _ = events.send(event);
        }
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
