//! Free-RAM heuristic behind the start/add capacity check and the
//! system-metrics feed.
//!
//! Linux reads `/proc/meminfo`; elsewhere the probe reports an unknown
//! sample (all zeros) and the capacity check is skipped rather than
//! blocking every storm.

use std::sync::atomic::{AtomicU64, Ordering};

const KB_PER_MB: u64 = 1024;
const KB_PER_GB: u64 = 1024 * 1024;

/// One point-in-time memory reading, in kilobytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemSample {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemSample {
    /// A sample of all zeros means the probe could not read the host.
    pub fn is_unknown(&self) -> bool {
        self.total_kb == 0
    }

    pub fn used_kb(&self) -> u64 {
        self.total_kb.saturating_sub(self.available_kb)
    }

    pub fn free_mb(&self) -> u64 {
        self.available_kb / KB_PER_MB
    }

    pub fn free_gb(&self) -> f64 {
        self.available_kb as f64 / KB_PER_GB as f64
    }

    pub fn total_gb(&self) -> f64 {
        self.total_kb as f64 / KB_PER_GB as f64
    }

    pub fn used_gb(&self) -> f64 {
        self.used_kb() as f64 / KB_PER_GB as f64
    }

    /// Used memory as a percentage of total.
    pub fn used_percent(&self) -> f64 {
        if self.total_kb == 0 {
            return 0.0;
        }
        self.used_kb() as f64 * 100.0 / self.total_kb as f64
    }

    pub fn free_percent(&self) -> f64 {
        if self.total_kb == 0 {
            return 0.0;
        }
        self.available_kb as f64 * 100.0 / self.total_kb as f64
    }

    /// How many instances fit in available memory, `None` when the host
    /// could not be read.
    pub fn instance_capacity(&self, ram_per_instance_mb: u64) -> Option<u64> {
        if self.is_unknown() || ram_per_instance_mb == 0 {
            return None;
        }
        Some(self.free_mb() / ram_per_instance_mb)
    }
}

/// Source of memory samples. Swapped for a fixed probe in tests.
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> MemSample;
}

/// Probe backed by `/proc/meminfo`.
#[derive(Debug, Default)]
pub struct ProcMeminfo;

impl MemoryProbe for ProcMeminfo {
    #[cfg(target_os = "linux")]
    fn sample(&self) -> MemSample {
        match std::fs::read_to_string("/proc/meminfo") {
            Ok(text) => parse_meminfo(&text),
            Err(_) => MemSample::default(),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn sample(&self) -> MemSample {
        MemSample::default()
    }
}

/// Fixed-value probe for tests and non-Linux fallbacks.
#[derive(Debug, Default)]
pub struct FixedProbe {
    available_kb: AtomicU64,
    total_kb: AtomicU64,
}

impl FixedProbe {
    pub fn with_free_mb(free_mb: u64) -> Self {
        let probe = Self::default();
        probe.total_kb.store(free_mb * 2 * KB_PER_MB, Ordering::Relaxed);
        probe.available_kb.store(free_mb * KB_PER_MB, Ordering::Relaxed);
        probe
    }

    pub fn set_free_mb(&self, free_mb: u64) {
        self.available_kb.store(free_mb * KB_PER_MB, Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedProbe {
    fn sample(&self) -> MemSample {
        MemSample {
            total_kb: self.total_kb.load(Ordering::Relaxed),
            available_kb: self.available_kb.load(Ordering::Relaxed),
        }
    }
}

/// Parse the `MemTotal:` and `MemAvailable:` lines of `/proc/meminfo`.
pub fn parse_meminfo(text: &str) -> MemSample {
    let mut sample = MemSample::default();
    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value_kb = rest
            .trim()
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok());
        match (key, value_kb) {
            ("MemTotal", Some(kb)) => sample.total_kb = kb,
            ("MemAvailable", Some(kb)) => sample.available_kb = kb,
            _ => {}
        }
    }
    sample
}
