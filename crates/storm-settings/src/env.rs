//! Process-level engine configuration with `STORM_*` environment overrides.
//!
//! Unlike [`crate::types::SavedSettings`] these values are not persisted;
//! they describe where and how this particular process runs.

use std::path::PathBuf;

use crate::store::data_dir;

pub const DEFAULT_PORT: u16 = 1919;
pub const DEFAULT_RAM_PER_INSTANCE_MB: u64 = 500;

/// Runtime configuration for the engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Interface the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Directory holding `settings.json`, the channel roster and logs.
    pub data_dir: PathBuf,
    /// Estimated memory footprint of one channel instance, for the
    /// capacity check before starting extra channels.
    pub ram_per_instance_mb: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            data_dir: data_dir(),
            ram_per_instance_mb: DEFAULT_RAM_PER_INSTANCE_MB,
        }
    }
}

impl EngineConfig {
    /// Defaults with any `STORM_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        apply_env_overrides(&mut config);
        config
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.data_dir.join("storm.log")
    }

    pub fn roster_path(&self) -> PathBuf {
        self.data_dir.join("channels.json")
    }
}

pub fn apply_env_overrides(config: &mut EngineConfig) {
    if let Some(v) = read_env_string("STORM_HOST") {
        config.host = v;
    }
    if let Some(v) = read_env_u16("STORM_PORT", 1, 65535) {
        config.port = v;
    }
    if let Some(v) = read_env_string("STORM_DATA_DIR") {
        config.data_dir = PathBuf::from(v);
    }
    if let Some(v) = read_env_u64("STORM_RAM_PER_INSTANCE_MB", 1, 1_048_576) {
        config.ram_per_instance_mb = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}
