mod broadcast_layer;

pub use broadcast_layer::BroadcastLogLayer;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use storm_core::StormEvent;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "storm_session" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Optional plain-text log file (the path is reported by `/config`).
    pub log_file: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            log_file: None,
        }
    }
}

/// Guard returned by [`init_telemetry`]. Keep it alive for the process
/// lifetime.
pub struct TelemetryGuard {
    log_file_path: Option<PathBuf>,
}

impl TelemetryGuard {
    /// Path of the log file actually opened, if any.
    pub fn log_file_path(&self) -> Option<&PathBuf> {
        self.log_file_path.as_ref()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
///
/// When `ui_tx` is given, INFO+ events are also fanned out to panel
/// clients as [`StormEvent::Log`] frames.
pub fn init_telemetry(
    config: TelemetryConfig,
    ui_tx: Option<broadcast::Sender<StormEvent>>,
) -> TelemetryGuard {
    // Build the env filter from config
    let mut filter_str = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    // JSON formatting layer for stdout
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_filter(env_filter);

    // Optional plain-text file layer
    let (file_layer, log_file_path) = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            match File::create(path) {
                Ok(file) => {
                    let layer = tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_target(true)
                        .with_writer(Arc::new(file));
                    (Some(layer), Some(path.clone()))
                }
                Err(e) => {
                    eprintln!("storm-telemetry: failed to open log file: {e}");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    // Optional UI fan-out layer
    let ui_layer = ui_tx.map(BroadcastLogLayer::new);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(ui_layer)
        .init();

    TelemetryGuard { log_file_path }
}
