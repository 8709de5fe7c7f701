use std::sync::Arc;

use tokio::sync::broadcast;

use storm_core::StormEvent;
use storm_server::ServerConfig;
use storm_session::{ProcMeminfo, RosterStore, ScriptedDriver, SessionRegistry};
use storm_settings::{EngineConfig, SettingsStore};
use storm_telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let engine = Arc::new(EngineConfig::from_env());

    // The event bus doubles as the log fan-out target, so it exists before
    // telemetry comes up.
    let (events, _) = broadcast::channel::<StormEvent>(1024);
    let _telemetry = init_telemetry(
        TelemetryConfig {
            log_file: Some(engine.log_file_path()),
            ..TelemetryConfig::default()
        },
        Some(events.clone()),
    );

    tracing::info!("Starting StreamStorm engine");

    let settings = Arc::new(SettingsStore::at(engine.data_dir.join("settings.json")));
    settings.load();
    let roster = Arc::new(RosterStore::at(engine.roster_path()));

    let registry = Arc::new(SessionRegistry::new(
        events,
        Arc::new(ScriptedDriver::new()),
        roster,
        Arc::new(ProcMeminfo),
        engine.ram_per_instance_mb,
    ));

    let config = ServerConfig::from_engine(&engine);
    let handle = storm_server::start(config, registry, settings, Arc::clone(&engine)).await?;

    tracing::info!(port = handle.port, "StreamStorm engine ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}
