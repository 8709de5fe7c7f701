use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use tower_http::cors::CorsLayer;

use storm_session::SessionRegistry;
use storm_settings::env::DEFAULT_PORT;
use storm_settings::{EngineConfig, SettingsStore};

use crate::bridge;
use crate::metrics;
use crate::routes;
use crate::state::AppState;
use crate::ws::{self, ClientRegistry};

/// Server configuration.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_send_queue: 256,
        }
    }
}

impl ServerConfig {
    pub fn from_engine(engine: &EngineConfig) -> Self {
        Self {
            host: engine.host.clone(),
            port: engine.port,
            ..Self::default()
        }
    }
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    settings: Arc<SettingsStore>,
    engine: Arc<EngineConfig>,
) -> Result<ServerHandle, std::io::Error> {
    let clients = Arc::new(ClientRegistry::new(config.max_send_queue));

    let bridge_handle = bridge::create_bridge(Arc::clone(&clients), registry.subscribe());
    let cleanup_handle = ws::start_cleanup_task(Arc::clone(&clients), Duration::from_secs(60));
    let metrics_handle =
        metrics::spawn_metrics_task(Arc::clone(registry.probe()), registry.events().clone());

    let state = AppState {
        registry,
        settings,
        clients: Arc::clone(&clients),
        engine,
    };

    let router = routes::router()
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "StreamStorm engine listening");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _bridge: bridge_handle,
        _metrics: metrics_handle,
        _cleanup: cleanup_handle,
    })
}

/// Handle returned by `start()`. Keeps the background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _bridge: tokio::task::JoinHandle<()>,
    _metrics: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.clients.register();
    tracing::info!(client = %client_id, "websocket client connected");
    ws::handle_ws_connection(socket, client_id, rx, state.clients).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use tokio::sync::broadcast;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use storm_session::{
        ChannelRoster, FixedProbe, MemoryProbe, RosterStore, ScriptedDriver,
    };

    struct TestEngine {
        base: String,
        ws_url: String,
        _handle: ServerHandle,
        _dir: tempfile::TempDir,
    }

    async fn spawn_engine(provisioned_channels: u32) -> TestEngine {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(EngineConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            data_dir: dir.path().to_path_buf(),
            ram_per_instance_mb: 500,
        });

        let roster = Arc::new(RosterStore::at(engine.roster_path()));
        if provisioned_channels > 0 {
            roster
                .save(&ChannelRoster::seeded(provisioned_channels))
                .unwrap();
        }
        let settings = Arc::new(SettingsStore::at(dir.path().join("settings.json")));
        let driver = Arc::new(
            ScriptedDriver::new()
                .with_setup_delay(Duration::from_millis(5))
                .with_post_delay(Duration::from_millis(1)),
        );
        let probe: Arc<dyn MemoryProbe> = Arc::new(FixedProbe::with_free_mb(100_000));
        let (events, _) = broadcast::channel(512);
        let registry = Arc::new(SessionRegistry::new(
            events,
            driver,
            roster,
            probe,
            engine.ram_per_instance_mb,
        ));

        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        let handle = start(config, registry, settings, engine).await.unwrap();
        let base = format!("http://127.0.0.1:{}", handle.port);
        let ws_url = format!("ws://127.0.0.1:{}/ws", handle.port);
        TestEngine {
            base,
            ws_url,
            _handle: handle,
            _dir: dir,
        }
    }

    fn start_body() -> Value {
        json!({
            "videoUrl": "https://www.youtube.com/watch?v=abcdefghijk",
            "messages": ["storm one", "storm two"],
            "slowMode": 1,
            "channels": {"mode": "basic", "count": 2},
        })
    }

    async fn post(client: &reqwest::Client, url: String, body: Value) -> (u16, Value) {
        let resp = client.post(url).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    #[tokio::test]
    async fn serves_liveness_and_config() {
        let engine = spawn_engine(0).await;

        let body: Value = reqwest::get(format!("{}/", engine.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "I am the StreamStorm Engine");

        let config: Value = reqwest::get(format!("{}/config", engine.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(config["success"], true);
        assert_eq!(config["version"], env!("CARGO_PKG_VERSION"));
        assert!(config["log_file_path"].as_str().unwrap().ends_with("storm.log"));

        let ram: Value = reqwest::get(format!("{}/get_ram_info", engine.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(ram["free"].as_f64().unwrap() > 0.0);
        assert!(ram["total"].as_f64().unwrap() >= ram["free"].as_f64().unwrap());
    }

    #[tokio::test]
    async fn storm_lifecycle_over_rest() {
        let engine = spawn_engine(5).await;
        let client = reqwest::Client::new();

        let before: Value = client
            .get(format!("{}/storm", engine.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(before["storm"], false);
        assert_eq!(before["message"], "Storm is not running");

        let (status, started) =
            post(&client, format!("{}/storm/start", engine.base), start_body()).await;
        assert_eq!(status, 200);
        assert_eq!(started["success"], true);
        assert_eq!(started["message"], "Storm started successfully");
        assert!(started["channels"]["1"].is_object());
        assert!(started["channels"]["2"].is_object());

        let during: Value = client
            .get(format!("{}/storm", engine.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(during["storm"], true);
        assert_eq!(during["message"], "Storm is running");

        let context: Value = client
            .get(format!("{}/storm/context", engine.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(context["success"], true);
        assert_eq!(context["context"]["storm_status"], "Running");
        assert_eq!(
            context["context"]["video_url"],
            "https://www.youtube.com/watch?v=abcdefghijk"
        );

        let start_time: Value = client
            .get(format!("{}/storm/start_time", engine.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(start_time["success"], true);
        assert!(start_time["start_time"].is_string());

        let (status, paused) = post(
            &client,
            format!("{}/storm/pause", engine.base),
            json!({}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(paused["message"], "Storm paused successfully");

        let (status, resumed) = post(
            &client,
            format!("{}/storm/resume", engine.base),
            json!({}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(resumed["message"], "Storm resumed successfully");

        let (status, changed) = post(
            &client,
            format!("{}/storm/change_messages", engine.base),
            json!({"messages": ["fresh"]}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(changed["message"], "Messages changed successfully");

        let (status, slowed) = post(
            &client,
            format!("{}/storm/change_slow_mode", engine.base),
            json!({"slowMode": 7}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(slowed["message"], "Slow mode changed successfully");

        let (status, stopped) = post(
            &client,
            format!("{}/storm/stop", engine.base),
            json!({}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(stopped["message"], "Storm stopped successfully");

        let (status, again) = post(
            &client,
            format!("{}/storm/stop", engine.base),
            json!({}),
        )
        .await;
        assert_eq!(status, 404);
        assert_eq!(again["success"], false);
        assert_eq!(again["code"], "NO_ACTIVE_SESSION");
    }

    #[tokio::test]
    async fn second_start_is_a_conflict() {
        let engine = spawn_engine(5).await;
        let client = reqwest::Client::new();

        let (status, _) =
            post(&client, format!("{}/storm/start", engine.base), start_body()).await;
        assert_eq!(status, 200);

        let (status, rejected) =
            post(&client, format!("{}/storm/start", engine.base), start_body()).await;
        assert_eq!(status, 409);
        assert_eq!(rejected["success"], false);
        assert_eq!(rejected["code"], "ALREADY_ACTIVE");
    }

    #[tokio::test]
    async fn kill_unknown_instance_is_not_found() {
        let engine = spawn_engine(5).await;
        let client = reqwest::Client::new();

        let (status, _) =
            post(&client, format!("{}/storm/start", engine.base), start_body()).await;
        assert_eq!(status, 200);

        let (status, missing) = post(
            &client,
            format!("{}/storm/kill_instance", engine.base),
            json!({"index": 99}),
        )
        .await;
        assert_eq!(status, 404);
        assert_eq!(missing["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn channels_data_requires_a_roster() {
        let engine = spawn_engine(0).await;
        let client = reqwest::Client::new();

        let (status, body) = post(
            &client,
            format!("{}/storm/get_channels_data", engine.base),
            json!({"mode": "new"}),
        )
        .await;
        assert_eq!(status, 404);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Config file not found. Create profiles first.");
    }

    #[tokio::test]
    async fn profile_creation_provisions_the_roster() {
        let engine = spawn_engine(0).await;
        let client = reqwest::Client::new();

        let (status, reply) = post(
            &client,
            format!("{}/environment/profiles/create", engine.base),
            json!({"count": 3}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(reply["message"], "Profile creation started");

        // fire-and-forget: poll until the background task lands the roster
        let mut roster = Value::Null;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let (status, body) = post(
                &client,
                format!("{}/storm/get_channels_data", engine.base),
                json!({"mode": "new"}),
            )
            .await;
            if status == 200 {
                roster = body;
                break;
            }
        }
        assert_eq!(roster["success"], true);
        assert_eq!(roster["no_of_channels"], 3);
        assert!(roster["channels"]["3"].is_object());
    }

    #[tokio::test]
    async fn cookie_upload_marks_the_panel_logged_in() {
        let engine = spawn_engine(0).await;
        let client = reqwest::Client::new();

        let (status, saved) = post(
            &client,
            format!("{}/environment/profiles/save_cookies", engine.base),
            json!([{"name": "SID", "value": "abc", "domain": ".youtube.com"}]),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(saved["message"], "Cookies saved successfully");

        let settings: Value = client
            .get(format!("{}/settings", engine.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(settings["general"]["is_logged_in"], true);
    }

    #[tokio::test]
    async fn ai_key_roundtrip_and_status() {
        let engine = spawn_engine(0).await;
        let client = reqwest::Client::new();

        let status_before: Value = client
            .get(format!("{}/ai/status", engine.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status_before["configured"], false);

        let (status, short) = post(
            &client,
            format!("{}/settings/ai/keys/anthropic", engine.base),
            json!({"apiKey": "short", "model": "claude-3-5-sonnet-20241022"}),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(short["message"], "API key must be at least 10 characters");

        let (status, saved) = post(
            &client,
            format!("{}/settings/ai/keys/anthropic", engine.base),
            json!({"apiKey": "sk-ant-0123456789", "model": "claude-3-5-sonnet-20241022"}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(saved["message"], "Anthropic settings saved successfully");

        let (status, defaulted) = post(
            &client,
            format!("{}/settings/ai/default", engine.base),
            json!({"provider": "anthropic", "model": "claude-3-5-sonnet-20241022"}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(defaulted["message"], "Anthropic set as default provider");

        let status_after: Value = client
            .get(format!("{}/ai/status", engine.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status_after["configured"], true);
        assert_eq!(status_after["provider"], "anthropic");
        assert_eq!(status_after["model"], "claude-3-5-sonnet-20241022");

        let keys: Value = client
            .get(format!("{}/settings/ai/keys", engine.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(keys["providers"]["anthropic"]["apiKey"], "sk-ant-0123456789");
        assert_eq!(keys["defaultProvider"], "anthropic");
    }

    #[tokio::test]
    async fn websocket_receives_storm_events() {
        let engine = spawn_engine(5).await;
        let client = reqwest::Client::new();

        let (mut socket, _) = tokio_tungstenite::connect_async(engine.ws_url.as_str())
            .await
            .unwrap();

        let (status, _) =
            post(&client, format!("{}/storm/start", engine.base), start_body()).await;
        assert_eq!(status, 200);

        // metrics frames share the socket; skim until the lifecycle event
        let found = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(Ok(frame)) = socket.next().await {
                if let WsMessage::Text(text) = frame {
                    let event: Value = serde_json::from_str(&text).unwrap();
                    if event["event"] == "storm_started" {
                        return true;
                    }
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(found);
    }
}
