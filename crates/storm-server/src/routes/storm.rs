use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use storm_core::{
    ActiveCheck, ChannelSelection, ConfigError, ContextReply, InstanceId, StormConfig, StormError,
};
use storm_session::RosterError;

use crate::envelope::{self, ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/storm", get(active_check))
        .route("/storm/context", get(get_context))
        .route("/storm/start_time", get(start_time))
        .route("/storm/start", post(start_storm))
        .route("/storm/start_storm_dont_wait", post(start_dont_wait))
        .route("/storm/stop", post(stop_storm))
        .route("/storm/pause", post(pause_storm))
        .route("/storm/resume", post(resume_storm))
        .route("/storm/change_messages", post(change_messages))
        .route("/storm/change_slow_mode", post(change_slow_mode))
        .route("/storm/start_more_channels", post(start_more_channels))
        .route("/storm/kill_instance", post(kill_instance))
        .route("/storm/get_channels_data", post(get_channels_data))
}

/// Start form as the panel posts it. Every optional knob falls back to the
/// config builder's default when absent.
#[derive(Debug, Deserialize)]
struct StartStormBody {
    #[serde(alias = "videoUrl")]
    video_url: String,
    messages: Vec<String>,
    #[serde(default, alias = "slowMode")]
    slow_mode: Option<u32>,
    #[serde(default)]
    subscribe: Option<bool>,
    #[serde(default, alias = "subscribeAndWait")]
    subscribe_and_wait: Option<bool>,
    #[serde(
        default,
        alias = "subscribeAndWaitTime",
        alias = "subscribe_and_wait_time"
    )]
    subscribe_wait_time: Option<u32>,
    #[serde(default)]
    background: Option<bool>,
    channels: ChannelSelection,
}

fn build_config(body: StartStormBody) -> Result<StormConfig, ConfigError> {
    let mut builder = StormConfig::builder(body.video_url)
        .messages(body.messages)
        .channels(body.channels);
    if let Some(seconds) = body.slow_mode {
        builder = builder.slow_mode(seconds);
    }
    if let Some(subscribe) = body.subscribe {
        builder = builder.subscribe(subscribe);
    }
    if let Some(wait) = body.subscribe_and_wait {
        builder = builder.subscribe_and_wait(wait);
    }
    if let Some(seconds) = body.subscribe_wait_time {
        builder = builder.subscribe_wait_time(seconds);
    }
    if let Some(background) = body.background {
        builder = builder.background(background);
    }
    builder.build()
}

async fn active_check(State(state): State<AppState>) -> Json<ActiveCheck> {
    Json(ActiveCheck::new(state.registry.is_active()))
}

async fn get_context(State(state): State<AppState>) -> Json<ContextReply> {
    let reply = match state.registry.context() {
        Some(context) => ContextReply::active(context),
        None => ContextReply::no_storm(),
    };
    Json(reply)
}

async fn start_time(State(state): State<AppState>) -> Response {
    match state.registry.start_time() {
        Some(time) => Json(json!({
            "success": true,
            "start_time": time.to_rfc3339(),
        }))
        .into_response(),
        None => ApiError(StormError::NoActiveSession).into_response(),
    }
}

async fn start_storm(
    State(state): State<AppState>,
    Json(body): Json<StartStormBody>,
) -> ApiResult<Json<Value>> {
    let config = build_config(body).map_err(StormError::from)?;
    let session = state.registry.start(config)?;
    Ok(Json(json!({
        "success": true,
        "message": "Storm started successfully",
        "channels": session.table().snapshot(),
    })))
}

async fn start_dont_wait(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.registry.force_ready()?;
    Ok(envelope::ok(
        "Storm started without waiting for all instances to be ready",
    ))
}

async fn stop_storm(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.registry.stop()?;
    Ok(envelope::ok("Storm stopped successfully"))
}

async fn pause_storm(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.registry.pause()?;
    Ok(envelope::ok("Storm paused successfully"))
}

async fn resume_storm(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.registry.resume()?;
    Ok(envelope::ok("Storm resumed successfully"))
}

#[derive(Debug, Deserialize)]
struct ChangeMessagesBody {
    messages: Vec<String>,
}

async fn change_messages(
    State(state): State<AppState>,
    Json(body): Json<ChangeMessagesBody>,
) -> ApiResult<Json<Value>> {
    state.registry.change_messages(body.messages)?;
    Ok(envelope::ok("Messages changed successfully"))
}

#[derive(Debug, Deserialize)]
struct ChangeSlowModeBody {
    #[serde(alias = "slowMode")]
    slow_mode: u32,
}

async fn change_slow_mode(
    State(state): State<AppState>,
    Json(body): Json<ChangeSlowModeBody>,
) -> ApiResult<Json<Value>> {
    state.registry.change_slow_mode(body.slow_mode)?;
    Ok(envelope::ok("Slow mode changed successfully"))
}

#[derive(Debug, Deserialize)]
struct StartMoreChannelsBody {
    channels: Vec<u32>,
}

async fn start_more_channels(
    State(state): State<AppState>,
    Json(body): Json<StartMoreChannelsBody>,
) -> ApiResult<Json<Value>> {
    state.registry.add_channels(body.channels)?;
    Ok(envelope::ok("More channels started successfully"))
}

#[derive(Debug, Deserialize)]
struct KillInstanceBody {
    index: u32,
}

async fn kill_instance(
    State(state): State<AppState>,
    Json(body): Json<KillInstanceBody>,
) -> ApiResult<Json<Value>> {
    state.registry.kill_instance(InstanceId(body.index))?;
    Ok(envelope::ok("Instance killed successfully"))
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ChannelsDataMode {
    #[default]
    New,
    Add,
}

#[derive(Debug, Deserialize)]
struct ChannelsDataBody {
    #[serde(default)]
    mode: ChannelsDataMode,
}

/// Roster for the channel-selection form. `add` mode also reports which
/// channels are currently live so the form can grey them out.
async fn get_channels_data(
    State(state): State<AppState>,
    Json(body): Json<ChannelsDataBody>,
) -> Response {
    let roster = match state.registry.roster_store().load() {
        Ok(roster) => roster,
        Err(RosterError::Missing) => {
            return envelope::not_found("Config file not found. Create profiles first.");
        }
        Err(err) => return ApiError(StormError::Internal(err.to_string())).into_response(),
    };

    let mut reply = json!({
        "success": true,
        "no_of_channels": roster.no_of_channels,
        "channels": roster.channels,
    });
    if matches!(body.mode, ChannelsDataMode::Add) {
        let live: Vec<InstanceId> = state
            .registry
            .active()
            .map(|session| session.table().live_ids())
            .unwrap_or_default();
        reply["running_channels"] = json!(live);
    }
    Json(reply).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_body_accepts_camel_case_aliases() {
        let body: StartStormBody = serde_json::from_value(json!({
            "videoUrl": "https://youtu.be/abc123def45",
            "messages": ["hello"],
            "slowMode": 7,
            "subscribeAndWait": true,
            "subscribeAndWaitTime": 30,
            "channels": {"mode": "basic", "count": 3},
        }))
        .unwrap();

        assert_eq!(body.video_url, "https://youtu.be/abc123def45");
        assert_eq!(body.slow_mode, Some(7));
        assert_eq!(body.subscribe_and_wait, Some(true));
        assert_eq!(body.subscribe_wait_time, Some(30));
        assert!(body.background.is_none());

        let config = build_config(body).unwrap();
        assert_eq!(config.slow_mode(), 7);
        assert_eq!(config.channels().len(), 3);
    }

    #[test]
    fn start_body_snake_case_still_works() {
        let body: StartStormBody = serde_json::from_value(json!({
            "video_url": "https://www.youtube.com/watch?v=abc123def45",
            "messages": ["hi"],
            "slow_mode": 5,
            "subscribe_and_wait_time": 10,
            "channels": {"mode": "advanced", "channels": [2, 9]},
        }))
        .unwrap();
        assert_eq!(body.slow_mode, Some(5));
        assert_eq!(body.subscribe_wait_time, Some(10));
    }

    #[test]
    fn channels_data_mode_defaults_to_new() {
        let body: ChannelsDataBody = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(body.mode, ChannelsDataMode::New));

        let body: ChannelsDataBody = serde_json::from_value(json!({"mode": "add"})).unwrap();
        assert!(matches!(body.mode, ChannelsDataMode::Add));
    }

    #[test]
    fn invalid_start_form_fails_config_validation() {
        let body: StartStormBody = serde_json::from_value(json!({
            "video_url": "https://www.youtube.com/watch?v=abc123def45",
            "messages": [],
            "channels": {"mode": "basic", "count": 2},
        }))
        .unwrap();
        assert!(build_config(body).is_err());
    }
}
