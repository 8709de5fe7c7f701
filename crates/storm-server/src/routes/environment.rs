//! Environment provisioning. Profile creation is fire-and-start: the reply
//! goes out as soon as the work is scheduled and the panel follows progress
//! through `log` events on the socket.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use storm_core::StormError;

use crate::envelope::{self, ApiError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/environment/profiles/create", post(create_profiles))
        .route("/environment/profiles/save_cookies", post(save_cookies))
        // old panels still post to the unprefixed path
        .route("/create_profiles", post(create_profiles))
}

#[derive(Debug, Deserialize)]
struct CreateProfilesBody {
    count: u32,
}

async fn create_profiles(
    State(state): State<AppState>,
    Json(body): Json<CreateProfilesBody>,
) -> Response {
    if body.count == 0 {
        return envelope::bad_request("count must be at least 1");
    }
    if state.registry.is_active() {
        return ApiError(StormError::Busy("Storming in progress".to_string())).into_response();
    }
    let Some(guard) = state.registry.busy().try_acquire("Creating profiles") else {
        let reason = state
            .registry
            .busy()
            .reason()
            .unwrap_or_else(|| "engine is busy".to_string());
        return ApiError(StormError::Busy(reason)).into_response();
    };

    let count = body.count;
    let profiles_dir = state.engine.data_dir.join("profiles");
    let roster = Arc::clone(state.registry.roster_store());
    tokio::spawn(async move {
        let _guard = guard;
        info!(count, "provisioning channel profiles");
        for n in 1..=count {
            let dir = profiles_dir.join(format!("channel_{n}"));
            if let Err(err) = tokio::fs::create_dir_all(&dir).await {
                error!(error = %err, profile = n, "profile directory creation failed");
                return;
            }
            info!(profile = n, count, "profile ready");
        }
        match roster.create_profiles(count) {
            Ok(roster) => info!(channels = roster.no_of_channels, "channel roster updated"),
            Err(err) => error!(error = %err, "failed to update channel roster"),
        }
    });

    Json(json!({"success": true, "message": "Profile creation started"})).into_response()
}

/// Store the cookie blob the panel exported from the browser. The blob is
/// opaque to the engine; instances load it at login time.
async fn save_cookies(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    if body.is_null() {
        return envelope::bad_request("no cookie data provided");
    }

    let path = state.engine.data_dir.join("cookies.json");
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            return ApiError(StormError::Internal(err.to_string())).into_response();
        }
    }
    let pretty = match serde_json::to_string_pretty(&body) {
        Ok(pretty) => pretty,
        Err(err) => return ApiError(StormError::Internal(err.to_string())).into_response(),
    };
    if let Err(err) = std::fs::write(&path, pretty) {
        return ApiError(StormError::Internal(err.to_string())).into_response();
    }

    if let Err(err) = state
        .settings
        .update(|settings| settings.general.is_logged_in = true)
    {
        return ApiError(StormError::Internal(err.to_string())).into_response();
    }

    info!(path = %path.display(), "cookie data saved");
    envelope::ok("Cookies saved successfully").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_must_be_an_integer() {
        assert!(serde_json::from_value::<CreateProfilesBody>(json!({"count": 8})).is_ok());
        assert!(serde_json::from_value::<CreateProfilesBody>(json!({"count": "8"})).is_err());
        assert!(serde_json::from_value::<CreateProfilesBody>(json!({"count": -1})).is_err());
        assert!(serde_json::from_value::<CreateProfilesBody>(json!({})).is_err());
    }
}
