use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use storm_core::StormError;
use storm_settings::types::{MIN_API_KEY_LEN, OPENAI_DEFAULT_BASE_URL};
use storm_settings::{LoginMethod, ProviderId};

use crate::envelope::{self, ApiError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings))
        .route("/settings/general", post(save_general))
        .route(
            "/settings/general/clear-login-data",
            delete(clear_login_data),
        )
        .route("/settings/ai/keys", get(list_keys))
        .route("/settings/ai/keys/{provider}", get(get_key).post(save_key))
        .route("/settings/ai/default", get(get_default).post(save_default))
}

async fn get_settings(State(state): State<AppState>) -> Json<Value> {
    let settings = state.settings.load();
    Json(json!({
        "success": true,
        "version": env!("CARGO_PKG_VERSION"),
        "log_file_path": state.engine.log_file_path(),
        "general": settings.general,
        "ai": {
            "defaultProvider": settings.ai.default_provider,
            "defaultModel": settings.ai.default_model,
            "defaultBaseUrl": settings.ai.default_base_url,
        },
    }))
}

#[derive(Debug, Deserialize)]
struct GeneralBody {
    #[serde(alias = "loginMethod")]
    login_method: LoginMethod,
}

async fn save_general(State(state): State<AppState>, Json(body): Json<GeneralBody>) -> Response {
    match state
        .settings
        .update(|settings| settings.general.login_method = body.login_method)
    {
        Ok(_) => envelope::ok("Settings saved successfully").into_response(),
        Err(err) => ApiError(StormError::Internal(err.to_string())).into_response(),
    }
}

/// Remove the stored cookie blob and browser profile directories. Safe to
/// call when nothing is stored; the reply says whether anything was removed.
async fn clear_login_data(State(state): State<AppState>) -> Response {
    let mut removed = false;

    let cookies = state.engine.data_dir.join("cookies.json");
    if cookies.exists() {
        match std::fs::remove_file(&cookies) {
            Ok(()) => removed = true,
            Err(err) => tracing::warn!(error = %err, "failed to remove cookie file"),
        }
    }
    let profiles = state.engine.data_dir.join("profiles");
    if profiles.is_dir() {
        match std::fs::remove_dir_all(&profiles) {
            Ok(()) => removed = true,
            Err(err) => tracing::warn!(error = %err, "failed to remove profile directory"),
        }
    }

    if let Err(err) = state
        .settings
        .update(|settings| settings.general.is_logged_in = false)
    {
        return ApiError(StormError::Internal(err.to_string())).into_response();
    }

    let message = if removed {
        "Login data cleared"
    } else {
        "No login data to clear"
    };
    Json(json!({"success": true, "removed": removed, "message": message})).into_response()
}

async fn list_keys(State(state): State<AppState>) -> Json<Value> {
    let ai = state.settings.load().ai;
    Json(json!({
        "success": true,
        "providers": ai.providers,
        "defaultProvider": ai.default_provider,
        "defaultModel": ai.default_model,
        "defaultBaseUrl": ai.default_base_url,
    }))
}

async fn get_key(State(state): State<AppState>, Path(provider): Path<String>) -> Response {
    let Ok(id) = provider.parse::<ProviderId>() else {
        return envelope::not_found(&format!("unknown provider: {provider}"));
    };
    let settings = state.settings.load();
    let config = settings.ai.providers.get(id);
    Json(json!({
        "success": true,
        "provider": id.as_str(),
        "apiKey": config.api_key,
        "model": config.model,
        "baseUrl": config.base_url,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct SaveKeyBody {
    #[serde(alias = "apiKey")]
    api_key: String,
    model: String,
    #[serde(default, alias = "baseUrl")]
    base_url: Option<String>,
}

async fn save_key(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(body): Json<SaveKeyBody>,
) -> Response {
    let Ok(id) = provider.parse::<ProviderId>() else {
        return envelope::not_found(&format!("unknown provider: {provider}"));
    };
    let api_key = match validate_api_key(&body.api_key) {
        Ok(key) => key,
        Err(message) => return envelope::bad_request(message),
    };
    let model = body.model.trim().to_string();
    if model.is_empty() {
        return envelope::bad_request("Model cannot be empty");
    }
    let base_url = match validate_base_url(body.base_url) {
        Ok(url) => url,
        Err(message) => return envelope::bad_request(message),
    };

    let result = state.settings.update(|settings| {
        let entry = settings.ai.providers.get_mut(id);
        entry.api_key = api_key;
        entry.model = model.clone();
        if let Some(url) = base_url {
            entry.base_url = Some(url);
        } else if id == ProviderId::OpenAi && entry.base_url.is_none() {
            entry.base_url = Some(OPENAI_DEFAULT_BASE_URL.to_string());
        }
        // Keep the default in step when the default provider's key is edited.
        if settings.ai.default_provider == Some(id) {
            settings.ai.default_model = Some(model.clone());
        }
    });

    match result {
        Ok(saved) => Json(json!({
            "success": true,
            "message": format!("{} settings saved successfully", id.display_name()),
            "defaultModelUpdated": saved.ai.default_provider == Some(id),
        }))
        .into_response(),
        Err(err) => ApiError(StormError::Internal(err.to_string())).into_response(),
    }
}

async fn get_default(State(state): State<AppState>) -> Json<Value> {
    let ai = state.settings.load().ai;
    Json(json!({
        "success": true,
        "defaultProvider": ai.default_provider,
        "defaultModel": ai.default_model,
        "defaultBaseUrl": ai.default_base_url,
    }))
}

#[derive(Debug, Deserialize)]
struct SaveDefaultBody {
    provider: String,
    model: String,
    #[serde(default, alias = "apiKey")]
    api_key: Option<String>,
    #[serde(default, alias = "baseUrl")]
    base_url: Option<String>,
}

async fn save_default(State(state): State<AppState>, Json(body): Json<SaveDefaultBody>) -> Response {
    let Ok(id) = body.provider.parse::<ProviderId>() else {
        return envelope::bad_request("Provider must be one of: openai, anthropic, google");
    };
    let model = body.model.trim().to_string();
    if model.is_empty() {
        return envelope::bad_request("Model cannot be empty");
    }
    let api_key = match body.api_key.as_deref().map(validate_api_key).transpose() {
        Ok(key) => key,
        Err(message) => return envelope::bad_request(message),
    };
    let base_url = match validate_base_url(body.base_url) {
        Ok(url) => url,
        Err(message) => return envelope::bad_request(message),
    };

    let result = state.settings.update(|settings| {
        if let Some(key) = api_key {
            settings.ai.providers.get_mut(id).api_key = key;
        }
        let saved_base = settings.ai.providers.get(id).base_url.clone();
        settings.ai.default_provider = Some(id);
        settings.ai.default_model = Some(model.clone());
        settings.ai.default_base_url = base_url.or(saved_base);
    });

    match result {
        Ok(saved) => Json(json!({
            "success": true,
            "message": format!("{} set as default provider", id.display_name()),
            "defaultProvider": saved.ai.default_provider,
            "defaultModel": saved.ai.default_model,
            "defaultBaseUrl": saved.ai.default_base_url,
        }))
        .into_response(),
        Err(err) => ApiError(StormError::Internal(err.to_string())).into_response(),
    }
}

fn validate_api_key(raw: &str) -> Result<String, &'static str> {
    let key = raw.trim();
    if key.is_empty() {
        return Err("API key cannot be empty");
    }
    if key.len() < MIN_API_KEY_LEN {
        return Err("API key must be at least 10 characters");
    }
    Ok(key.to_string())
}

fn validate_base_url(raw: Option<String>) -> Result<Option<String>, &'static str> {
    match raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(Some(url)),
        Some(_) => Err("Base URL must start with http:// or https://"),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_validation() {
        assert_eq!(validate_api_key("  "), Err("API key cannot be empty"));
        assert_eq!(
            validate_api_key("short"),
            Err("API key must be at least 10 characters")
        );
        assert_eq!(
            validate_api_key("  sk-0123456789  "),
            Ok("sk-0123456789".to_string())
        );
    }

    #[test]
    fn base_url_validation() {
        assert_eq!(validate_base_url(None), Ok(None));
        assert_eq!(validate_base_url(Some("  ".into())), Ok(None));
        assert_eq!(
            validate_base_url(Some("https://api.example.com/v1".into())),
            Ok(Some("https://api.example.com/v1".to_string()))
        );
        assert_eq!(
            validate_base_url(Some(" http://localhost:8080 ".into())),
            Ok(Some("http://localhost:8080".to_string()))
        );
        assert!(validate_base_url(Some("ftp://files".into())).is_err());
        assert!(validate_base_url(Some("api.example.com".into())).is_err());
    }

    #[test]
    fn general_body_accepts_camel_case() {
        let body: GeneralBody = serde_json::from_value(json!({"loginMethod": "profiles"})).unwrap();
        assert_eq!(body.login_method, LoginMethod::Profiles);
    }

    #[test]
    fn save_key_body_aliases() {
        let body: SaveKeyBody = serde_json::from_value(json!({
            "apiKey": "sk-0123456789",
            "model": "gpt-4o-mini",
            "baseUrl": "https://api.example.com",
        }))
        .unwrap();
        assert_eq!(body.api_key, "sk-0123456789");
        assert_eq!(body.base_url.as_deref(), Some("https://api.example.com"));
    }

    #[test]
    fn default_body_takes_snake_and_camel() {
        let body: SaveDefaultBody = serde_json::from_value(json!({
            "provider": "anthropic",
            "model": "claude-3-5-sonnet-20241022",
            "api_key": "sk-ant-0123456789",
        }))
        .unwrap();
        assert_eq!(body.api_key.as_deref(), Some("sk-ant-0123456789"));
        assert!(body.base_url.is_none());
    }
}
