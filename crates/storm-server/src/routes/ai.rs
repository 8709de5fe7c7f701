//! AI configuration introspection. Generation itself is out of scope for the
//! engine; these endpoints only tell the panel what is configured and what
//! the known providers are.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use storm_settings::ProviderId;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ai/status", get(ai_status))
        .route("/ai/providers", get(ai_providers))
}

async fn ai_status(State(state): State<AppState>) -> Json<Value> {
    let ai = state.settings.load().ai;
    match ai.configured() {
        Some((id, config)) => Json(json!({
            "configured": true,
            "provider": id.as_str(),
            "model": config.model,
            "hasBaseUrl": config.base_url.is_some(),
        })),
        None => Json(json!({
            "configured": false,
            "message": "No AI provider configured",
        })),
    }
}

async fn ai_providers() -> Json<Value> {
    let providers: Vec<Value> = ProviderId::ALL
        .iter()
        .map(|&id| {
            json!({
                "id": id.as_str(),
                "name": id.display_name(),
                "defaultModel": default_model(id),
                "suggestedModels": suggested_models(id),
            })
        })
        .collect();
    Json(json!({"success": true, "providers": providers}))
}

pub(crate) const fn default_model(id: ProviderId) -> &'static str {
    match id {
        ProviderId::OpenAi => "gpt-4o-mini",
        ProviderId::Anthropic => "claude-3-5-sonnet-20241022",
        ProviderId::Google => "gemini-1.5-flash",
    }
}

pub(crate) const fn suggested_models(id: ProviderId) -> &'static [&'static str] {
    match id {
        ProviderId::OpenAi => &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"],
        ProviderId::Anthropic => &[
            "claude-3-opus-20240229",
            "claude-3-5-sonnet-20241022",
            "claude-3-haiku-20240307",
        ],
        ProviderId::Google => &["gemini-1.5-pro", "gemini-1.5-flash", "gemini-1.0-pro"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_provider_suggests_its_default() {
        for id in ProviderId::ALL {
            assert!(suggested_models(id).contains(&default_model(id)));
        }
    }

    #[test]
    fn catalogue_serializes_with_camel_case_keys() {
        let entry = json!({
            "id": ProviderId::OpenAi.as_str(),
            "name": ProviderId::OpenAi.display_name(),
            "defaultModel": default_model(ProviderId::OpenAi),
            "suggestedModels": suggested_models(ProviderId::OpenAi),
        });
        assert_eq!(entry["id"], "openai");
        assert_eq!(entry["name"], "OpenAI");
        assert_eq!(entry["defaultModel"], "gpt-4o-mini");
    }
}
