pub mod ai;
pub mod config;
pub mod environment;
pub mod settings;
pub mod storm;

use axum::Router;

use crate::state::AppState;

/// All REST routes. The websocket upgrade is attached by the server so it
/// can close over the client registry.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(config::router())
        .merge(storm::router())
        .merge(settings::router())
        .merge(ai::router())
        .merge(environment::router())
}
