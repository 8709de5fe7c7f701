use std::sync::Arc;

use storm_session::SessionRegistry;
use storm_settings::{EngineConfig, SettingsStore};

use crate::ws::ClientRegistry;

/// Shared application state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub settings: Arc<SettingsStore>,
    pub clients: Arc<ClientRegistry>,
    pub engine: Arc<EngineConfig>,
}
