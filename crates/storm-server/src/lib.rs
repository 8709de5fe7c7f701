pub mod bridge;
pub mod envelope;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;

pub use server::{start, ServerConfig, ServerHandle};
pub use state::AppState;
pub use ws::ClientRegistry;
