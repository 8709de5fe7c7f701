pub mod env;
pub mod errors;
pub mod store;
pub mod types;

pub use env::EngineConfig;
pub use errors::{Result, SettingsError};
pub use store::{data_dir, SettingsStore};
pub use types::{
    AiProviders, AiSettings, GeneralSettings, LoginMethod, ProviderConfig, ProviderId,
    SavedSettings,
};
