pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod ids;
pub mod status;

pub use config::{ChannelSelection, ConfigError, StormConfig, StormConfigBuilder};
pub use context::{ActiveCheck, ChannelInstanceView, ContextReply, StormContext};
pub use errors::StormError;
pub use events::StormEvent;
pub use ids::{ClientId, InstanceId, StormId};
pub use status::{InstanceStatus, StormStatus};
