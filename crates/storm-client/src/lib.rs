//! Client side of the StreamStorm protocol: REST commands with timeout and
//! cancellation, the merged snapshot-plus-event feed, and the reconciliation
//! view a panel renders from.

pub mod commands;
pub mod errors;
pub mod feed;
pub mod view;

pub use commands::{
    ChannelsData, EngineInfo, RamInfo, RosterEntry, RosterQuery, StartedStorm, StormClient,
    DEFAULT_HOST,
};
pub use errors::{ClientError, Surface};
pub use feed::{EventFeed, FeedItem};
pub use view::{JoinPrompt, LogLine, MetricsView, Notification, Severity, StormView};
