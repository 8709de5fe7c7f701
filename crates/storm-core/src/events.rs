use serde::{Deserialize, Serialize};

use crate::ids::InstanceId;
use crate::status::InstanceStatus;

/// Everything the backend pushes to connected observers. One WebSocket frame
/// carries exactly one of these, serialized as `{"event": ..., "data": ...}`.
///
/// Delivery is at-most-once per client with no replay; late joiners
/// reconstruct state from the context snapshot instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum StormEvent {
    #[serde(rename = "storm_started")]
    StormStarted,

    #[serde(rename = "storm_stopped")]
    StormStopped,

    #[serde(rename = "storm_paused")]
    StormPaused,

    #[serde(rename = "storm_resumed")]
    StormResumed,

    #[serde(rename = "instance_status")]
    InstanceStatus {
        instance: InstanceId,
        status: InstanceStatus,
    },

    #[serde(rename = "total_messages")]
    TotalMessages { total_messages: u64 },

    #[serde(rename = "messages_rate")]
    MessagesRate { message_rate: f64 },

    #[serde(rename = "log")]
    Log {
        time: String,
        level: String,
        message: String,
    },

    #[serde(rename = "system_metrics")]
    SystemMetrics {
        cpu_percent: f64,
        ram_percent: f64,
        used_ram_gb: f64,
        free_ram_percent: f64,
        free_ram_gb: f64,
        free_ram_mb: u64,
    },
}

impl StormEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StormStarted => "storm_started",
            Self::StormStopped => "storm_stopped",
            Self::StormPaused => "storm_paused",
            Self::StormResumed => "storm_resumed",
            Self::InstanceStatus { .. } => "instance_status",
            Self::TotalMessages { .. } => "total_messages",
            Self::MessagesRate { .. } => "messages_rate",
            Self::Log { .. } => "log",
            Self::SystemMetrics { .. } => "system_metrics",
        }
    }

    /// Lifecycle events flip the client's in-progress flag; the rest only
    /// refresh counters or rows.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::StormStarted | Self::StormStopped | Self::StormPaused | Self::StormResumed
        )
    }
}
