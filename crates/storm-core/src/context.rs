use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::InstanceId;
use crate::status::{InstanceStatus, StormStatus};

/// One channel row as exposed to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelInstanceView {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    pub status: InstanceStatus,
}

/// Fully denormalized view of the active storm. Safe to fetch repeatedly;
/// this is what a late-joining client reconstructs state from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StormContext {
    pub video_url: String,
    pub chat_url: String,
    pub messages: Vec<String>,
    pub slow_mode: u32,
    pub subscribe: bool,
    pub subscribe_and_wait: bool,
    pub subscribe_wait_time: u32,
    pub background: bool,
    pub channels: Vec<InstanceId>,
    pub all_channels: BTreeMap<InstanceId, ChannelInstanceView>,
    pub storm_status: StormStatus,
    pub start_time: DateTime<Utc>,
}

impl StormContext {
    /// Instances ordered for display: status descending, id ascending on ties.
    pub fn display_order(&self) -> Vec<(InstanceId, &ChannelInstanceView)> {
        let mut rows: Vec<_> = self.all_channels.iter().map(|(id, v)| (*id, v)).collect();
        rows.sort_by_key(|(id, view)| (std::cmp::Reverse(view.status.code()), *id));
        rows
    }
}

/// Wire form of the context endpoint. Three distinct shapes: an active
/// session, "no storm" (client clears its in-progress flag, silently), and a
/// transient failure (client keeps state and surfaces it).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextReply {
    Active {
        success: bool,
        context: StormContext,
    },
    NoStorm {
        success: bool,
        storm: bool,
    },
    Failed {
        success: bool,
        error: String,
    },
}

impl ContextReply {
    pub fn active(context: StormContext) -> Self {
        Self::Active {
            success: true,
            context,
        }
    }

    pub fn no_storm() -> Self {
        Self::NoStorm {
            success: false,
            storm: false,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            success: false,
            error: error.into(),
        }
    }

    pub fn is_no_storm(&self) -> bool {
        matches!(self, Self::NoStorm { .. })
    }
}

/// Wire form of `GET /storm`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveCheck {
    pub success: bool,
    pub storm: bool,
    pub message: String,
}

impl ActiveCheck {
    pub fn new(storm: bool) -> Self {
        let message = if storm {
            "Storm is running"
        } else {
            "Storm is not running"
        };
        Self {
            success: true,
            storm,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> StormContext {
        let mut all_channels = BTreeMap::new();
        all_channels.insert(
            InstanceId(1),
            ChannelInstanceView {
                name: "Channel 1".into(),
                logo: None,
                status: InstanceStatus::Dead,
            },
        );
        all_channels.insert(
            InstanceId(2),
            ChannelInstanceView {
                name: "Channel 2".into(),
                logo: Some("https://example.com/logo.png".into()),
                status: InstanceStatus::Storming,
            },
        );
        all_channels.insert(
            InstanceId(3),
            ChannelInstanceView {
                name: "Channel 3".into(),
                logo: None,
                status: InstanceStatus::Storming,
            },
        );
        StormContext {
            video_url: "https://www.youtube.com/watch?v=abcdefghijk".into(),
            chat_url: "https://www.youtube.com/live_chat?v=abcdefghijk".into(),
            messages: vec!["hello".into()],
            slow_mode: 5,
            subscribe: false,
            subscribe_and_wait: false,
            subscribe_wait_time: 0,
            background: true,
            channels: vec![InstanceId(1), InstanceId(2), InstanceId(3)],
            all_channels,
            storm_status: StormStatus::Running,
            start_time: Utc::now(),
        }
    }

    #[test]
    fn display_order_is_status_desc_then_id() {
        let context = sample_context();
        let order: Vec<u32> = context
            .display_order()
            .iter()
            .map(|(id, _)| id.as_u32())
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn all_channels_keys_serialize_as_strings() {
        let context = sample_context();
        let json = serde_json::to_value(&context).unwrap();
        assert!(json["all_channels"]["2"].is_object());
        assert_eq!(json["all_channels"]["2"]["status"], 3);
    }

    #[test]
    fn reply_shapes_are_distinct() {
        let active = serde_json::to_value(ContextReply::active(sample_context())).unwrap();
        assert_eq!(active["success"], true);
        assert!(active["context"].is_object());

        let none = serde_json::to_value(ContextReply::no_storm()).unwrap();
        assert_eq!(none, serde_json::json!({"success": false, "storm": false}));

        let failed = serde_json::to_value(ContextReply::failed("timeout")).unwrap();
        assert_eq!(failed, serde_json::json!({"success": false, "error": "timeout"}));
    }

    #[test]
    fn reply_shapes_parse_back() {
        let no_storm: ContextReply =
            serde_json::from_str(r#"{"success": false, "storm": false}"#).unwrap();
        assert!(no_storm.is_no_storm());

        let failed: ContextReply =
            serde_json::from_str(r#"{"success": false, "error": "timeout"}"#).unwrap();
        assert_eq!(failed, ContextReply::failed("timeout"));

        let json = serde_json::to_string(&ContextReply::active(sample_context())).unwrap();
        let parsed: ContextReply = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ContextReply::Active { .. }));
    }

    #[test]
    fn active_check_messages() {
        let yes = ActiveCheck::new(true);
        assert!(yes.storm);
        assert_eq!(yes.message, "Storm is running");
        let no = ActiveCheck::new(false);
        assert!(!no.storm);
        assert_eq!(no.message, "Storm is not running");
    }
}
