use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Lifecycle state of one channel instance. The numeric codes are protocol
/// constants shared with every client; the wire always carries the code.
///
/// Variant order follows the codes, so derived ordering is code ordering.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum InstanceStatus {
    /// Pre-session default; never re-entered once the session tracks the instance.
    Idle,
    /// Terminal within the session. A crashed or killed instance lands here.
    Dead,
    GettingReady,
    Ready,
    Storming,
}

impl InstanceStatus {
    pub const fn code(self) -> i8 {
        match self {
            Self::Idle => -1,
            Self::Dead => 0,
            Self::GettingReady => 1,
            Self::Ready => 2,
            Self::Storming => 3,
        }
    }

    pub const fn from_code(code: i8) -> Option<Self> {
        match code {
            -1 => Some(Self::Idle),
            0 => Some(Self::Dead),
            1 => Some(Self::GettingReady),
            2 => Some(Self::Ready),
            3 => Some(Self::Storming),
            _ => None,
        }
    }

    /// Live instances still hold automation resources (code > 0).
    pub const fn is_live(self) -> bool {
        self.code() > 0
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Dead)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Dead => "Dead",
            Self::GettingReady => "Getting Ready",
            Self::Ready => "Ready",
            Self::Storming => "Storming",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for InstanceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.code())
    }
}

impl<'de> Deserialize<'de> for InstanceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("unknown instance status code {code}")))
    }
}

/// Lifecycle state of the whole storm. Serialized as the capitalized name.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum StormStatus {
    Running,
    Paused,
    Stopped,
}

impl StormStatus {
    /// Active means a client should offer to join rather than start fresh.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for StormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
