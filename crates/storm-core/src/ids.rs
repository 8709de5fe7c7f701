use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(StormId, "storm");
branded_id!(ClientId, "client");

/// 1-based channel index. Doubles as the instance id for the lifetime of a
/// session, so the wire format is the bare number.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct InstanceId(pub u32);

/// JSON object keys are always strings, and buffered deserializers (untagged
/// enums buffer into serde's internal `Content`) do not coerce them back to
/// integers the way serde_json's direct path does — so accept the channel
/// number both bare and in its string-key form.
impl<'de> Deserialize<'de> for InstanceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = InstanceId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a channel number, bare or as a string key")
            }

            fn visit_u64<E: de::Error>(self, n: u64) -> Result<InstanceId, E> {
                u32::try_from(n)
                    .map(InstanceId)
                    .map_err(|_| E::custom(format!("channel number {n} out of range")))
            }

            fn visit_i64<E: de::Error>(self, n: i64) -> Result<InstanceId, E> {
                u32::try_from(n)
                    .map(InstanceId)
                    .map_err(|_| E::custom(format!("channel number {n} out of range")))
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<InstanceId, E> {
                s.parse::<u32>()
                    .map(InstanceId)
                    .map_err(|_| E::custom(format!("invalid channel number {s:?}")))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

impl InstanceId {
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for InstanceId {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
