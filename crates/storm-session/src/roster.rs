//! File-backed roster of provisioned channel profiles.
//!
//! The roster (`channels.json`) maps channel ids to display metadata and is
//! the universe a storm selection is validated against. Profile creation
//! grows it; a killed instance frees its slot for a later re-add.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use storm_core::InstanceId;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("channel roster not found")]
    Missing,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid roster file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Display metadata for one provisioned channel profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

impl ChannelProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logo: None,
        }
    }
}

/// The set of channels available for storming.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRoster {
    pub no_of_channels: u32,
    pub channels: BTreeMap<InstanceId, ChannelProfile>,
}

impl ChannelRoster {
    /// Roster with `count` placeholder profiles named `Channel 1..=count`.
    pub fn seeded(count: u32) -> Self {
        let channels = (1..=count)
            .map(|n| (InstanceId::from(n), ChannelProfile::named(format!("Channel {n}"))))
            .collect();
        Self {
            no_of_channels: count,
            channels,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.channels.contains_key(&id)
    }

    pub fn get(&self, id: InstanceId) -> Option<&ChannelProfile> {
        self.channels.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.channels.keys().copied()
    }
}

/// Reads and writes the roster file.
pub struct RosterStore {
    path: PathBuf,
}

impl RosterStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<ChannelRoster, RosterError> {
        if !self.path.exists() {
            return Err(RosterError::Missing);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, roster: &ChannelRoster) -> Result<(), RosterError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(roster)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Grow the roster to `count` profiles. Existing entries keep their
    /// metadata; new slots get placeholder names.
    pub fn create_profiles(&self, count: u32) -> Result<ChannelRoster, RosterError> {
        let mut roster = match self.load() {
            Ok(roster) => roster,
            Err(RosterError::Missing) => ChannelRoster::default(),
            Err(e) => return Err(e),
        };

        for n in 1..=count {
            let id = InstanceId::from(n);
            roster
                .channels
                .entry(id)
                .or_insert_with(|| ChannelProfile::named(format!("Channel {n}")));
        }
        roster.no_of_channels = roster.channels.len() as u32;

        self.save(&roster)?;
        debug!(count = roster.no_of_channels, path = %self.path.display(), "roster updated");
        Ok(roster)
    }
}
