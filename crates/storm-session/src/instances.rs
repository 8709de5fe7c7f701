//! Channel-instance table: id → lifecycle status for every roster channel
//! the session knows about.
//!
//! The table is the single place instance status changes, and it emits
//! `instance_status` on every real transition. A Dead row holds its state
//! until the registry revives it for a re-add.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use storm_core::{ChannelInstanceView, InstanceId, InstanceStatus, StormError, StormEvent};

use crate::roster::{ChannelProfile, ChannelRoster};

struct InstanceRow {
    profile: ChannelProfile,
    status: InstanceStatus,
}

pub struct ChannelInstanceTable {
    rows: RwLock<BTreeMap<InstanceId, InstanceRow>>,
    events: broadcast::Sender<StormEvent>,
}

impl ChannelInstanceTable {
    /// Table seeded with every roster channel at Idle.
    pub fn from_roster(roster: &ChannelRoster, events: broadcast::Sender<StormEvent>) -> Self {
        let rows = roster
            .channels
            .iter()
            .map(|(id, profile)| {
                (
                    *id,
                    InstanceRow {
                        profile: profile.clone(),
                        status: InstanceStatus::Idle,
                    },
                )
            })
            .collect();
        Self {
            rows: RwLock::new(rows),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.rows.read().contains_key(&id)
    }

    pub fn status_of(&self, id: InstanceId) -> Option<InstanceStatus> {
        self.rows.read().get(&id).map(|row| row.status)
    }

    /// Instances currently live (status code > 0).
    pub fn live_count(&self) -> usize {
        self.rows
            .read()
            .values()
            .filter(|row| row.status.is_live())
            .count()
    }

    pub fn live_ids(&self) -> Vec<InstanceId> {
        self.rows
            .read()
            .iter()
            .filter(|(_, row)| row.status.is_live())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn is_live(&self, id: InstanceId) -> bool {
        self.status_of(id).is_some_and(|s| s.is_live())
    }

    /// Record a status transition and broadcast it. Setting the current
    /// status again is a no-op; a Dead row never leaves Dead through here.
    pub fn set_status(&self, id: InstanceId, status: InstanceStatus) -> Result<(), StormError> {
        {
            let mut rows = self.rows.write();
            let row = rows.get_mut(&id).ok_or(StormError::NotFound(id))?;

            if row.status == status {
                return Ok(());
            }
            if row.status.is_terminal() {
                warn!(instance = id.as_u32(), target_status = status.as_str(), "ignoring status change on dead instance");
                return Ok(());
            }

            row.status = status;
        }

        debug!(instance = id.as_u32(), status = status.as_str(), "instance status changed");
        let _ = self.events.send(StormEvent::InstanceStatus {
            instance: id,
            status,
        });
        Ok(())
    }

    /// Force an instance Dead. Legal only while it is live.
    pub fn kill(&self, id: InstanceId) -> Result<(), StormError> {
        {
            let mut rows = self.rows.write();
            let row = rows.get_mut(&id).ok_or(StormError::NotFound(id))?;
            if !row.status.is_live() {
                return Err(StormError::AlreadyTerminal(id));
            }
            row.status = InstanceStatus::Dead;
        }

        let _ = self.events.send(StormEvent::InstanceStatus {
            instance: id,
            status: InstanceStatus::Dead,
        });
        Ok(())
    }

    /// Put a non-live row back to Idle so a fresh driver can take it over.
    /// No emission: the new driver's `GettingReady` is the first visible
    /// transition of the new lifecycle.
    pub fn reset_idle(&self, id: InstanceId) -> Result<(), StormError> {
        let mut rows = self.rows.write();
        let row = rows.get_mut(&id).ok_or(StormError::NotFound(id))?;
        if row.status.is_live() {
            return Err(StormError::InvalidTransition {
                action: "restart",
                state: row.status.as_str(),
            });
        }
        row.status = InstanceStatus::Idle;
        Ok(())
    }

    pub fn profile(&self, id: InstanceId) -> Option<ChannelProfile> {
        self.rows.read().get(&id).map(|row| row.profile.clone())
    }

    /// Full view of the table in ascending id order.
    pub fn snapshot(&self) -> BTreeMap<InstanceId, ChannelInstanceView> {
        self.rows
            .read()
            .iter()
            .map(|(id, row)| {
                (
                    *id,
                    ChannelInstanceView {
                        name: row.profile.name.clone(),
                        logo: row.profile.logo.clone(),
                        status: row.status,
                    },
                )
            })
            .collect()
    }
}
