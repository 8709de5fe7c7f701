//! The seam between session management and whatever actually posts chat
//! messages.
//!
//! A driver owns one instance's lifecycle: it reports status through the
//! table, waits behind the ready/pause gates, paces itself by the live
//! config and records every delivered message. The scripted driver walks
//! the same lifecycle with simulated delays; the registry and server
//! tests (and the default binary) run against it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use storm_core::{InstanceId, InstanceStatus};

use crate::counters::MessageCounters;
use crate::instances::ChannelInstanceTable;
use crate::session::{ConfigCell, PauseGate, ReadyGate};

/// Everything a driver needs to run one instance.
pub struct InstanceHandles {
    pub id: InstanceId,
    pub name: String,
    /// Ordinal within the batch this instance started with, for staggering.
    pub slot: usize,
    /// Initial delay before the first message.
    pub stagger: Duration,
    pub config: ConfigCell,
    pub table: Arc<ChannelInstanceTable>,
    pub counters: Arc<MessageCounters>,
    pub ready: ReadyGate,
    pub pause: PauseGate,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait ChannelDriver: Send + Sync {
    async fn run(&self, handles: InstanceHandles);
}

/// Spread instance starts across one slow-mode interval so messages do
/// not land in bursts.
pub fn stagger_delay(slot: usize, slow_mode_secs: u32, population: usize) -> Duration {
    if population == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(slot as f64 * slow_mode_secs as f64 / population as f64)
}

/// Driver that simulates the browser lifecycle without a browser.
pub struct ScriptedDriver {
    setup_delay: Duration,
    post_delay: Duration,
    failing: HashSet<InstanceId>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            setup_delay: Duration::from_millis(400),
            post_delay: Duration::from_millis(25),
            failing: HashSet::new(),
        }
    }

    /// How long the simulated login/navigation takes.
    pub fn with_setup_delay(mut self, delay: Duration) -> Self {
        self.setup_delay = delay;
        self
    }

    /// How long one simulated send takes.
    pub fn with_post_delay(mut self, delay: Duration) -> Self {
        self.post_delay = delay;
        self
    }

    /// Script a login failure for this instance.
    pub fn failing_login(mut self, id: InstanceId) -> Self {
        self.failing.insert(id);
        self
    }

    async fn drive(&self, h: &InstanceHandles) {
        if h.table.set_status(h.id, InstanceStatus::GettingReady).is_err() {
            return;
        }

        // simulated login + navigation to the chat page
        if !idle(&h.cancel, self.setup_delay).await {
            return;
        }
        if self.failing.contains(&h.id) {
            warn!(instance = h.id.as_u32(), name = %h.name, "login failed, dropping instance");
            h.ready.lower_target();
            return;
        }

        if h.table.set_status(h.id, InstanceStatus::Ready).is_err() {
            return;
        }
        h.ready.mark_ready();

        let config = h.config.get();
        if config.subscribe_and_wait() && config.subscribe_wait_time() > 0 {
            let wait = Duration::from_secs(u64::from(config.subscribe_wait_time()));
            if !idle(&h.cancel, wait).await {
                return;
            }
        }
        drop(config);

        let mut ready_rx = h.ready.subscribe();
        if !wait_open(&mut ready_rx, &h.cancel).await {
            return;
        }

        if h.table.set_status(h.id, InstanceStatus::Storming).is_err() {
            return;
        }

        let mut pause_rx = h.pause.subscribe();
        let mut pending_stagger = Some(h.stagger);

        loop {
            match wait_running(&mut pause_rx, &h.cancel).await {
                None => return,
                Some(true) => {
                    // re-spread after a pause so resume is not a burst
                    let config = h.config.get();
                    let live = h.table.live_count();
                    pending_stagger = Some(stagger_delay(h.slot, config.slow_mode(), live));
                }
                Some(false) => {}
            }

            if let Some(delay) = pending_stagger.take() {
                if !idle(&h.cancel, delay).await {
                    return;
                }
            }

            let config = h.config.get();
            let message = {
                let mut rng = rand::thread_rng();
                config.messages().choose(&mut rng).cloned()
            };
            let Some(message) = message else {
                return;
            };

            if !idle(&h.cancel, self.post_delay).await {
                return;
            }
            h.counters.record();
            debug!(instance = h.id.as_u32(), message = %message, "message posted");

            let slow = Duration::from_secs(u64::from(config.slow_mode()));
            if !idle(&h.cancel, slow).await {
                return;
            }
        }
    }
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelDriver for ScriptedDriver {
    async fn run(&self, handles: InstanceHandles) {
        self.drive(&handles).await;
        // every exit path ends Dead; a killed instance is already there
        let _ = handles.table.set_status(handles.id, InstanceStatus::Dead);
    }
}

/// Sleep unless cancelled first. False means cancelled.
async fn idle(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Block until the gate reads true. False means cancelled or gate gone.
async fn wait_open(gate: &mut watch::Receiver<bool>, cancel: &CancellationToken) -> bool {
    while !*gate.borrow_and_update() {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            changed = gate.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
    true
}

/// Block while paused. `Some(true)` when at least one pause was waited
/// out, `None` when cancelled.
async fn wait_running(
    pause: &mut watch::Receiver<bool>,
    cancel: &CancellationToken,
) -> Option<bool> {
    let mut was_paused = false;
    while !*pause.borrow_and_update() {
        was_paused = true;
        tokio::select! {
            _ = cancel.cancelled() => return None,
            changed = pause.changed() => {
                if changed.is_err() {
                    return None;
                }
            }
        }
    }
    Some(was_paused)
}
