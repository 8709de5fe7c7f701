//! Per-storm shared state: the validated config cell, the ready/pause
//! gates drivers block on, and the stop latch behind exactly-once
//! `storm_stopped`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use storm_core::{InstanceId, StormConfig, StormContext, StormEvent, StormId, StormStatus};

use crate::counters::MessageCounters;
use crate::instances::ChannelInstanceTable;
use crate::roster::ChannelRoster;

/// Shared handle to the session's immutable-but-replaceable config.
///
/// `change_messages` / `change_slow_mode` swap in a new validated value;
/// drivers pick it up on their next send.
#[derive(Clone)]
pub struct ConfigCell {
    inner: Arc<RwLock<Arc<StormConfig>>>,
}

impl ConfigCell {
    pub fn new(config: StormConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn get(&self) -> Arc<StormConfig> {
        Arc::clone(&self.inner.read())
    }

    pub fn set(&self, config: StormConfig) {
        *self.inner.write() = Arc::new(config);
    }
}

/// One-way gate instances wait behind before storming.
///
/// Opens when every expected instance has reached Ready, when a failed
/// instance lowers the expectation far enough, or when forced.
#[derive(Clone)]
pub struct ReadyGate {
    seen: Arc<AtomicUsize>,
    target: Arc<AtomicUsize>,
    tx: Arc<watch::Sender<bool>>,
}

impl ReadyGate {
    pub fn new(target: usize) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            seen: Arc::new(AtomicUsize::new(0)),
            target: Arc::new(AtomicUsize::new(target)),
            tx: Arc::new(tx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// An instance reached Ready.
    pub fn mark_ready(&self) {
        self.seen.fetch_add(1, Ordering::SeqCst);
        self.try_open();
    }

    /// An instance dropped out before Ready; stop waiting for it.
    pub fn lower_target(&self) {
        let _ = self
            .target
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| Some(t.saturating_sub(1)));
        self.try_open();
    }

    /// More instances joined before the gate opened; wait for them too.
    pub fn raise_target(&self, by: usize) {
        self.target.fetch_add(by, Ordering::SeqCst);
    }

    /// Open regardless of readiness (start without waiting).
    pub fn force(&self) {
        if !self.is_open() {
            info!("ready gate forced open");
        }
        // send_replace: the gate must latch open even while no driver is
        // subscribed yet (plain send drops the value with zero receivers).
        let _ = self.tx.send_replace(true);
    }

    fn try_open(&self) {
        if self.seen.load(Ordering::SeqCst) >= self.target.load(Ordering::SeqCst) {
            let _ = self.tx.send_replace(true);
        }
    }
}

/// Pause gate: true = running, false = hold after the in-flight message.
#[derive(Clone)]
pub struct PauseGate {
    tx: Arc<watch::Sender<bool>>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn set_running(&self, running: bool) {
        // send_replace: state must stick even with no subscribed drivers.
        let _ = self.tx.send_replace(running);
    }

    pub fn is_running(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

/// State of one storm. Created by the registry, shared with driver tasks
/// and the server tier through an `Arc`.
pub struct StormSession {
    id: StormId,
    config: ConfigCell,
    status: RwLock<StormStatus>,
    start_time: DateTime<Utc>,
    table: Arc<ChannelInstanceTable>,
    counters: Arc<MessageCounters>,
    ready: ReadyGate,
    pause: PauseGate,
    cancel: CancellationToken,
    instance_cancels: Mutex<BTreeMap<InstanceId, CancellationToken>>,
    went_active: AtomicBool,
    stop_latch: AtomicBool,
}

impl StormSession {
    pub fn new(
        config: StormConfig,
        roster: &ChannelRoster,
        events: broadcast::Sender<StormEvent>,
    ) -> Arc<Self> {
        let expected = config.channels().len();
        Arc::new(Self {
            id: StormId::new(),
            config: ConfigCell::new(config),
            status: RwLock::new(StormStatus::Running),
            start_time: Utc::now(),
            table: Arc::new(ChannelInstanceTable::from_roster(roster, events)),
            counters: Arc::new(MessageCounters::new()),
            ready: ReadyGate::new(expected),
            pause: PauseGate::new(),
            cancel: CancellationToken::new(),
            instance_cancels: Mutex::new(BTreeMap::new()),
            went_active: AtomicBool::new(false),
            stop_latch: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &StormId {
        &self.id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn status(&self) -> StormStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: StormStatus) {
        *self.status.write() = status;
    }

    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    pub fn config(&self) -> Arc<StormConfig> {
        self.config.get()
    }

    pub fn config_cell(&self) -> ConfigCell {
        self.config.clone()
    }

    pub fn table(&self) -> &Arc<ChannelInstanceTable> {
        &self.table
    }

    pub fn counters(&self) -> &Arc<MessageCounters> {
        &self.counters
    }

    pub fn ready_gate(&self) -> &ReadyGate {
        &self.ready
    }

    pub fn pause_gate(&self) -> &PauseGate {
        &self.pause
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Child token for one instance, tracked so `kill` can stop it alone.
    pub fn register_instance(&self, id: InstanceId) -> CancellationToken {
        let token = self.cancel.child_token();
        self.instance_cancels.lock().insert(id, token.clone());
        token
    }

    pub fn cancel_instance(&self, id: InstanceId) -> bool {
        match self.instance_cancels.lock().remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Latch that the storm has had at least one live instance.
    pub fn notice_live(&self) {
        self.went_active.store(true, Ordering::SeqCst);
    }

    pub fn went_active(&self) -> bool {
        self.went_active.load(Ordering::SeqCst)
    }

    /// Transition to Stopped, cancel every instance and broadcast
    /// `storm_stopped`. Returns false if another path already stopped
    /// this session; the broadcast happens exactly once.
    pub fn shutdown(&self, events: &broadcast::Sender<StormEvent>) -> bool {
        if self.stop_latch.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.set_status(StormStatus::Stopped);
        self.cancel.cancel();
        let _ = events.send(StormEvent::StormStopped);
        true
    }

    /// Denormalized session view for `get_context`.
    pub fn context(&self) -> StormContext {
        let config = self.config.get();
        StormContext {
            video_url: config.video_url().to_string(),
            chat_url: config.chat_url().to_string(),
            messages: config.messages().to_vec(),
            slow_mode: config.slow_mode(),
            subscribe: config.subscribe(),
            subscribe_and_wait: config.subscribe_and_wait(),
            subscribe_wait_time: config.subscribe_wait_time(),
            background: config.background(),
            channels: config.channels().to_vec(),
            all_channels: self.table.snapshot(),
            storm_status: self.status(),
            start_time: self.start_time,
        }
    }
}

impl fmt::Debug for StormSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StormSession")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}
