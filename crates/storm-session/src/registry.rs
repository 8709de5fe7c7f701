use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use storm_core::{
    ChannelSelection, InstanceId, StormConfig, StormContext, StormError, StormEvent, StormStatus,
};

use crate::busy::BusyFlag;
use crate::capacity::MemoryProbe;
use crate::counters::RateWindow;
use crate::driver::{stagger_delay, ChannelDriver, InstanceHandles};
use crate::roster::{ChannelRoster, RosterError, RosterStore};
use crate::session::StormSession;

/// Cadence of the `total_messages` / `messages_rate` broadcasts.
const COUNTER_TICK: Duration = Duration::from_secs(2);

/// Owns the single active [`StormSession`] and every command that acts on it.
///
/// All commands are synchronous; the registry spawns the per-instance runners
/// and the bookkeeping tasks onto the ambient tokio runtime. The slot holds at
/// most one session, and a stopped session is replaced on the next start.
pub struct SessionRegistry {
    events: broadcast::Sender<StormEvent>,
    slot: Arc<Mutex<Option<Arc<StormSession>>>>,
    driver: Arc<dyn ChannelDriver>,
    roster: Arc<RosterStore>,
    probe: Arc<dyn MemoryProbe>,
    ram_per_instance_mb: u64,
    busy: BusyFlag,
}

impl SessionRegistry {
    pub fn new(
        events: broadcast::Sender<StormEvent>,
        driver: Arc<dyn ChannelDriver>,
        roster: Arc<RosterStore>,
        probe: Arc<dyn MemoryProbe>,
        ram_per_instance_mb: u64,
    ) -> Self {
        Self {
            events,
            slot: Arc::new(Mutex::new(None)),
            driver,
            roster,
            probe,
            ram_per_instance_mb,
            busy: BusyFlag::default(),
        }
    }

    pub fn events(&self) -> &broadcast::Sender<StormEvent> {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StormEvent> {
        self.events.subscribe()
    }

    pub fn busy(&self) -> &BusyFlag {
        &self.busy
    }

    pub fn roster_store(&self) -> &Arc<RosterStore> {
        &self.roster
    }

    pub fn probe(&self) -> &Arc<dyn MemoryProbe> {
        &self.probe
    }

    /// The active session, if one is running or paused.
    pub fn active(&self) -> Option<Arc<StormSession>> {
        self.slot.lock().as_ref().filter(|s| s.is_active()).cloned()
    }

    pub fn is_active(&self) -> bool {
        self.active().is_some()
    }

    pub fn context(&self) -> Option<StormContext> {
        self.active().map(|session| session.context())
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.active().map(|session| session.start_time())
    }

    /// Start a storm from a validated config.
    ///
    /// Fails fast before any instance is spawned: the engine must not be busy
    /// with environment work, no session may be active, every selected channel
    /// needs a profile, and free memory must cover the requested population.
    /// On success the session fills the slot, `storm_started` goes out, and
    /// one runner per channel is spawned with its stagger slot.
    pub fn start(&self, config: StormConfig) -> Result<Arc<StormSession>, StormError> {
        if let Some(reason) = self.busy.reason() {
            return Err(StormError::Busy(reason));
        }
        let roster = self.load_roster()?;
        for id in config.channels() {
            if !roster.contains(*id) {
                return Err(StormError::InsufficientCapacity(format!(
                    "channel {id} has no profile, create profiles first"
                )));
            }
        }
        let wanted = config.channels().len();
        self.check_headroom(wanted)?;

        let session = {
            let mut slot = self.slot.lock();
            if slot.as_ref().is_some_and(|s| s.is_active()) {
                return Err(StormError::AlreadyActive);
            }
            let session = StormSession::new(config, &roster, self.events.clone());
            *slot = Some(Arc::clone(&session));
            session
        };

        info!(storm = %session.id(), channels = wanted, "storm starting");
        let _ = self.events.send(StormEvent::StormStarted);

        // Subscribe before the first runner can report a status, so the
        // watcher never misses the transition it latches on.
        let watcher_rx = self.events.subscribe();
        let selection: Vec<InstanceId> = session.config().channels().to_vec();
        let slow_mode = session.config().slow_mode();
        for (slot_idx, &id) in selection.iter().enumerate() {
            self.spawn_instance(
                &session,
                id,
                slot_idx,
                stagger_delay(slot_idx, slow_mode, selection.len()),
            );
        }
        self.spawn_counters(Arc::clone(&session));
        self.spawn_auto_stop(Arc::clone(&session), watcher_rx);

        Ok(session)
    }

    /// Stop the active storm and free the slot.
    pub fn stop(&self) -> Result<(), StormError> {
        let session = {
            let mut slot = self.slot.lock();
            match slot.take() {
                Some(session) if session.is_active() => session,
                _ => return Err(StormError::NoActiveSession),
            }
        };
        session.shutdown(&self.events);
        info!(storm = %session.id(), "storm stopped");
        Ok(())
    }

    /// Pause posting. Runners finish their in-flight sleep and then hold.
    pub fn pause(&self) -> Result<(), StormError> {
        let session = self.require_active()?;
        match session.status() {
            StormStatus::Running => {
                session.set_status(StormStatus::Paused);
                session.pause_gate().set_running(false);
                let _ = self.events.send(StormEvent::StormPaused);
                info!(storm = %session.id(), "storm paused");
                Ok(())
            }
            status => Err(StormError::InvalidTransition {
                action: "pause",
                state: status.as_str(),
            }),
        }
    }

    /// Resume a paused storm. Runners re-stagger before their next message.
    pub fn resume(&self) -> Result<(), StormError> {
        let session = self.require_active()?;
        match session.status() {
            StormStatus::Paused => {
                session.set_status(StormStatus::Running);
                session.pause_gate().set_running(true);
                let _ = self.events.send(StormEvent::StormResumed);
                info!(storm = %session.id(), "storm resumed");
                Ok(())
            }
            status => Err(StormError::InvalidTransition {
                action: "resume",
                state: status.as_str(),
            }),
        }
    }

    /// Swap the message pool. Runners pick up the new pool on their next pick.
    pub fn change_messages(&self, messages: Vec<String>) -> Result<(), StormError> {
        let session = self.require_active()?;
        let updated = session.config().with_messages(messages)?;
        session.config_cell().set(updated);
        info!("storm messages changed");
        Ok(())
    }

    /// Change the per-instance posting interval mid-storm.
    pub fn change_slow_mode(&self, seconds: u32) -> Result<(), StormError> {
        let session = self.require_active()?;
        let updated = session.config().with_slow_mode(seconds);
        session.config_cell().set(updated);
        info!(seconds, "slow mode changed");
        Ok(())
    }

    /// Bring additional channels into the running storm. Dead and idle rows
    /// are revived; a channel that is already live is rejected.
    pub fn add_channels(&self, channels: Vec<u32>) -> Result<(), StormError> {
        let session = self.require_active()?;
        let ids = ChannelSelection::Advanced { channels }.resolve()?;
        let table = session.table();

        for &id in &ids {
            if !table.contains(id) {
                return Err(StormError::NotFound(id));
            }
            if table.is_live(id) {
                let name = table
                    .profile(id)
                    .map(|profile| profile.name)
                    .unwrap_or_default();
                return Err(StormError::InsufficientCapacity(format!(
                    "channel {id} ({name}) is already running"
                )));
            }
        }

        let live_now = table.live_count();
        self.check_headroom(live_now + ids.len())?;

        // A still-ramping storm waits for the newcomers too.
        if !session.ready_gate().is_open() {
            session.ready_gate().raise_target(ids.len());
        }

        let slow_mode = session.config().slow_mode();
        let population = live_now + ids.len();
        for (slot_idx, &id) in ids.iter().enumerate() {
            table.reset_idle(id)?;
            self.spawn_instance(
                &session,
                id,
                slot_idx,
                stagger_delay(slot_idx, slow_mode, population),
            );
        }
        info!(added = ids.len(), population, "channels added to storm");
        Ok(())
    }

    /// Kill one instance: cancel its runner and mark the row dead.
    pub fn kill_instance(&self, id: InstanceId) -> Result<(), StormError> {
        let session = self.require_active()?;
        session.table().kill(id)?;
        session.cancel_instance(id);
        info!(instance = id.as_u32(), "instance killed");
        Ok(())
    }

    /// Open the ready gate without waiting for the remaining instances.
    pub fn force_ready(&self) -> Result<(), StormError> {
        let session = self.require_active()?;
        session.ready_gate().force();
        Ok(())
    }

    fn require_active(&self) -> Result<Arc<StormSession>, StormError> {
        self.active().ok_or(StormError::NoActiveSession)
    }

    fn load_roster(&self) -> Result<ChannelRoster, StormError> {
        match self.roster.load() {
            Ok(roster) => Ok(roster),
            Err(RosterError::Missing) => Err(StormError::InsufficientCapacity(
                "no channel profiles exist, create profiles first".into(),
            )),
            Err(err) => Err(StormError::Internal(err.to_string())),
        }
    }

    /// Free-RAM heuristic. A blind probe (non-Linux hosts) never blocks.
    fn check_headroom(&self, population: usize) -> Result<(), StormError> {
        let sample = self.probe.sample();
        if let Some(capacity) = sample.instance_capacity(self.ram_per_instance_mb) {
            if population as u64 > capacity {
                return Err(StormError::InsufficientCapacity(format!(
                    "free memory allows {capacity} instances, {population} requested"
                )));
            }
        }
        Ok(())
    }

    fn spawn_instance(
        &self,
        session: &Arc<StormSession>,
        id: InstanceId,
        slot: usize,
        stagger: Duration,
    ) {
        let name = session
            .table()
            .profile(id)
            .map(|profile| profile.name)
            .unwrap_or_default();
        let handles = InstanceHandles {
            id,
            name,
            slot,
            stagger,
            config: session.config_cell(),
            table: Arc::clone(session.table()),
            counters: Arc::clone(session.counters()),
            ready: session.ready_gate().clone(),
            pause: session.pause_gate().clone(),
            cancel: session.register_instance(id),
        };
        let driver = Arc::clone(&self.driver);
        debug!(instance = id.as_u32(), slot, ?stagger, "spawning instance runner");
        tokio::spawn(async move { driver.run(handles).await });
    }

    /// Periodic throughput broadcasts, gated on the storm going ready.
    fn spawn_counters(&self, session: Arc<StormSession>) {
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut ready = session.ready_gate().subscribe();
            while !*ready.borrow_and_update() {
                tokio::select! {
                    _ = session.cancel_token().cancelled() => return,
                    changed = ready.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }

            let mut window = RateWindow::new();
            let mut ticker = tokio::time::interval(COUNTER_TICK);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = session.cancel_token().cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let total = session.counters().total();
                let rate = window.tick(total, COUNTER_TICK.as_secs());
                let _ = events.send(StormEvent::TotalMessages {
                    total_messages: total,
                });
                let _ = events.send(StormEvent::MessagesRate { message_rate: rate });
            }
        });
    }

    /// Watch instance statuses and stop the storm once every instance that
    /// ever went live is gone. Nothing fires while the storm is still idle.
    fn spawn_auto_stop(
        &self,
        session: Arc<StormSession>,
        mut rx: broadcast::Receiver<StormEvent>,
    ) {
        let events = self.events.clone();
        let slot = Arc::clone(&self.slot);
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = session.cancel_token().cancelled() => return,
                    received = rx.recv() => received,
                };
                match received {
                    Ok(StormEvent::InstanceStatus { status, .. }) => {
                        if status.is_live() {
                            session.notice_live();
                        } else if all_runners_gone(&session) {
                            finish_drained_storm(&session, &events, &slot);
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "auto-stop watcher lagged, re-checking");
                        if all_runners_gone(&session) {
                            finish_drained_storm(&session, &events, &slot);
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
    }
}

fn all_runners_gone(session: &StormSession) -> bool {
    session.went_active() && session.table().live_count() == 0
}

fn finish_drained_storm(
    session: &Arc<StormSession>,
    events: &broadcast::Sender<StormEvent>,
    slot: &Mutex<Option<Arc<StormSession>>>,
) {
    if session.shutdown(events) {
        info!(storm = %session.id(), "all instances finished, storm stopped");
    }
    let mut slot = slot.lock();
    if slot.as_ref().is_some_and(|s| s.id() == session.id()) {
        *slot = None;
    }
}
