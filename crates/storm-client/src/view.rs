use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};

use storm_core::{
    ChannelInstanceView, ContextReply, InstanceId, StormContext, StormEvent, StormStatus,
};

use crate::errors::{ClientError, Surface};
use crate::feed::FeedItem;

const MAX_LOG_LINES: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Transient message for the toast area.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

/// Why the panel should ask before attaching to a running storm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinPrompt {
    /// The snapshot on connect revealed a storm this panel did not start.
    DiscoveredOnLoad,
    /// A start event arrived while the panel sat idle.
    PushedOnStart,
}

/// One line of the live log pane, as the engine emitted it.
#[derive(Clone, Debug, PartialEq)]
pub struct LogLine {
    pub time: String,
    pub level: String,
    pub message: String,
}

/// Latest `system_metrics` frame, kept verbatim for the gauges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricsView {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub used_ram_gb: f64,
    pub free_ram_percent: f64,
    pub free_ram_gb: f64,
    pub free_ram_mb: u64,
}

/// The panel's entire storm state, reduced from the merged feed. Every
/// mutation goes through [`apply`] or [`absorb_error`]; rendering only
/// reads. There is no second source of truth to reconcile against.
///
/// [`apply`]: StormView::apply
/// [`absorb_error`]: StormView::absorb_error
#[derive(Debug, Default)]
pub struct StormView {
    storm_in_progress: bool,
    self_started: bool,
    status: Option<StormStatus>,
    context: Option<StormContext>,
    instances: BTreeMap<InstanceId, ChannelInstanceView>,
    start_time: Option<DateTime<Utc>>,
    total_messages: u64,
    message_rate: f64,
    metrics: Option<MetricsView>,
    logs: VecDeque<LogLine>,
    notifications: Vec<Notification>,
    join_prompt: Option<JoinPrompt>,
    pending_conflict: Option<String>,
    field_error: Option<String>,
}

impl StormView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark that this panel itself issued the start command, so the join
    /// prompt stays quiet when the confirmation comes back over the feed.
    pub fn note_local_start(&mut self) {
        self.self_started = true;
    }

    pub fn apply(&mut self, item: FeedItem) {
        match item {
            FeedItem::Snapshot(reply) => self.apply_snapshot(reply),
            FeedItem::Event(event) => self.apply_event(event),
            FeedItem::Disconnected => {
                self.notify(Severity::Error, "lost connection to the engine");
            }
        }
    }

    fn apply_snapshot(&mut self, reply: ContextReply) {
        match reply {
            ContextReply::Active { context, .. } => {
                if !self.storm_in_progress && !self.self_started {
                    self.join_prompt = Some(JoinPrompt::DiscoveredOnLoad);
                }
                self.storm_in_progress = true;
                self.status = Some(context.storm_status);
                self.start_time = Some(context.start_time);
                self.instances = context.all_channels.clone();
                self.context = Some(context);
            }
            ContextReply::NoStorm { .. } => {
                // "No storm" is an answer, not a failure. Clear quietly.
                self.storm_in_progress = false;
                self.self_started = false;
                self.status = None;
                self.context = None;
                self.instances.clear();
                self.start_time = None;
            }
            ContextReply::Failed { error, .. } => {
                // Transient failure: keep what we have, tell the user.
                self.notify(Severity::Error, error);
            }
        }
    }

    fn apply_event(&mut self, event: StormEvent) {
        match event {
            StormEvent::StormStarted => {
                if !self.storm_in_progress && !self.self_started {
                    self.join_prompt = Some(JoinPrompt::PushedOnStart);
                }
                self.storm_in_progress = true;
                self.status = Some(StormStatus::Running);
                self.total_messages = 0;
                self.message_rate = 0.0;
            }
            StormEvent::StormStopped => {
                self.storm_in_progress = false;
                self.self_started = false;
                self.status = Some(StormStatus::Stopped);
                self.context = None;
                self.instances.clear();
                self.start_time = None;
            }
            StormEvent::StormPaused => self.status = Some(StormStatus::Paused),
            StormEvent::StormResumed => self.status = Some(StormStatus::Running),
            StormEvent::InstanceStatus { instance, status } => {
                // Rows added mid-session arrive here before any snapshot
                // names them; a placeholder keeps the table consistent.
                self.instances
                    .entry(instance)
                    .or_insert_with(|| ChannelInstanceView {
                        name: format!("Channel {instance}"),
                        logo: None,
                        status,
                    })
                    .status = status;
            }
            StormEvent::TotalMessages { total_messages } => self.total_messages = total_messages,
            StormEvent::MessagesRate { message_rate } => self.message_rate = message_rate,
            StormEvent::Log {
                time,
                level,
                message,
            } => {
                if self.logs.len() == MAX_LOG_LINES {
                    self.logs.pop_front();
                }
                self.logs.push_back(LogLine {
                    time,
                    level,
                    message,
                });
            }
            StormEvent::SystemMetrics {
                cpu_percent,
                ram_percent,
                used_ram_gb,
                free_ram_percent,
                free_ram_gb,
                free_ram_mb,
            } => {
                self.metrics = Some(MetricsView {
                    cpu_percent,
                    ram_percent,
                    used_ram_gb,
                    free_ram_percent,
                    free_ram_gb,
                    free_ram_mb,
                });
            }
        }
    }

    /// Route a failed command onto the surface it belongs to. The view
    /// absorbs every failure; nothing propagates past here.
    pub fn absorb_error(&mut self, err: ClientError) {
        match err.surface() {
            Some(Surface::Inline) => self.field_error = Some(err.to_string()),
            Some(Surface::Notification) => self.notify(Severity::Error, err.to_string()),
            Some(Surface::Confirmation) => self.pending_conflict = Some(err.to_string()),
            None => {}
        }
    }

    pub fn storm_in_progress(&self) -> bool {
        self.storm_in_progress
    }

    pub fn status(&self) -> Option<StormStatus> {
        self.status
    }

    pub fn context(&self) -> Option<&StormContext> {
        self.context.as_ref()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Session age for the ticker; recomputed from wall clock, never
    /// accumulated locally.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.start_time.map(|start| now - start)
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    pub fn message_rate(&self) -> f64 {
        self.message_rate
    }

    pub fn metrics(&self) -> Option<MetricsView> {
        self.metrics
    }

    pub fn logs(&self) -> impl Iterator<Item = &LogLine> {
        self.logs.iter()
    }

    /// Rows for the instance table: status descending, id ascending on ties.
    pub fn instance_rows(&self) -> Vec<(InstanceId, &ChannelInstanceView)> {
        let mut rows: Vec<_> = self.instances.iter().map(|(id, view)| (*id, view)).collect();
        rows.sort_by_key(|(id, view)| (std::cmp::Reverse(view.status.code()), *id));
        rows
    }

    /// Drain pending toasts for display.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn join_prompt(&self) -> Option<JoinPrompt> {
        self.join_prompt
    }

    /// The user answered the join prompt, either way.
    pub fn resolve_join_prompt(&mut self) -> Option<JoinPrompt> {
        self.join_prompt.take()
    }

    pub fn pending_conflict(&self) -> Option<&str> {
        self.pending_conflict.as_deref()
    }

    pub fn resolve_conflict(&mut self) -> Option<String> {
        self.pending_conflict.take()
    }

    pub fn field_error(&self) -> Option<&str> {
        self.field_error.as_deref()
    }

    pub fn clear_field_error(&mut self) {
        self.field_error = None;
    }

    fn notify(&mut self, severity: Severity, message: impl Into<String>) {
        self.notifications.push(Notification {
            severity,
            message: message.into(),
        });
    }
}
