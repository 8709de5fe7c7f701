use chrono::Local;
use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use storm_core::StormEvent;

/// Modules that run inside the event fan-out path. Forwarding their own
/// logs back into the pipe would loop, so they stay console-only.
const SUPPRESSED_TARGETS: &[&str] = &["storm_server::ws", "storm_server::bridge"];

/// tracing Layer that forwards INFO+ events to panel clients as
/// [`StormEvent::Log`] frames.
pub struct BroadcastLogLayer {
    tx: broadcast::Sender<StormEvent>,
}

impl BroadcastLogLayer {
    pub fn new(tx: broadcast::Sender<StormEvent>) -> Self {
        Self { tx }
    }
}

/// Visitor that extracts the message and remaining fields from an event.
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: Vec::new(),
        }
    }

    fn into_message(self) -> String {
        let mut out = self.message.unwrap_or_default();
        for (name, value) in self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&name);
            out.push('=');
            out.push_str(&value);
        }
        out
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{:?}", value);
        match field.name() {
            "message" => self.message = Some(val),
            name => self.fields.push((name.to_string(), val)),
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            name => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }
}

impl<S> Layer<S> for BroadcastLogLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        // Panel shows INFO and above
        let level = *event.metadata().level();
        if level > tracing::Level::INFO {
            return;
        }

        let target = event.metadata().target();
        if SUPPRESSED_TARGETS.iter().any(|t| target.starts_with(t)) {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        // Send fails only when no panel is connected
        let _ = self.tx.send(StormEvent::Log {
            time: Local::now().format("%H:%M:%S").to_string(),
            level: level.to_string(),
            message: visitor.into_message(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(f: impl FnOnce()) -> Vec<StormEvent> {
        let (tx, mut rx) = broadcast::channel(64);
        let subscriber = tracing_subscriber::registry().with(BroadcastLogLayer::new(tx));
        tracing::subscriber::with_default(subscriber, f);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn info_events_are_forwarded_with_clock_time() {
        let events = capture(|| {
            tracing::info!("storm started");
        });
        assert_eq!(events.len(), 1);
        match &events[0] {
            StormEvent::Log { time, level, message } => {
                assert_eq!(level, "INFO");
                assert_eq!(message, "storm started");
                assert_eq!(time.len(), 8);
                assert_eq!(time.as_bytes()[2], b':');
                assert_eq!(time.as_bytes()[5], b':');
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn debug_events_are_not_forwarded() {
        let events = capture(|| {
            tracing::debug!("noise");
            tracing::trace!("more noise");
        });
        assert!(events.is_empty());
    }

    #[test]
    fn fanout_modules_are_suppressed() {
        let events = capture(|| {
            tracing::warn!(target: "storm_server::ws", "client queue full");
            tracing::warn!(target: "storm_server::bridge", "lagged");
            tracing::warn!(target: "storm_session::registry", "kept");
        });
        assert_eq!(events.len(), 1);
        match &events[0] {
            StormEvent::Log { message, level, .. } => {
                assert_eq!(message, "kept");
                assert_eq!(level, "WARN");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn extra_fields_are_appended_to_the_message() {
        let events = capture(|| {
            tracing::info!(instance = 3u64, "instance ready");
        });
        match &events[0] {
            StormEvent::Log { message, .. } => {
                assert_eq!(message, "instance ready instance=3");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
