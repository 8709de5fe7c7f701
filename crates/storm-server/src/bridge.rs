use std::sync::Arc;

use tokio::sync::broadcast;

use storm_core::StormEvent;

use crate::ws::ClientRegistry;

/// Subscribes to the engine's event broadcast and fans every event out to
/// the connected WebSocket clients, one JSON frame per event.
pub struct EventBridge {
    registry: Arc<ClientRegistry>,
}

impl EventBridge {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    pub fn start(&self, mut rx: broadcast::Receiver<StormEvent>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(frame) = serialize_event(&event) {
                            registry.broadcast(&frame);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event bridge lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("event bridge channel closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Create an event bridge wired to a broadcast channel.
pub fn create_bridge(
    registry: Arc<ClientRegistry>,
    rx: broadcast::Receiver<StormEvent>,
) -> tokio::task::JoinHandle<()> {
    EventBridge::new(registry).start(rx)
}

pub fn serialize_event(event: &StormEvent) -> Option<String> {
    serde_json::to_string(event).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_core::{InstanceId, InstanceStatus};

    #[test]
    fn events_serialize_to_tagged_frames() {
        let frame = serialize_event(&StormEvent::StormStarted).unwrap();
        assert_eq!(frame, r#"{"event":"storm_started"}"#);

        let frame = serialize_event(&StormEvent::InstanceStatus {
            instance: InstanceId(2),
            status: InstanceStatus::Storming,
        })
        .unwrap();
        assert!(frame.contains(r#""event":"instance_status""#));
        assert!(frame.contains(r#""status":3"#));
    }

    #[tokio::test]
    async fn bridge_forwards_to_every_client() {
        let registry = Arc::new(ClientRegistry::new(32));
        let (tx, rx) = broadcast::channel(100);

        let (_id1, mut rx1) = registry.register();
        let (_id2, mut rx2) = registry.register();
        let handle = create_bridge(Arc::clone(&registry), rx);

        tx.send(StormEvent::StormPaused).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(rx1.try_recv().unwrap().contains("storm_paused"));
        assert!(rx2.try_recv().unwrap().contains("storm_paused"));

        handle.abort();
    }

    #[tokio::test]
    async fn bridge_survives_lag() {
        let registry = Arc::new(ClientRegistry::new(256));
        // Tiny bus so the bridge falls behind and observes a lag error.
        let (tx, rx) = broadcast::channel(1);

        let (_id, mut client_rx) = registry.register();
        let handle = create_bridge(Arc::clone(&registry), rx);

        for _ in 0..16 {
            tx.send(StormEvent::TotalMessages { total_messages: 1 }).unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        tx.send(StormEvent::StormStopped).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut saw_stop = false;
        while let Ok(frame) = client_rx.try_recv() {
            if frame.contains("storm_stopped") {
                saw_stop = true;
            }
        }
        assert!(saw_stop, "bridge should keep forwarding after lagging");

        handle.abort();
    }
}
