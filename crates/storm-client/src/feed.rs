use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use storm_core::{ContextReply, StormEvent};

use crate::commands::StormClient;
use crate::errors::ClientError;

const FEED_BUFFER: usize = 64;

/// One item of the merged feed. The snapshot always arrives first, as a
/// synthetic event, then live frames in emission order.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedItem {
    Snapshot(ContextReply),
    Event(StormEvent),
    /// The socket closed. State should be reconciled through a fresh
    /// [`EventFeed::connect`] rather than guessed at.
    Disconnected,
}

/// Snapshot and push events folded into a single ordered stream, so state
/// reconciliation has exactly one input. Events that raced the snapshot
/// fetch are not replayed; the snapshot already reflects them.
pub struct EventFeed {
    items: ReceiverStream<FeedItem>,
}

impl EventFeed {
    /// Fetch the snapshot, open the socket, and start pumping. Fails when
    /// either leg cannot be established; the caller retries on its own
    /// schedule.
    pub async fn connect(client: &StormClient) -> Result<Self, ClientError> {
        let snapshot = client.context().await?;
        let (socket, _) = connect_async(ws_url(client.host()).as_str())
            .await
            .map_err(|err| ClientError::Network(err.to_string()))?;

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        tokio::spawn(pump(socket, snapshot, tx, client.cancel_token()));
        Ok(Self {
            items: ReceiverStream::new(rx),
        })
    }

    pub async fn recv(&mut self) -> Option<FeedItem> {
        self.items.next().await
    }
}

impl Stream for EventFeed {
    type Item = FeedItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<FeedItem>> {
        Pin::new(&mut self.get_mut().items).poll_next(cx)
    }
}

async fn pump(
    mut socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    snapshot: ContextReply,
    tx: mpsc::Sender<FeedItem>,
    cancel: CancellationToken,
) {
    if tx.send(FeedItem::Snapshot(snapshot)).await.is_err() {
        return;
    }
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = socket.next() => frame,
        };
        let message = match frame {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                warn!(error = %err, "event socket failed");
                break;
            }
            None => break,
        };
        // Ping, pong and close frames carry no events.
        let Message::Text(text) = message else {
            continue;
        };
        match serde_json::from_str::<StormEvent>(&text) {
            Ok(event) => {
                if tx.send(FeedItem::Event(event)).await.is_err() {
                    return;
                }
            }
            Err(err) => warn!(error = %err, "dropping unparseable event frame"),
        }
    }
    let _ = tx.send(FeedItem::Disconnected).await;
}

fn ws_url(host: &str) -> String {
    let base = if let Some(rest) = host.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = host.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{host}")
    };
    format!("{base}/ws")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_follows_the_http_scheme() {
        assert_eq!(ws_url("http://localhost:1919"), "ws://localhost:1919/ws");
        assert_eq!(ws_url("https://engine.lan"), "wss://engine.lan/ws");
        assert_eq!(ws_url("engine.lan:1919"), "ws://engine.lan:1919/ws");
    }
}
