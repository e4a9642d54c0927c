use crate::state::{AppState, SessionSnapshot, WsMessage};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| stream_session(socket, state))
}

#[derive(serde::Serialize)]
#[serde(tag = "type", rename = "snapshot")]
struct SnapshotFrame<'a> {
    #[serde(flatten)]
    snapshot: &'a SessionSnapshot,
}

fn snapshot_frame(snapshot: &SessionSnapshot) -> Option<String> {
    serde_json::to_string(&SnapshotFrame { snapshot }).ok()
}

fn event_frame(msg: &WsMessage) -> Option<String> {
    serde_json::to_string(msg).ok()
}

async fn send_text(sink: &mut SplitSink<WebSocket, Message>, text: String) -> bool {
    sink.send(Message::Text(text.into())).await.is_ok()
}

/// Full snapshot first, then incremental events. A client that falls
/// behind the broadcast buffer gets a fresh snapshot instead of a gap.
async fn stream_session(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut inbound) = socket.split();
    let mut events = state.ws_tx.subscribe();

    let first = snapshot_frame(&state.snapshot_rx.borrow().clone());
    if let Some(text) = first {
        if !send_text(&mut sink, text).await {
            return;
        }
    }

    let resync_state = Arc::clone(&state);
    let forward = tokio::spawn(async move {
        loop {
            let frame = match events.recv().await {
                Ok(msg) => event_frame(&msg),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "ws client lagged, resending snapshot");
                    snapshot_frame(&resync_state.snapshot_rx.borrow().clone())
                }
                Err(RecvError::Closed) => break,
            };
            if let Some(text) = frame {
                if !send_text(&mut sink, text).await {
                    break;
                }
            }
        }
    });

    // Client messages are ignored; we only watch for disconnect.
    let watch_close = tokio::spawn(async move {
        while let Some(msg) = inbound.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = forward => {},
        _ = watch_close => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_frame_is_tagged() {
        let text = snapshot_frame(&SessionSnapshot::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["phase"], "bootstrapping");
    }

    #[test]
    fn test_event_frame_is_tagged() {
        let text = event_frame(&WsMessage::Analysis { text: "calm".into() }).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["type"], "analysis");
        assert_eq!(json["text"], "calm");
    }
}
