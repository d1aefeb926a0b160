use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::projectors::NotificationHub;

/// `GET /ws`.
pub fn pusher_routes(hub: NotificationHub) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(hub)
}

async fn upgrade(ws: WebSocketUpgrade, State(hub): State<NotificationHub>) -> Response {
    let frames = hub.subscribe();
    ws.on_upgrade(move |socket| client_session(socket, frames))
}

/// Forward hub frames to one client until either side goes away.
async fn client_session(socket: WebSocket, mut frames: broadcast::Receiver<Arc<str>>) {
    let (mut sink, mut incoming) = socket.split();
    debug!("Websocket client connected");

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(text) => {
                    if sink.send(Message::Text(text.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Websocket client lagging, frames dropped");
                }
                Err(RecvError::Closed) => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Websocket client disconnected");
}
