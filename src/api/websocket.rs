use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::auth::AuthenticatedUser;
use crate::rooms::messages::ClientMessage;
use crate::rooms::Coordinator;

/// Drive one authenticated websocket for its whole lifetime: register with
/// the coordinator, pump outbound messages, dispatch inbound ones, and tear
/// everything down when the stream ends.
pub async fn handle_connection(
    websocket: WebSocket,
    user: AuthenticatedUser,
    coordinator: Arc<Coordinator>,
) {
    let socket_id = Uuid::new_v4().to_string();
    tracing::info!(socket_id = %socket_id, user_id = %user.user_id, "WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    coordinator
        .register(socket_id.clone(), user.user_id.clone(), tx)
        .await;

    // Outbound pump: everything the coordinator queues goes to the client.
    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                tracing::debug!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) => {
                // Any inbound frame, pongs included, refreshes liveness.
                coordinator.touch(&socket_id).await;

                if message.is_close() {
                    break;
                }

                if let Ok(text) = message.to_str() {
                    match serde_json::from_str::<ClientMessage>(text) {
                        Ok(client_message) => {
                            coordinator.handle_message(&socket_id, client_message).await;
                        }
                        Err(e) => {
                            tracing::warn!(
                                socket_id = %socket_id,
                                error = %e,
                                "Failed to parse client message"
                            );
                            coordinator
                                .send_error(&socket_id, "Invalid message format")
                                .await;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::debug!(socket_id = %socket_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    coordinator.disconnect(&socket_id).await;
    sender_task.abort();
    tracing::info!(socket_id = %socket_id, "WebSocket connection closed");
}
