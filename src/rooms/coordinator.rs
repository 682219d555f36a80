use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use warp::ws::Message;

use super::messages::{ClientMessage, ServerMessage};
use super::store::{RoomStore, DEFAULT_LANGUAGE};

/// A live realtime connection with its gateway-resolved identity.
struct ConnectionEntry {
    user_id: String,
    sender: mpsc::UnboundedSender<Message>,
    last_seen: Instant,
}

/// Mediates all realtime traffic for active interview rooms: membership
/// tracking, code-state sync, signaling relay, and stale-connection reaping.
///
/// All membership state is process-local and rebuilt from nothing on restart;
/// the room store is the only durable resource and is only touched through
/// its conditional operations.
pub struct Coordinator {
    store: Arc<dyn RoomStore>,
    connections: RwLock<HashMap<String, ConnectionEntry>>,
    /// socket id -> room id the socket has joined
    memberships: RwLock<HashMap<String, String>>,
    /// room id -> socket ids currently joined
    room_members: RwLock<HashMap<String, HashSet<String>>>,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn RoomStore>,
        heartbeat_interval: Duration,
        client_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            connections: RwLock::new(HashMap::new()),
            memberships: RwLock::new(HashMap::new()),
            room_members: RwLock::new(HashMap::new()),
            heartbeat_interval,
            client_timeout,
        })
    }

    /// Register an authenticated connection. Called by the websocket handler
    /// once the gateway has resolved the user.
    pub async fn register(
        &self,
        socket_id: String,
        user_id: String,
        sender: mpsc::UnboundedSender<Message>,
    ) {
        let mut connections = self.connections.write().await;
        connections.insert(
            socket_id.clone(),
            ConnectionEntry {
                user_id: user_id.clone(),
                sender,
                last_seen: Instant::now(),
            },
        );
        tracing::info!(socket_id = %socket_id, user_id = %user_id, "Connection registered");
    }

    /// Refresh a connection's liveness window. Any inbound frame counts.
    pub async fn touch(&self, socket_id: &str) {
        let mut connections = self.connections.write().await;
        if let Some(entry) = connections.get_mut(socket_id) {
            entry.last_seen = Instant::now();
        }
    }

    pub async fn client_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Dispatch one inbound message for a connection.
    pub async fn handle_message(&self, socket_id: &str, message: ClientMessage) {
        match message {
            ClientMessage::JoinRoom { room_id, .. } => {
                self.join(socket_id, &room_id).await;
            }
            ClientMessage::CodeUpdate {
                room_id,
                code,
                language,
                ..
            } => {
                self.update_code(socket_id, &room_id, code, language).await;
            }
            ClientMessage::WebrtcOffer { to, offer } => {
                let msg = ServerMessage::WebrtcOffer {
                    from: socket_id.to_string(),
                    offer,
                };
                self.relay_signal(socket_id, &to, msg).await;
            }
            ClientMessage::WebrtcAnswer { to, answer } => {
                let msg = ServerMessage::WebrtcAnswer {
                    from: socket_id.to_string(),
                    answer,
                };
                self.relay_signal(socket_id, &to, msg).await;
            }
            ClientMessage::WebrtcIceCandidate { to, candidate } => {
                let msg = ServerMessage::WebrtcIceCandidate {
                    from: socket_id.to_string(),
                    candidate,
                };
                self.relay_signal(socket_id, &to, msg).await;
            }
        }
    }

    /// Join a connection to a room it is a persisted participant of.
    ///
    /// On success the joiner receives the current code snapshot and the other
    /// joined members are notified. Authorization failures go to the joining
    /// connection only; nothing is broadcast.
    pub async fn join(&self, socket_id: &str, room_id: &str) {
        let user_id = match self.user_of(socket_id).await {
            Some(user_id) => user_id,
            None => return,
        };

        let room = match self.store.get(room_id).await {
            Ok(room) => room,
            Err(e) => {
                tracing::warn!(socket_id = %socket_id, room_id = %room_id, error = %e, "Join rejected");
                self.send_to(socket_id, &ServerMessage::error("Interview not found"))
                    .await;
                return;
            }
        };

        if !room.is_participant(&user_id) {
            tracing::warn!(
                socket_id = %socket_id,
                user_id = %user_id,
                room_id = %room_id,
                "Join rejected: not a participant"
            );
            self.send_to(
                socket_id,
                &ServerMessage::error("Not authorized to join this interview"),
            )
            .await;
            return;
        }

        // A connection is in at most one room; joining another implicitly
        // leaves the previous one.
        let previous = {
            let memberships = self.memberships.read().await;
            memberships.get(socket_id).cloned()
        };
        if let Some(previous_room) = previous {
            if previous_room != room_id {
                self.leave(socket_id).await;
            }
        }

        {
            let mut memberships = self.memberships.write().await;
            memberships.insert(socket_id.to_string(), room_id.to_string());
        }
        {
            let mut room_members = self.room_members.write().await;
            room_members
                .entry(room_id.to_string())
                .or_default()
                .insert(socket_id.to_string());
        }

        tracing::info!(socket_id = %socket_id, user_id = %user_id, room_id = %room_id, "Joined room");

        self.broadcast_to_room_except(
            room_id,
            &ServerMessage::UserJoined {
                user_id: Some(user_id),
                socket_id: socket_id.to_string(),
            },
            Some(socket_id),
        )
        .await;

        // Late joiners see live state, not whatever their client cached.
        self.send_to(
            socket_id,
            &ServerMessage::CodeUpdate {
                code: room.code,
                language: room.language,
            },
        )
        .await;
    }

    /// Apply a code update from a joined participant and fan it out to the
    /// rest of the room. The sender is not echoed back.
    pub async fn update_code(
        &self,
        socket_id: &str,
        room_id: &str,
        code: String,
        language: Option<String>,
    ) {
        if !self.is_joined(socket_id, room_id).await {
            // Unverified senders are dropped without a reply so room
            // membership is not leaked to the caller.
            tracing::warn!(
                socket_id = %socket_id,
                room_id = %room_id,
                "Dropping code update from non-member"
            );
            return;
        }

        // The realtime view is the source of truth for liveness; the store is
        // eventual. A failed persist is logged and the broadcast proceeds.
        let effective_language = match self
            .store
            .update_code(room_id, code.clone(), language.clone())
            .await
        {
            Ok(room) => room.language,
            Err(e) => {
                tracing::error!(room_id = %room_id, error = %e, "Failed to persist code update");
                language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
            }
        };

        self.broadcast_to_room_except(
            room_id,
            &ServerMessage::CodeUpdate {
                code,
                language: effective_language,
            },
            Some(socket_id),
        )
        .await;
    }

    /// Forward a signaling payload to exactly the named connection. Unknown
    /// recipients are dropped silently; signaling is best-effort.
    pub async fn relay_signal(&self, from_socket: &str, to_socket: &str, message: ServerMessage) {
        let connections = self.connections.read().await;
        match connections.get(to_socket) {
            Some(entry) => {
                if let Ok(text) = serde_json::to_string(&message) {
                    let _ = entry.sender.send(Message::text(text));
                }
            }
            None => {
                tracing::debug!(
                    from = %from_socket,
                    to = %to_socket,
                    "Dropping signal for disconnected recipient"
                );
            }
        }
    }

    /// Remove a connection from its room, notifying the remaining members.
    /// The persisted room record is untouched; completion is an explicit
    /// lifecycle action, not a side effect of sockets going away.
    pub async fn leave(&self, socket_id: &str) {
        let room_id = {
            let mut memberships = self.memberships.write().await;
            memberships.remove(socket_id)
        };

        let Some(room_id) = room_id else {
            return;
        };

        let room_now_empty = {
            let mut room_members = self.room_members.write().await;
            if let Some(members) = room_members.get_mut(&room_id) {
                members.remove(socket_id);
                if members.is_empty() {
                    room_members.remove(&room_id);
                    true
                } else {
                    false
                }
            } else {
                true
            }
        };

        let user_id = self.user_of(socket_id).await;
        tracing::info!(socket_id = %socket_id, room_id = %room_id, "Left room");

        if !room_now_empty {
            self.broadcast_to_room_except(
                &room_id,
                &ServerMessage::UserLeft {
                    user_id,
                    socket_id: socket_id.to_string(),
                },
                Some(socket_id),
            )
            .await;
        }
    }

    /// Full teardown for a closed or reaped connection.
    pub async fn disconnect(&self, socket_id: &str) {
        self.leave(socket_id).await;
        let mut connections = self.connections.write().await;
        if connections.remove(socket_id).is_some() {
            tracing::info!(socket_id = %socket_id, "Connection removed");
        }
    }

    /// Periodic liveness sweep: reap connections idle past the timeout, then
    /// send the heartbeat payload to everyone still open.
    pub fn start_heartbeat(self: Arc<Self>) {
        let coordinator = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.heartbeat_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                coordinator.heartbeat_tick().await;
            }
        });
    }

    async fn heartbeat_tick(&self) {
        let stale: Vec<String> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(_, entry)| entry.last_seen.elapsed() > self.client_timeout)
                .map(|(socket_id, _)| socket_id.clone())
                .collect()
        };

        for socket_id in stale {
            tracing::warn!(socket_id = %socket_id, "Heartbeat timeout, reaping connection");
            {
                let connections = self.connections.read().await;
                if let Some(entry) = connections.get(&socket_id) {
                    let _ = entry.sender.send(Message::close());
                }
            }
            self.disconnect(&socket_id).await;
        }

        let connections = self.connections.read().await;
        let heartbeat = ServerMessage::Heartbeat {
            timestamp: Utc::now(),
            client_count: connections.len(),
        };
        let Ok(text) = serde_json::to_string(&heartbeat) else {
            return;
        };

        for entry in connections.values() {
            let _ = entry.sender.send(Message::ping(Vec::new()));
            let _ = entry.sender.send(Message::text(text.clone()));
        }
    }

    /// Report a protocol-level problem to one connection.
    pub async fn send_error(&self, socket_id: &str, message: impl Into<String>) {
        self.send_to(socket_id, &ServerMessage::error(message)).await;
    }

    async fn user_of(&self, socket_id: &str) -> Option<String> {
        let connections = self.connections.read().await;
        connections.get(socket_id).map(|e| e.user_id.clone())
    }

    async fn is_joined(&self, socket_id: &str, room_id: &str) -> bool {
        let memberships = self.memberships.read().await;
        memberships.get(socket_id).map(String::as_str) == Some(room_id)
    }

    async fn send_to(&self, socket_id: &str, message: &ServerMessage) {
        if let Ok(text) = serde_json::to_string(message) {
            let connections = self.connections.read().await;
            if let Some(entry) = connections.get(socket_id) {
                let _ = entry.sender.send(Message::text(text));
            }
        }
    }

    async fn broadcast_to_room_except(
        &self,
        room_id: &str,
        message: &ServerMessage,
        except_socket: Option<&str>,
    ) {
        let Ok(text) = serde_json::to_string(message) else {
            return;
        };

        let members = {
            let room_members = self.room_members.read().await;
            match room_members.get(room_id) {
                Some(members) => members.clone(),
                None => return,
            }
        };

        let connections = self.connections.read().await;
        for socket_id in members {
            if Some(socket_id.as_str()) == except_socket {
                continue;
            }
            if let Some(entry) = connections.get(&socket_id) {
                let _ = entry.sender.send(Message::text(text.clone()));
            }
        }
    }
}
