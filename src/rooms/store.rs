use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{PlatformError, Result};
use crate::questions::{Question, QuestionFilter};

pub const MAX_PARTICIPANTS: usize = 2;
pub const DEFAULT_LANGUAGE: &str = "javascript";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    InProgress,
    Completed,
}

/// A persisted interview session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: String,
    pub participants: Vec<String>,
    pub question: Question,
    pub code: String,
    pub language: String,
    pub status: RoomStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(creator_id: String, question: Question) -> Self {
        let now = Utc::now();
        Self {
            room_id: format!("room-{}", Uuid::new_v4()),
            participants: vec![creator_id],
            question,
            code: String::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            status: RoomStatus::Waiting,
            start_time: now,
            end_time: None,
            created_at: now,
        }
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

/// Outcome of an admission attempt that did not fail outright.
#[derive(Debug, Clone)]
pub enum Admission {
    /// User was appended to the participant list.
    Admitted(Room),
    /// User was already a participant; room returned unchanged.
    AlreadyParticipant(Room),
}

impl Admission {
    pub fn room(&self) -> &Room {
        match self {
            Admission::Admitted(room) | Admission::AlreadyParticipant(room) => room,
        }
    }
}

/// Durable room storage. Every mutation of `participants` or `status` is a
/// single conditional operation keyed by room id; callers never read-then-write.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Persist a new room. Fails if the room id already exists.
    async fn insert(&self, room: Room) -> Result<Room>;

    async fn get(&self, room_id: &str) -> Result<Room>;

    /// Oldest waiting room with a free slot, not already containing `user_id`,
    /// whose question satisfies the filter.
    async fn find_waiting(&self, user_id: &str, filter: &QuestionFilter) -> Option<Room>;

    /// Conditionally append `user_id` to the room's participants. The capacity
    /// check, the duplicate check, and the status transition to `in_progress`
    /// all happen inside one store-level critical section.
    async fn admit_participant(&self, room_id: &str, user_id: &str) -> Result<Admission>;

    /// Overwrite the shared code buffer (and language if given). Last writer wins.
    async fn update_code(
        &self,
        room_id: &str,
        code: String,
        language: Option<String>,
    ) -> Result<Room>;

    /// Move the room to `completed` and stamp `end_time`. Idempotent on an
    /// already-completed room.
    async fn complete(&self, room_id: &str) -> Result<Room>;
}

/// In-memory room store. The write lock makes each conditional update atomic
/// with respect to both the REST and the realtime mutation paths.
pub struct InMemoryRoomStore {
    rooms: RwLock<HashMap<String, Room>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn insert(&self, room: Room) -> Result<Room> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.room_id) {
            return Err(PlatformError::store(format!(
                "room id collision: {}",
                room.room_id
            )));
        }
        rooms.insert(room.room_id.clone(), room.clone());
        tracing::info!(room_id = %room.room_id, "Room created");
        Ok(room)
    }

    async fn get(&self, room_id: &str) -> Result<Room> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| PlatformError::RoomNotFound(room_id.to_string()))
    }

    async fn find_waiting(&self, user_id: &str, filter: &QuestionFilter) -> Option<Room> {
        let rooms = self.rooms.read().await;
        rooms
            .values()
            .filter(|room| {
                room.status == RoomStatus::Waiting
                    && room.participants.len() < MAX_PARTICIPANTS
                    && !room.is_participant(user_id)
                    && filter.matches(&room.question)
            })
            .min_by_key(|room| room.created_at)
            .cloned()
    }

    async fn admit_participant(&self, room_id: &str, user_id: &str) -> Result<Admission> {
        let mut rooms = self.rooms.write().await;

        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| PlatformError::RoomNotFound(room_id.to_string()))?;

        if room.is_participant(user_id) {
            return Ok(Admission::AlreadyParticipant(room.clone()));
        }

        if room.status == RoomStatus::Completed {
            return Err(PlatformError::RoomCompleted(room_id.to_string()));
        }

        if room.participants.len() >= MAX_PARTICIPANTS {
            return Err(PlatformError::RoomFull(room_id.to_string()));
        }

        room.participants.push(user_id.to_string());
        if room.participants.len() == MAX_PARTICIPANTS {
            room.status = RoomStatus::InProgress;
        }

        tracing::info!(
            room_id = %room_id,
            user_id = %user_id,
            participants = room.participants.len(),
            status = ?room.status,
            "Participant admitted"
        );
        Ok(Admission::Admitted(room.clone()))
    }

    async fn update_code(
        &self,
        room_id: &str,
        code: String,
        language: Option<String>,
    ) -> Result<Room> {
        let mut rooms = self.rooms.write().await;

        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| PlatformError::RoomNotFound(room_id.to_string()))?;

        room.code = code;
        if let Some(language) = language {
            room.language = language;
        }

        Ok(room.clone())
    }

    async fn complete(&self, room_id: &str) -> Result<Room> {
        let mut rooms = self.rooms.write().await;

        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| PlatformError::RoomNotFound(room_id.to_string()))?;

        if room.status != RoomStatus::Completed {
            room.status = RoomStatus::Completed;
            room.end_time = Some(Utc::now());
            tracing::info!(room_id = %room_id, "Room completed");
        }

        Ok(room.clone())
    }
}
