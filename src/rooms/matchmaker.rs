use std::sync::Arc;

use crate::error::{PlatformError, Result};
use crate::questions::{QuestionFilter, QuestionSupplier};
use crate::rooms::store::{Admission, Room, RoomStore};

/// Pairs users into interview rooms.
///
/// Both the filter-based match path and the explicit join path admit through
/// `RoomStore::admit_participant`, so the two-participant cap holds even when
/// REST calls and realtime-driven retries race for the last slot.
pub struct Matchmaker {
    store: Arc<dyn RoomStore>,
    questions: Arc<dyn QuestionSupplier>,
}

impl Matchmaker {
    pub fn new(store: Arc<dyn RoomStore>, questions: Arc<dyn QuestionSupplier>) -> Arc<Self> {
        Arc::new(Self { store, questions })
    }

    /// Create a fresh room for `user_id`, with a chosen or random question.
    pub async fn create_room(&self, user_id: &str, question_id: Option<&str>) -> Result<Room> {
        let question = match question_id {
            Some(id) => self
                .questions
                .get(id)
                .await
                .ok_or_else(|| PlatformError::QuestionNotFound(id.to_string()))?,
            None => self
                .questions
                .pick(&QuestionFilter::default())
                .await
                .ok_or(PlatformError::NoQuestionAvailable)?,
        };

        self.store.insert(Room::new(user_id.to_string(), question)).await
    }

    /// Find a waiting room matching the filters, or create one.
    ///
    /// The oldest matching waiting room wins, so early waiters are paired
    /// first and rooms do not fragment. A found room may still fill between
    /// the search and the admission; on that race the search is retried, and
    /// only when nothing is left does a new room get created.
    pub async fn find_or_create_room(&self, user_id: &str, filter: &QuestionFilter) -> Result<Room> {
        loop {
            let Some(candidate) = self.store.find_waiting(user_id, filter).await else {
                let question = self
                    .questions
                    .pick(filter)
                    .await
                    .ok_or(PlatformError::NoQuestionAvailable)?;
                let room = self
                    .store
                    .insert(Room::new(user_id.to_string(), question))
                    .await?;
                tracing::info!(
                    room_id = %room.room_id,
                    user_id = %user_id,
                    "No waiting room matched, created new one"
                );
                return Ok(room);
            };

            match self
                .store
                .admit_participant(&candidate.room_id, user_id)
                .await
            {
                Ok(admission) => {
                    let room = admission.room().clone();
                    tracing::info!(
                        room_id = %room.room_id,
                        user_id = %user_id,
                        status = ?room.status,
                        "Matched into waiting room"
                    );
                    return Ok(room);
                }
                // Lost the race for the last slot; look for another room.
                Err(PlatformError::RoomFull(_)) | Err(PlatformError::RoomCompleted(_)) => {
                    tracing::debug!(
                        room_id = %candidate.room_id,
                        user_id = %user_id,
                        "Waiting room filled concurrently, retrying match"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Join a specific room by id. Idempotent for existing participants.
    pub async fn join_room(&self, room_id: &str, user_id: &str) -> Result<Room> {
        let admission = self.store.admit_participant(room_id, user_id).await?;
        match admission {
            Admission::Admitted(room) => {
                tracing::info!(room_id = %room_id, user_id = %user_id, "User joined room");
                Ok(room)
            }
            Admission::AlreadyParticipant(room) => Ok(room),
        }
    }

    /// Fetch a room, participants only.
    pub async fn get_room(&self, room_id: &str, user_id: &str) -> Result<Room> {
        let room = self.store.get(room_id).await?;
        if !room.is_participant(user_id) {
            return Err(PlatformError::NotParticipant(user_id.to_string()));
        }
        Ok(room)
    }

    /// Explicitly finish an interview. Participants only; idempotent once
    /// completed.
    pub async fn complete_room(&self, room_id: &str, user_id: &str) -> Result<Room> {
        let room = self.store.get(room_id).await?;
        if !room.is_participant(user_id) {
            return Err(PlatformError::NotParticipant(user_id.to_string()));
        }
        self.store.complete(room_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::{Difficulty, InMemoryQuestionBank, QuestionFilter};
    use crate::rooms::store::{InMemoryRoomStore, RoomStatus};

    async fn matchmaker() -> (Arc<Matchmaker>, Arc<InMemoryRoomStore>) {
        let store = InMemoryRoomStore::new();
        let questions = InMemoryQuestionBank::with_seed_questions();
        (Matchmaker::new(store.clone(), questions), store)
    }

    fn easy_filter() -> QuestionFilter {
        QuestionFilter {
            difficulty: Some(Difficulty::Easy),
            topic: None,
        }
    }

    #[tokio::test]
    async fn test_match_creates_room_when_none_waiting() {
        let (matchmaker, _) = matchmaker().await;

        let room = matchmaker
            .find_or_create_room("user-a", &easy_filter())
            .await
            .unwrap();

        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.participants, vec!["user-a"]);
        assert_eq!(room.question.difficulty, Difficulty::Easy);
    }

    #[tokio::test]
    async fn test_match_pairs_into_existing_waiting_room() {
        let (matchmaker, _) = matchmaker().await;

        let first = matchmaker
            .find_or_create_room("user-a", &easy_filter())
            .await
            .unwrap();
        let second = matchmaker
            .find_or_create_room("user-b", &easy_filter())
            .await
            .unwrap();

        assert_eq!(second.room_id, first.room_id);
        assert_eq!(second.status, RoomStatus::InProgress);
        assert_eq!(second.participants, vec!["user-a", "user-b"]);
    }

    #[tokio::test]
    async fn test_match_prefers_oldest_waiting_room() {
        let (matchmaker, store) = matchmaker().await;

        let older = matchmaker
            .find_or_create_room("user-a", &QuestionFilter::default())
            .await
            .unwrap();
        // Make a second waiting room that is unambiguously newer.
        let newer = matchmaker
            .find_or_create_room("user-b", &QuestionFilter::default())
            .await
            .unwrap();
        assert_ne!(older.room_id, newer.room_id);

        let matched = matchmaker
            .find_or_create_room("user-c", &QuestionFilter::default())
            .await
            .unwrap();
        let expected = if older.created_at <= newer.created_at {
            &older.room_id
        } else {
            &newer.room_id
        };
        assert_eq!(&matched.room_id, expected);

        // Both original rooms still exist, one now in progress.
        assert_eq!(store.get(&older.room_id).await.unwrap().room_id, older.room_id);
    }

    #[tokio::test]
    async fn test_match_never_pairs_user_with_itself() {
        let (matchmaker, _) = matchmaker().await;

        let first = matchmaker
            .find_or_create_room("user-a", &easy_filter())
            .await
            .unwrap();
        let again = matchmaker
            .find_or_create_room("user-a", &easy_filter())
            .await
            .unwrap();

        assert_ne!(first.room_id, again.room_id);
        assert_eq!(again.participants, vec!["user-a"]);
    }

    #[tokio::test]
    async fn test_match_fails_when_no_question_matches() {
        let (matchmaker, _) = matchmaker().await;

        let filter = QuestionFilter {
            difficulty: Some(Difficulty::Hard),
            topic: Some("Dynamic Programming".to_string()),
        };
        let result = matchmaker.find_or_create_room("user-a", &filter).await;
        assert!(matches!(result, Err(PlatformError::NoQuestionAvailable)));
    }

    #[tokio::test]
    async fn test_join_room_by_id() {
        let (matchmaker, _) = matchmaker().await;

        let room = matchmaker.create_room("user-a", None).await.unwrap();
        let joined = matchmaker.join_room(&room.room_id, "user-b").await.unwrap();

        assert_eq!(joined.status, RoomStatus::InProgress);
        assert_eq!(joined.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_join_room_is_idempotent_for_participant() {
        let (matchmaker, _) = matchmaker().await;

        let room = matchmaker.create_room("user-a", None).await.unwrap();
        let rejoined = matchmaker.join_room(&room.room_id, "user-a").await.unwrap();

        assert_eq!(rejoined.participants, vec!["user-a"]);
        assert_eq!(rejoined.status, RoomStatus::Waiting);
    }

    #[tokio::test]
    async fn test_join_full_room_rejected() {
        let (matchmaker, _) = matchmaker().await;

        let room = matchmaker.create_room("user-a", None).await.unwrap();
        matchmaker.join_room(&room.room_id, "user-b").await.unwrap();

        let result = matchmaker.join_room(&room.room_id, "user-c").await;
        assert!(matches!(result, Err(PlatformError::RoomFull(_))));
    }

    #[tokio::test]
    async fn test_join_unknown_room_rejected() {
        let (matchmaker, _) = matchmaker().await;

        let result = matchmaker.join_room("room-missing", "user-a").await;
        assert!(matches!(result, Err(PlatformError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn test_get_room_restricted_to_participants() {
        let (matchmaker, _) = matchmaker().await;

        let room = matchmaker.create_room("user-a", None).await.unwrap();

        assert!(matchmaker.get_room(&room.room_id, "user-a").await.is_ok());
        let result = matchmaker.get_room(&room.room_id, "user-x").await;
        assert!(matches!(result, Err(PlatformError::NotParticipant(_))));
    }

    #[tokio::test]
    async fn test_complete_room_lifecycle() {
        let (matchmaker, _) = matchmaker().await;

        let room = matchmaker.create_room("user-a", None).await.unwrap();
        matchmaker.join_room(&room.room_id, "user-b").await.unwrap();

        let completed = matchmaker
            .complete_room(&room.room_id, "user-a")
            .await
            .unwrap();
        assert_eq!(completed.status, RoomStatus::Completed);
        assert!(completed.end_time.is_some());

        // Outsiders cannot complete someone else's interview.
        let result = matchmaker.complete_room(&room.room_id, "user-x").await;
        assert!(matches!(result, Err(PlatformError::NotParticipant(_))));
    }

    #[tokio::test]
    async fn test_create_room_with_chosen_question() {
        let store = InMemoryRoomStore::new();
        let questions = InMemoryQuestionBank::with_seed_questions();
        let wanted = questions.pick(&easy_filter()).await.unwrap();
        let matchmaker = Matchmaker::new(store, questions);

        let room = matchmaker
            .create_room("user-a", Some(&wanted.id))
            .await
            .unwrap();
        assert_eq!(room.question.id, wanted.id);

        let result = matchmaker.create_room("user-a", Some("no-such-id")).await;
        assert!(matches!(result, Err(PlatformError::QuestionNotFound(_))));
    }
}
