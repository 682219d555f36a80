use thiserror::Error;

/// Custom error types for the CodePair server
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Authentication and authorization errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Origin {0} is not allowed")]
    OriginNotAllowed(String),

    #[error("User {0} is not a participant of this interview")]
    NotParticipant(String),

    /// Room and matchmaking errors
    #[error("Interview room {0} not found")]
    RoomNotFound(String),

    #[error("Interview room {0} is full")]
    RoomFull(String),

    #[error("User {0} is already a participant")]
    DuplicateParticipant(String),

    #[error("No questions found matching the criteria")]
    NoQuestionAvailable,

    #[error("Question {0} not found")]
    QuestionNotFound(String),

    #[error("Interview room {0} is already completed")]
    RoomCompleted(String),

    /// Wire protocol errors
    #[error("Invalid message payload: {0}")]
    ValidationFailed(String),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Missing required configuration: {0}")]
    MissingConfiguration(String),

    /// Storage errors
    #[error("Room store error: {0}")]
    Store(String),

    /// Generic errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using PlatformError
pub type Result<T> = std::result::Result<T, PlatformError>;

impl PlatformError {
    /// Helper to create Unauthorized errors with context
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        PlatformError::Unauthorized(msg.into())
    }

    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        PlatformError::Internal(msg.into())
    }

    /// Helper to create store errors
    pub fn store(msg: impl Into<String>) -> Self {
        PlatformError::Store(msg.into())
    }

    /// HTTP status code this error maps to on the REST surface
    pub fn status_code(&self) -> u16 {
        match self {
            PlatformError::Unauthorized(_) => 401,
            PlatformError::OriginNotAllowed(_) | PlatformError::NotParticipant(_) => 403,
            PlatformError::RoomNotFound(_)
            | PlatformError::QuestionNotFound(_)
            | PlatformError::NoQuestionAvailable => 404,
            PlatformError::RoomFull(_)
            | PlatformError::DuplicateParticipant(_)
            | PlatformError::RoomCompleted(_) => 409,
            PlatformError::ValidationFailed(_) | PlatformError::SerializationFailed(_) => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlatformError::RoomNotFound("room-abc".to_string());
        assert_eq!(err.to_string(), "Interview room room-abc not found");
    }

    #[test]
    fn test_error_helpers() {
        let err = PlatformError::internal("Something went wrong");
        assert!(matches!(err, PlatformError::Internal(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(PlatformError::unauthorized("no token").status_code(), 401);
        assert_eq!(PlatformError::RoomFull("room-x".into()).status_code(), 409);
        assert_eq!(PlatformError::NoQuestionAvailable.status_code(), 404);
    }
}
