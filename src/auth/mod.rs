use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{PlatformError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// Identity resolved by the gateway. Coordinator operations act on this,
/// never on a client-supplied user id.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// The user credential store is an external collaborator; the gateway only
/// needs to know whether the id referenced by a token still exists.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: &str) -> bool;
}

pub struct InMemoryUserDirectory {
    users: RwLock<HashSet<String>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            users: RwLock::new(HashSet::new()),
        })
    }

    pub async fn add(&self, user_id: impl Into<String>) {
        let mut users = self.users.write().await;
        users.insert(user_id.into());
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn exists(&self, user_id: &str) -> bool {
        let users = self.users.read().await;
        users.contains(user_id)
    }
}

/// Accepting-all directory for deployments where the token issuer is the
/// single source of truth about users.
pub struct OpenUserDirectory;

#[async_trait]
impl UserDirectory for OpenUserDirectory {
    async fn exists(&self, _user_id: &str) -> bool {
        true
    }
}

/// Authenticates inbound connections before they reach the coordinator:
/// origin allow-list plus bearer credential verification.
pub struct Gateway {
    secret: String,
    token_ttl_secs: u64,
    allowed_origins: Vec<String>,
    users: Arc<dyn UserDirectory>,
}

impl Gateway {
    pub fn new(
        secret: String,
        token_ttl_secs: u64,
        allowed_origins: Vec<String>,
        users: Arc<dyn UserDirectory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            secret,
            token_ttl_secs,
            allowed_origins,
            users,
        })
    }

    /// Sign a token for a user id. Used by the CLI and by tests; in a full
    /// deployment the login service issues these.
    pub fn issue_token(&self, user_id: &str) -> Result<String> {
        let exp = (Utc::now().timestamp() as u64 + self.token_ttl_secs) as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| PlatformError::internal(format!("failed to sign token: {}", e)))
    }

    pub fn check_origin(&self, origin: Option<&str>) -> Result<()> {
        match origin {
            Some(origin) if self.allowed_origins.iter().any(|o| o == origin) => Ok(()),
            Some(origin) => Err(PlatformError::OriginNotAllowed(origin.to_string())),
            None => Err(PlatformError::OriginNotAllowed("<missing>".to_string())),
        }
    }

    /// Verify signature and expiry, then check the referenced user still
    /// exists. Returns the resolved identity.
    pub async fn verify_token(&self, token: &str) -> Result<AuthenticatedUser> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            tracing::warn!(error = %e, "Token verification failed");
            PlatformError::unauthorized(match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => "Token has expired",
                _ => "Invalid token",
            })
        })?;

        let user_id = data.claims.sub;
        if !self.users.exists(&user_id).await {
            tracing::warn!(user_id = %user_id, "Token references unknown user");
            return Err(PlatformError::unauthorized("Token is not valid"));
        }

        Ok(AuthenticatedUser { user_id })
    }

    /// REST path: `Authorization` header with optional `Bearer ` prefix.
    pub async fn authenticate_bearer(&self, header: Option<&str>) -> Result<AuthenticatedUser> {
        let raw = header.ok_or_else(|| {
            PlatformError::unauthorized("No token provided, authorization denied")
        })?;

        let token = raw
            .strip_prefix("Bearer ")
            .unwrap_or(raw)
            .trim_matches(|c| c == '"' || c == '\'')
            .trim();
        if token.is_empty() {
            return Err(PlatformError::unauthorized("Invalid token format"));
        }

        self.verify_token(token).await
    }

    /// Realtime handshake path: origin allow-list first, then the token from
    /// the query string.
    pub async fn authenticate_handshake(
        &self,
        origin: Option<&str>,
        token: Option<&str>,
    ) -> Result<AuthenticatedUser> {
        self.check_origin(origin)?;

        let token =
            token.ok_or_else(|| PlatformError::unauthorized("No token provided"))?;
        self.verify_token(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn gateway_with_user(user_id: &str) -> Arc<Gateway> {
        let users = InMemoryUserDirectory::new();
        users.add(user_id).await;
        Gateway::new(
            "test-secret".to_string(),
            3600,
            vec!["http://localhost:3000".to_string()],
            users,
        )
    }

    #[tokio::test]
    async fn test_token_roundtrip() {
        let gateway = gateway_with_user("user-a").await;
        let token = gateway.issue_token("user-a").unwrap();

        let authed = gateway.verify_token(&token).await.unwrap();
        assert_eq!(authed.user_id, "user-a");
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let gateway = gateway_with_user("user-a").await;

        // Expired well past the default validation leeway.
        let claims = Claims {
            sub: "user-a".to_string(),
            exp: (Utc::now().timestamp() - 300) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test-secret".as_bytes()),
        )
        .unwrap();

        let result = gateway.verify_token(&token).await;
        assert!(matches!(result, Err(PlatformError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let gateway = gateway_with_user("user-a").await;
        let result = gateway.verify_token("not.a.token").await;
        assert!(matches!(result, Err(PlatformError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_token_with_wrong_secret_rejected() {
        let gateway = gateway_with_user("user-a").await;
        let other = Gateway::new(
            "other-secret".to_string(),
            3600,
            vec![],
            InMemoryUserDirectory::new(),
        );
        let token = other.issue_token("user-a").unwrap();

        let result = gateway.verify_token(&token).await;
        assert!(matches!(result, Err(PlatformError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_token_for_unknown_user_rejected() {
        let gateway = gateway_with_user("user-a").await;
        let token = gateway.issue_token("user-deleted").unwrap();

        let result = gateway.verify_token(&token).await;
        assert!(matches!(result, Err(PlatformError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_bearer_prefix_and_quotes_stripped() {
        let gateway = gateway_with_user("user-a").await;
        let token = gateway.issue_token("user-a").unwrap();

        let header = format!("Bearer \"{}\"", token);
        let authed = gateway.authenticate_bearer(Some(&header)).await.unwrap();
        assert_eq!(authed.user_id, "user-a");

        // Raw token without prefix is accepted too.
        let authed = gateway.authenticate_bearer(Some(&token)).await.unwrap();
        assert_eq!(authed.user_id, "user-a");
    }

    #[tokio::test]
    async fn test_missing_bearer_rejected() {
        let gateway = gateway_with_user("user-a").await;
        let result = gateway.authenticate_bearer(None).await;
        assert!(matches!(result, Err(PlatformError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_handshake_checks_origin_before_token() {
        let gateway = gateway_with_user("user-a").await;
        let token = gateway.issue_token("user-a").unwrap();

        let authed = gateway
            .authenticate_handshake(Some("http://localhost:3000"), Some(&token))
            .await
            .unwrap();
        assert_eq!(authed.user_id, "user-a");

        let result = gateway
            .authenticate_handshake(Some("http://evil.example"), Some(&token))
            .await;
        assert!(matches!(result, Err(PlatformError::OriginNotAllowed(_))));

        let result = gateway.authenticate_handshake(None, Some(&token)).await;
        assert!(matches!(result, Err(PlatformError::OriginNotAllowed(_))));

        let result = gateway
            .authenticate_handshake(Some("http://localhost:3000"), None)
            .await;
        assert!(matches!(result, Err(PlatformError::Unauthorized(_))));
    }
}
