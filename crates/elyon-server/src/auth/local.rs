//! Local auth: any username is accepted and auto-registered

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use elyon_core::models::UserIdentity;

use super::token::{generate_session_token, validate_token_format};
use super::{default_identity, require_username, AuthError, AuthOutcome, AuthProvider};

struct LocalSession {
    user_id: String,
    expires_at: DateTime<Utc>,
}

/// In-memory session store
pub struct LocalAuthProvider {
    sessions: DashMap<String, LocalSession>,
    ttl: Duration,
}

impl LocalAuthProvider {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Drop expired sessions
    pub fn purge_expired(&self) {
        let now = Utc::now();
        self.sessions.retain(|_, session| session.expires_at > now);
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn authenticate(
        &self,
        username: &str,
        _password: Option<&str>,
    ) -> Result<AuthOutcome, AuthError> {
        let username = require_username(username)?;
        self.purge_expired();

        let token = generate_session_token(username);
        let expires_at = Utc::now() + self.ttl;
        self.sessions.insert(
            token.clone(),
            LocalSession {
                user_id: username.to_string(),
                expires_at,
            },
        );

        Ok(AuthOutcome {
            identity: default_identity(username),
            session_token: token,
            session_expires_at: Some(expires_at),
        })
    }

    async fn validate_token(&self, token: &str) -> Option<UserIdentity> {
        if !validate_token_format(token) {
            return None;
        }

        let user_id = {
            let session = self.sessions.get(token)?;
            if session.expires_at > Utc::now() {
                Some(session.user_id.clone())
            } else {
                None
            }
        };

        match user_id {
            Some(user_id) => Some(UserIdentity::new(user_id)),
            None => {
                self.sessions.remove(token);
                None
            }
        }
    }

    async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_validate_logout() {
        let provider = LocalAuthProvider::new(Duration::minutes(5));
        let outcome = provider.authenticate("ada", None).await.unwrap();
        assert_eq!(outcome.identity.profile["name"], "ada");
        assert!(outcome.session_expires_at.unwrap() > Utc::now());

        let identity = provider.validate_token(&outcome.session_token).await.unwrap();
        assert_eq!(identity.user_id, "ada");
        // Validation does not carry a profile, so syncing keeps the stored one
        assert!(identity.profile.is_empty());

        provider.logout(&outcome.session_token).await.unwrap();
        assert!(provider.validate_token(&outcome.session_token).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let provider = LocalAuthProvider::new(Duration::seconds(-1));
        let outcome = provider.authenticate("ada", None).await.unwrap();
        assert!(provider.validate_token(&outcome.session_token).await.is_none());
        assert!(provider.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_empty_username_is_rejected() {
        let provider = LocalAuthProvider::new(Duration::minutes(5));
        let err = provider.authenticate("  ", None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials(_)));
    }
}
