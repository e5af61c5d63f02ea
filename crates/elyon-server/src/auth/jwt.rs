//! Stateless HS256 tokens

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use elyon_core::models::UserIdentity;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{default_identity, require_username, AuthError, AuthOutcome, AuthProvider};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

pub struct JwtAuthProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtAuthProvider {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    fn issue(&self, user_id: &str, exp: i64) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }
}

#[async_trait]
impl AuthProvider for JwtAuthProvider {
    fn name(&self) -> &'static str {
        "jwt"
    }

    async fn authenticate(
        &self,
        username: &str,
        _password: Option<&str>,
    ) -> Result<AuthOutcome, AuthError> {
        let username = require_username(username)?;
        let exp = (Utc::now() + self.ttl).timestamp();
        let token = self.issue(username, exp)?;

        Ok(AuthOutcome {
            identity: default_identity(username),
            session_token: token,
            session_expires_at: Utc.timestamp_opt(exp, 0).single(),
        })
    }

    async fn validate_token(&self, token: &str) -> Option<UserIdentity> {
        match decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Some(UserIdentity::new(data.claims.sub)),
            Err(e) => {
                tracing::debug!("Rejected JWT: {}", e);
                None
            }
        }
    }

    // Tokens expire on their own
    async fn logout(&self, _token: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_and_validate() {
        let provider = JwtAuthProvider::new("secret", Duration::minutes(5));
        let outcome = provider.authenticate("admin", Some("pw")).await.unwrap();
        assert_eq!(outcome.identity.profile["name"], "Administrator");

        let identity = provider.validate_token(&outcome.session_token).await.unwrap();
        assert_eq!(identity.user_id, "admin");
    }

    #[tokio::test]
    async fn test_rejects_foreign_and_expired_tokens() {
        let provider = JwtAuthProvider::new("secret", Duration::minutes(5));
        let other = JwtAuthProvider::new("other", Duration::minutes(5));
        let outcome = other.authenticate("ada", None).await.unwrap();
        assert!(provider.validate_token(&outcome.session_token).await.is_none());

        // Past the default 60s leeway
        let expired = provider
            .issue("ada", (Utc::now() - Duration::minutes(10)).timestamp())
            .unwrap();
        assert!(provider.validate_token(&expired).await.is_none());
        assert!(provider.validate_token("not-a-jwt").await.is_none());
    }
}
