//! Authentication module for the Elyon server
//!
//! One [`AuthProvider`] is chosen at startup from `AUTH_PROVIDER`:
//! - `local`: auto-registers usernames, opaque tokens held in memory
//! - `jwt`: stateless HS256 tokens signed with `SECRET_KEY`
//! - `http`: delegates to a remote auth service

pub mod http;
pub mod jwt;
pub mod local;
pub mod middleware;
pub mod routes;
pub mod token;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elyon_core::models::UserIdentity;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AuthProviderKind, Config};

pub use http::HttpAuthProvider;
pub use jwt::JwtAuthProvider;
pub use local::LocalAuthProvider;

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub identity: UserIdentity,
    pub session_token: String,
    pub session_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Auth service error: {0}")]
    Upstream(String),

    #[error("Token error: {0}")]
    Token(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Upstream(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::Token(err.to_string())
    }
}

/// Authentication strategy
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check credentials and issue a session token
    async fn authenticate(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> Result<AuthOutcome, AuthError>;

    /// Resolve a bearer token to the identity it was issued for
    async fn validate_token(&self, token: &str) -> Option<UserIdentity>;

    /// Invalidate a session token
    async fn logout(&self, token: &str) -> Result<(), AuthError>;
}

/// Identity handed out by providers that auto-register users
pub(crate) fn default_identity(username: &str) -> UserIdentity {
    if username == elyon_core::services::ADMIN_USER_ID {
        UserIdentity::new(username).with_name("Administrator")
    } else {
        UserIdentity::new(username).with_name(username)
    }
}

pub(crate) fn require_username(username: &str) -> Result<&str, AuthError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AuthError::InvalidCredentials("Username is required".into()));
    }
    Ok(username)
}

/// Build the provider selected by configuration
pub fn build_auth_provider(config: &Config) -> anyhow::Result<Arc<dyn AuthProvider>> {
    let ttl = chrono::Duration::minutes(config.access_token_expire_minutes.max(1));
    let provider: Arc<dyn AuthProvider> = match config.auth_provider {
        AuthProviderKind::Local => Arc::new(LocalAuthProvider::new(ttl)),
        AuthProviderKind::Jwt => Arc::new(JwtAuthProvider::new(&config.secret_key, ttl)),
        AuthProviderKind::Http => Arc::new(HttpAuthProvider::new(
            &config.auth_service_url,
            config.auth_api_key.clone(),
        )?),
    };
    tracing::info!(provider = provider.name(), "Auth provider configured");
    Ok(provider)
}
