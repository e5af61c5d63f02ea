//! Configuration management for the Elyon server

use anyhow::{Context, Result};
use elyon_core::llm::{LlmProviderKind, LlmSettings, DEFAULT_LLM_SERVICE_URL};
use elyon_core::{StorageBackend, StorageSettings};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Authentication strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProviderKind {
    #[default]
    Local,
    Jwt,
    Http,
}

impl FromStr for AuthProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(AuthProviderKind::Local),
            "jwt" => Ok(AuthProviderKind::Jwt),
            "http" => Ok(AuthProviderKind::Http),
            _ => Err(format!("Unknown auth provider: {}", s)),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database URL (default: sqlite://./data/elyon.db?mode=rwc)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum database connections (default: 10)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Prefix for API routes (default: /api/v1)
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// CORS allowed origins (comma-separated). If empty, any origin is allowed.
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    pub auth_provider: AuthProviderKind,

    /// Base URL of the remote auth service (http provider)
    #[serde(default = "default_auth_service_url")]
    pub auth_service_url: String,

    pub auth_api_key: Option<String>,

    /// HS256 signing key for the jwt provider
    #[serde(default = "default_secret_key")]
    pub secret_key: String,

    /// Lifetime of issued session tokens (default: 480)
    #[serde(default = "default_access_token_expire_minutes")]
    pub access_token_expire_minutes: i64,

    /// Artifact storage backend: db | file | gcs | http (default: db)
    #[serde(default = "default_storage_backend")]
    pub artifact_storage_backend: String,

    #[serde(default = "default_storage_path")]
    pub artifact_storage_path: String,

    pub artifact_gcs_bucket: Option<String>,

    #[serde(default = "default_gcs_endpoint")]
    pub artifact_gcs_endpoint: String,

    pub artifact_gcs_token: Option<String>,

    pub artifact_http_url: Option<String>,

    /// LLM provider: mock | http (default: mock)
    #[serde(default = "default_llm_provider")]
    pub llm_provider: String,

    #[serde(default = "default_llm_service_url")]
    pub llm_service_url: String,

    pub llm_api_key: Option<String>,

    /// Seconds between `/events/stream` heartbeats (default: 10)
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Directory for daily rolling log files; console only when unset
    pub log_dir: Option<String>,

    /// Log format: text | json (default: text)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_database_url() -> String {
    "sqlite://./data/elyon.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

fn default_project_name() -> String {
    "Elyon API".to_string()
}

fn default_auth_service_url() -> String {
    "http://localhost:8001/auth".to_string()
}

fn default_secret_key() -> String {
    "change-me-in-production".to_string()
}

fn default_access_token_expire_minutes() -> i64 {
    480
}

fn default_storage_backend() -> String {
    "db".to_string()
}

fn default_storage_path() -> String {
    "./artifacts".to_string()
}

fn default_gcs_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_llm_provider() -> String {
    "mock".to_string()
}

fn default_llm_service_url() -> String {
    DEFAULT_LLM_SERVICE_URL.to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

fn default_log_format() -> String {
    "text".to_string()
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("ELYON_HOST").unwrap_or_else(|_| default_host());
        let port = std::env::var("ELYON_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_port);
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| default_database_url());
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_max_connections);
        let api_prefix = std::env::var("API_V1_STR").unwrap_or_else(|_| default_api_prefix());
        let project_name =
            std::env::var("PROJECT_NAME").unwrap_or_else(|_| default_project_name());
        let cors_allowed_origins = env_opt("CORS_ALLOWED_ORIGINS");

        // Reject typos instead of silently falling back to local auth
        let auth_provider = match env_opt("AUTH_PROVIDER") {
            Some(value) => value.parse::<AuthProviderKind>().map_err(|e: String| {
                anyhow::anyhow!("Invalid AUTH_PROVIDER: {}. Must be one of: local, jwt, http", e)
            })?,
            None => AuthProviderKind::default(),
        };
        let auth_service_url =
            std::env::var("AUTH_SERVICE_URL").unwrap_or_else(|_| default_auth_service_url());
        let auth_api_key = env_opt("AUTH_API_KEY");
        let secret_key = std::env::var("SECRET_KEY").unwrap_or_else(|_| default_secret_key());
        let access_token_expire_minutes = std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_access_token_expire_minutes);

        let artifact_storage_backend = std::env::var("ARTIFACT_STORAGE_BACKEND")
            .unwrap_or_else(|_| default_storage_backend());
        let artifact_storage_path =
            std::env::var("ARTIFACT_STORAGE_PATH").unwrap_or_else(|_| default_storage_path());
        let artifact_gcs_bucket = env_opt("ARTIFACT_GCS_BUCKET");
        let artifact_gcs_endpoint =
            std::env::var("ARTIFACT_GCS_ENDPOINT").unwrap_or_else(|_| default_gcs_endpoint());
        let artifact_gcs_token = env_opt("ARTIFACT_GCS_TOKEN");
        let artifact_http_url = env_opt("ARTIFACT_HTTP_URL");

        let llm_provider = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| default_llm_provider());
        let llm_service_url =
            std::env::var("LLM_SERVICE_URL").unwrap_or_else(|_| default_llm_service_url());
        let llm_api_key = env_opt("LLM_API_KEY");
        let heartbeat_interval_secs = std::env::var("HEARTBEAT_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_heartbeat_interval_secs);

        let log_dir = env_opt("LOG_DIR");
        let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| default_log_format());

        Ok(Self {
            host,
            port,
            database_url,
            max_connections,
            api_prefix,
            project_name,
            cors_allowed_origins,
            auth_provider,
            auth_service_url,
            auth_api_key,
            secret_key,
            access_token_expire_minutes,
            artifact_storage_backend,
            artifact_storage_path,
            artifact_gcs_bucket,
            artifact_gcs_endpoint,
            artifact_gcs_token,
            artifact_http_url,
            llm_provider,
            llm_service_url,
            llm_api_key,
            heartbeat_interval_secs,
            log_dir,
            log_format,
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    pub fn storage_settings(&self) -> StorageSettings {
        StorageSettings {
            backend: StorageBackend::from_config(&self.artifact_storage_backend),
            path: PathBuf::from(&self.artifact_storage_path),
            gcs_bucket: self.artifact_gcs_bucket.clone(),
            gcs_endpoint: self.artifact_gcs_endpoint.clone(),
            gcs_token: self.artifact_gcs_token.clone(),
            http_url: self.artifact_http_url.clone(),
        }
    }

    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            provider: LlmProviderKind::from_config(&self.llm_provider),
            service_url: self.llm_service_url.clone(),
            api_key: self.llm_api_key.clone(),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// API prefix with a leading slash and no trailing slash
    pub fn normalized_api_prefix(&self) -> String {
        let trimmed = self.api_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            api_prefix: default_api_prefix(),
            project_name: default_project_name(),
            cors_allowed_origins: None,
            auth_provider: AuthProviderKind::default(),
            auth_service_url: default_auth_service_url(),
            auth_api_key: None,
            secret_key: default_secret_key(),
            access_token_expire_minutes: default_access_token_expire_minutes(),
            artifact_storage_backend: default_storage_backend(),
            artifact_storage_path: default_storage_path(),
            artifact_gcs_bucket: None,
            artifact_gcs_endpoint: default_gcs_endpoint(),
            artifact_gcs_token: None,
            artifact_http_url: None,
            llm_provider: default_llm_provider(),
            llm_service_url: default_llm_service_url(),
            llm_api_key: None,
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            log_dir: None,
            log_format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_defaults_and_overrides() {
        std::env::remove_var("AUTH_PROVIDER");
        std::env::set_var("ELYON_PORT", "9100");
        std::env::set_var("ARTIFACT_STORAGE_BACKEND", "file");
        std::env::set_var("LLM_PROVIDER", "http");

        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.auth_provider, AuthProviderKind::Local);
        assert_eq!(config.storage_settings().backend, StorageBackend::File);
        assert_eq!(config.llm_settings().provider, LlmProviderKind::Http);

        std::env::remove_var("ELYON_PORT");
        std::env::remove_var("ARTIFACT_STORAGE_BACKEND");
        std::env::remove_var("LLM_PROVIDER");
    }

    #[test]
    #[serial]
    fn test_invalid_auth_provider_is_rejected() {
        std::env::set_var("AUTH_PROVIDER", "ldap");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("AUTH_PROVIDER"));
        std::env::remove_var("AUTH_PROVIDER");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elyon.toml");
        std::fs::write(
            &path,
            "port = 7000\nauth_provider = \"jwt\"\napi_prefix = \"api/v2/\"\n",
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.auth_provider, AuthProviderKind::Jwt);
        assert_eq!(config.normalized_api_prefix(), "/api/v2");
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(10));
    }
}
