//! Elyon Server - standalone backend for workspaces, chat sessions and artifacts
//!
//! Clients log in through `/auth/login` and send the returned token as
//! `Authorization: Bearer <token>` on every other API call.

mod auth;
mod config;
mod logging;
mod state;

use anyhow::Result;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use clap::Parser;
use elyon_core::routes::CoreState;
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::middleware::auth_middleware;
use crate::config::Config;
use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "elyon-server", version, about = "Elyon backend API server")]
struct Cli {
    /// TOML config file; environment variables are used when omitted
    #[arg(long, env = "ELYON_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let _log_guard = logging::init(&config);
    info!(
        "Starting {} on {}:{}",
        config.project_name, config.host, config.port
    );

    let database_url = config.database_url.clone();
    info!("Connecting to database: {}", database_url);

    // Ensure parent directory exists for SQLite
    if database_url.starts_with("sqlite:") {
        let path = database_url.trim_start_matches("sqlite:");
        let path = path.trim_start_matches("//");
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&database_url)
        .await?;

    info!("Running database migrations...");
    elyon_core::migrations::run_migration(&pool).await?;
    info!("Database migrations completed");

    let store = elyon_core::build_store(&config.storage_settings())?;
    let llm = elyon_core::llm::build_provider(&config.llm_settings());
    let core = CoreState::new(Arc::new(pool), store, llm)
        .with_heartbeat_interval(config.heartbeat_interval());
    let auth = auth::build_auth_provider(&config)?;

    let state = Arc::new(AppState::new(config.clone(), core, auth));
    let admin = state.users.initialize_defaults(&state.pool).await?;
    info!(admin = %admin.user_id, "Default user and workspace ready");

    let app = build_router(state);

    let addr = SocketAddr::new(config.host.parse()?, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

fn build_router(state: Arc<AppState>) -> Router {
    let api_prefix = state.config.normalized_api_prefix();
    let cors = cors_layer(&state.config);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/", get(root))
        .route(&format!("{}/health", api_prefix), get(health_check))
        .with_state(state.clone());

    // Everything else under the prefix requires a token
    let protected_routes = elyon_core::routes::configure_routes(state.core.clone())
        .merge(auth::routes::protected_router().with_state(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = auth::routes::public_router()
        .with_state(state.clone())
        .merge(protected_routes);

    let router = Router::new().merge(public_routes);
    let router = if api_prefix.is_empty() {
        router.merge(api_routes)
    } else {
        router.nest(&api_prefix, api_routes)
    };

    router.layer(TraceLayer::new_for_http()).layer(cors)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Elyon Backend API is running." }))
}

async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match sqlx::query("SELECT 1").fetch_one(state.pool.as_ref()).await {
        Ok(_) => Ok(Json(serde_json::json!({
            "status": "healthy",
            "database": "connected",
            "version": env!("CARGO_PKG_VERSION")
        }))),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use elyon_core::llm::MockProvider;
    use elyon_core::storage::DatabaseStore;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_state(config: Config) -> Arc<AppState> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        elyon_core::migrations::run_migration(&pool).await.unwrap();

        let core = CoreState::new(
            Arc::new(pool),
            Arc::new(DatabaseStore),
            Arc::new(MockProvider::seeded(7)),
        );
        let auth = auth::build_auth_provider(&config).unwrap();
        let state = Arc::new(AppState::new(config, core, auth));
        state.users.initialize_defaults(&state.pool).await.unwrap();
        state
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        decode(app.clone().oneshot(request).await.unwrap()).await
    }

    async fn decode(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn login(app: &Router, username: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("username={}&password=secret", username)))
            .unwrap();
        decode(app.clone().oneshot(request).await.unwrap()).await
    }

    #[tokio::test]
    async fn test_public_endpoints() {
        let app = build_router(test_state(Config::default()).await);

        let (status, body) = call(&app, "GET", "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Elyon Backend API is running.");

        let (status, body) = call(&app, "GET", "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = build_router(test_state(Config::default()).await);

        let (status, body) = call(&app, "GET", "/api/v1/workspaces", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, _) = call(&app, "GET", "/api/v1/auth/me", Some("elyon_nobody_xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_creates_personal_workspace() {
        let app = build_router(test_state(Config::default()).await);

        let (status, body) = login(&app, "ada").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["user"]["user_id"], "ada");
        assert_eq!(body["user"]["profile"]["name"], "ada");
        assert!(body["session_expires_at"].is_string());
        let workspace_id = body["user"]["active_workspace_id"].as_str().unwrap().to_string();
        let token = body["access_token"].as_str().unwrap().to_string();

        let (status, me) = call(&app, "GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["user_id"], "ada");

        let (status, workspace) = call(
            &app,
            "GET",
            &format!("/api/v1/workspaces/{}", workspace_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(workspace["id"], workspace_id);

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/auth/logout",
            Some(&token),
            Some(json!({"session_token": token})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Logged out successfully");

        let (status, _) = call(&app, "GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_lands_in_default_workspace() {
        let app = build_router(test_state(Config::default()).await);

        let (status, body) = login(&app, "admin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["profile"]["name"], "Administrator");
        assert_eq!(body["user"]["active_workspace_id"], "default_workspace");
    }

    #[tokio::test]
    async fn test_update_active_workspace_and_sync() {
        let app = build_router(test_state(Config::default()).await);
        let (_, body) = login(&app, "ada").await;
        let token = body["access_token"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/auth/update-active-workspace",
            Some(&token),
            Some(json!({"user_id": "grace", "workspace_id": "default_workspace"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Cannot update another user's workspace");

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/auth/update-active-workspace",
            Some(&token),
            Some(json!({"user_id": "ada", "workspace_id": "default_workspace"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active_workspace_id"], "default_workspace");

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/auth/sync",
            Some(&token),
            Some(json!({"user_id": "grace"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "grace");
        assert!(body["active_workspace_id"].is_string());
    }

    #[tokio::test]
    async fn test_jwt_provider_round_trip() {
        let config = Config {
            auth_provider: crate::config::AuthProviderKind::Jwt,
            secret_key: "test-secret".to_string(),
            ..Config::default()
        };
        let app = build_router(test_state(config).await);

        let (status, body) = login(&app, "ada").await;
        assert_eq!(status, StatusCode::OK);
        let token = body["access_token"].as_str().unwrap().to_string();

        let (status, me) = call(&app, "GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        // Token validation carries no profile, so the login profile is kept
        assert_eq!(me["profile"]["name"], "ada");
    }

    #[tokio::test]
    async fn test_custom_api_prefix() {
        let config = Config {
            api_prefix: "/api/v2/".to_string(),
            ..Config::default()
        };
        let app = build_router(test_state(config).await);

        let (status, _) = call(&app, "GET", "/api/v2/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "GET", "/api/v2/workspaces", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
