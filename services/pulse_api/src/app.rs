//! services/pulse_api/src/app.rs
//!
//! Wires the storage adapters, the chat hub and the HTTP router together.
//! Shared by the `api` binary and the integration tests.

use crate::{
    adapters::{DbAdapter, DbNotificationAdapter},
    config::{Config, StorageBackend},
    error::ApiError,
    web::{
        chat_history_handler, connections::ConnectionHub, mark_read_handler, presence_handler,
        rest::ApiDoc, root_handler, state::AppState, unread_count_handler, ws_handler,
    },
};
use axum::{
    http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use pulse_core::{
    memory::{InMemoryMessageRepository, InMemoryUserProfileStore},
    ChatHub, HubOptions, MessageRepository, MessageStore, NotificationService, PresenceWriter,
    StartupReconciler, UserProfileStore,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// The persistence ports the hub runs on.
pub struct Storage {
    pub messages: Arc<dyn MessageRepository>,
    pub profiles: Arc<dyn UserProfileStore>,
    pub notifier: Option<Arc<dyn NotificationService>>,
}

impl Storage {
    /// Process-local storage with no notification side channel.
    pub fn in_memory() -> Self {
        Self {
            messages: Arc::new(InMemoryMessageRepository::new()),
            profiles: Arc::new(InMemoryUserProfileStore::new()),
            notifier: None,
        }
    }

    /// Connects to the configured backend, running migrations for Postgres.
    pub async fn connect(config: &Config) -> Result<Self, ApiError> {
        match config.storage_backend {
            StorageBackend::Memory => {
                warn!("Using in-memory storage; messages will not survive a restart.");
                Ok(Self::in_memory())
            }
            StorageBackend::Postgres => {
                let database_url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| ApiError::Internal("DATABASE_URL is required".to_string()))?;
                info!("Connecting to database...");
                let db_pool = PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .connect(database_url)
                    .await?;
                let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
                info!("Running database migrations...");
                db_adapter.run_migrations().await?;
                info!("Database migrations complete.");

                let notifier: Option<Arc<dyn NotificationService>> = if config.notifications_enabled {
                    Some(Arc::new(DbNotificationAdapter::new(db_pool)))
                } else {
                    None
                };
                Ok(Self {
                    messages: db_adapter.clone(),
                    profiles: db_adapter,
                    notifier,
                })
            }
        }
    }
}

/// Resets stale presence, then starts the hub. Nothing can register before
/// reconciliation has finished.
pub async fn build_state(
    config: Arc<Config>,
    storage: Storage,
) -> Result<(Arc<AppState>, PresenceWriter), ApiError> {
    info!("Resetting stale presence flags...");
    let reconciled = StartupReconciler::new(storage.profiles.clone()).run().await?;
    info!(
        found = reconciled.found(),
        reset = reconciled.reset(),
        failed = reconciled.failed(),
        "Presence reconciliation finished."
    );

    let connections = Arc::new(ConnectionHub::new());
    let notifier = if config.notifications_enabled {
        storage.notifier
    } else {
        None
    };
    let (hub, writer) = ChatHub::start(
        reconciled,
        MessageStore::new(storage.messages),
        storage.profiles,
        connections.clone(),
        HubOptions {
            echo_policy: config.echo_policy,
            notifier,
        },
    );

    let app_state = Arc::new(AppState {
        hub,
        connections,
        config,
    });
    Ok((app_state, writer))
}

/// Builds the HTTP router: REST endpoints, the WebSocket upgrade and Swagger UI.
pub fn build_router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = app_state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    let api_router = Router::new()
        .route("/", get(root_handler))
        .route("/ws", get(ws_handler))
        .route("/api/messages/read", post(mark_read_handler))
        .route("/api/messages/unread/{user_id}/{other_user_id}", get(unread_count_handler))
        .route("/api/messages/{user_id}/{other_user_id}", get(chat_history_handler))
        .route("/api/presence/{user_id}", get(presence_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    Ok(app)
}
