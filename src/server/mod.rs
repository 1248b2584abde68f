//! HTTP surface for Horizon
//!
//! Routes (relative to `server.base_path`):
//!
//! - `POST /conversations`, `GET /conversations`
//! - `GET | PUT | DELETE /conversations/:id`
//! - `POST /chat`
//! - `GET /health`, `GET /model-info`
//!
//! Everything except the last two requires a [`SessionUser`] in the request
//! extensions.
//!
//! [`SessionUser`]: crate::assistant::SessionUser

pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod session;

pub use error::{ApiError, ApiResult};
pub use rate_limit::ChatRateLimiter;
pub use session::{identity_from_headers, IdentityHeaders};

use crate::assistant::{init_metrics_exporter, ChatService, Statistics};
use crate::config::Config;
use crate::error::{HorizonError, Result};
use crate::providers::create_client;
use crate::storage::{ConversationStore, SqliteConversationStore};

use anyhow::Context;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state behind every handler
pub struct AppState {
    pub chat: Arc<ChatService>,
    /// `None` when rate limiting is disabled
    pub rate_limiter: Option<ChatRateLimiter>,
    /// Whether `/health` runs a live provider check
    pub check_on_health: bool,
}

impl AppState {
    /// Create state with rate limiting and the health check disabled
    pub fn new(chat: Arc<ChatService>) -> Self {
        Self {
            chat,
            rate_limiter: None,
            check_on_health: false,
        }
    }

    /// Enable per-user rate limiting on `POST /chat`
    ///
    /// # Arguments
    ///
    /// * `max_requests_per_minute` - Chat requests allowed per user per
    ///   minute; 0 leaves the limiter disabled
    ///
    /// # Returns
    ///
    /// Returns the state with the limiter installed or removed
    pub fn with_rate_limit(mut self, max_requests_per_minute: u32) -> Self {
        self.rate_limiter =
            (max_requests_per_minute > 0).then(|| ChatRateLimiter::new(max_requests_per_minute));
        self
    }

    pub fn with_health_check(mut self, enabled: bool) -> Self {
        self.check_on_health = enabled;
        self
    }

    /// Build the full application state from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or the HTTP client
    /// cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = match &config.storage.db_path {
            Some(path) => SqliteConversationStore::new_with_path(path.clone()),
            None => SqliteConversationStore::new(),
        }
        .map_err(HorizonError::from)?;
        tracing::info!("Conversation database: {}", store.db_path().display());
        let store: Arc<dyn ConversationStore> = Arc::new(store);

        let client = create_client(&config.provider)?;
        let chat = ChatService::new(
            store,
            client,
            Arc::new(Statistics::new()),
            config.assistant.max_message_length,
        )
        .with_display_name(config.provider.display_name.clone());

        Ok(Self::new(Arc::new(chat))
            .with_rate_limit(config.assistant.rate_limit_per_minute)
            .with_health_check(config.assistant.check_on_health))
    }
}

/// Routes bound to `state`, without session or tracing layers
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/conversations",
            post(handlers::create_conversation).get(handlers::list_conversations),
        )
        .route(
            "/conversations/:id",
            get(handlers::get_conversation)
                .put(handlers::update_conversation)
                .delete(handlers::delete_conversation),
        )
        .route("/chat", post(handlers::chat))
        .route("/health", get(handlers::health))
        .route("/model-info", get(handlers::model_info))
        .with_state(state)
}

/// Complete application: routes under `base_path`, trusted identity headers,
/// request tracing
pub fn app(state: Arc<AppState>, base_path: &str, identity: IdentityHeaders) -> Router {
    let routes = router(state);
    let routes = if base_path.is_empty() || base_path == "/" {
        routes
    } else {
        Router::new().nest(base_path.trim_end_matches('/'), routes)
    };

    routes
        .layer(middleware::from_fn_with_state(identity, identity_from_headers))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until Ctrl+C or SIGTERM
///
/// # Errors
///
/// Returns error if startup fails or the listener cannot be bound
pub async fn serve(config: &Config) -> Result<()> {
    init_metrics_exporter();

    let state = Arc::new(AppState::from_config(config)?);
    let identity = IdentityHeaders {
        user_id: config.server.user_id_header.clone(),
        username: config.server.username_header.clone(),
    };
    let app = app(state, &config.server.base_path, identity);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(HorizonError::Io)
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    tracing::info!(
        "Horizon listening on http://{}{}",
        listener.local_addr()?,
        config.server.base_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections...");
}
