//! piggy Web Server
//!
//! Axum-based REST/SSE facade over the analytics core. The facade is a
//! stateless translation layer: it bound-checks query parameters, calls
//! the engines, and maps engine errors onto the HTTP error taxonomy.
//! Authentication lives in front of this service; CORS is enforced here
//! against a configured allow-list.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use piggy_core::{Database, DealCatalog, SearchClient, SuggesterConfig};

mod handlers;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Categories in which deal suggestions are surfaced
    pub deals_allowed_categories: Vec<String>,
    /// Weekly suggester tuning
    pub suggester: SuggesterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            deals_allowed_categories: vec!["Groceries".to_string()],
            suggester: SuggesterConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read configuration from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let allowed_origins = std::env::var("PIGGY_CORS_ALLOW_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);
        let deals_allowed_categories = std::env::var("PIGGY_DEALS_CATEGORIES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.deals_allowed_categories);

        Self {
            allowed_origins,
            deals_allowed_categories,
            suggester: SuggesterConfig::from_env(),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub search: Option<SearchClient>,
    pub catalog: &'static DealCatalog,
}

impl AppState {
    /// A weekly suggester wired to this state's store and capability.
    pub fn suggester(&self) -> piggy_core::WeeklySuggester {
        piggy_core::WeeklySuggester::new(
            self.db.clone(),
            self.search.clone(),
            self.config.suggester.clone(),
        )
    }
}

/// Create the application router
pub fn create_router(db: Database, search: Option<SearchClient>, config: ServerConfig) -> Router {
    if let Some(client) = &search {
        use piggy_core::SearchBackend;
        info!(
            "Search capability configured: {} (model: {})",
            client.host(),
            client.model()
        );
    } else {
        info!("Search capability not configured (set PIGGY_SEARCH_HOST to enable weekly suggestions)");
    }

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        search,
        catalog: DealCatalog::builtin(),
    });

    let api_routes = Router::new()
        // Feed & search
        .route(
            "/user/:user_id/transactions",
            get(handlers::list_transactions),
        )
        .route("/semantic-search", get(handlers::semantic_search))
        .route("/stats/category", get(handlers::category_stats))
        .route("/reply", post(handlers::record_reply))
        // Engines
        .route("/predict", get(handlers::predict))
        .route("/smart-tips", get(handlers::smart_tips))
        .route("/better-deals", get(handlers::better_deals))
        // Weekly reports
        .route(
            "/user/:user_id/weekly_alternatives",
            get(handlers::get_weekly_alternatives),
        )
        .route(
            "/user/:user_id/weekly_alternatives/history",
            get(handlers::weekly_alternatives_history),
        )
        .route(
            "/user/:user_id/weekly_alternatives/stream",
            get(handlers::stream_weekly_alternatives),
        );

    // Build CORS layer from the allow-list; empty keeps same-origin only
    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server
pub async fn serve(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    let search = SearchClient::from_env();
    let app = create_router(db, search, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<String>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred".to_string(),
            internal: Some(msg.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(detail) = &self.internal {
            error!(error = %detail, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<piggy_core::Error> for AppError {
    fn from(err: piggy_core::Error) -> Self {
        let status = match err.kind() {
            "bad_request" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "capability_quota" => StatusCode::TOO_MANY_REQUESTS,
            "timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %err, kind = err.kind(), "Engine error");
            Self {
                status,
                message: "An internal error occurred".to_string(),
                internal: Some(err.to_string()),
            }
        } else {
            Self {
                status,
                message: err.to_string(),
                internal: None,
            }
        }
    }
}

/// Success response
#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}
