//! HTTP API: public catalog reads, bearer-guarded admin routes and the
//! admin change feed over server-sent events.

mod admin;
mod error;
mod public;

pub use error::{ApiError, ApiResult};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::HttpServerConfig;
use crate::error::{CatteryError, Result};
use crate::service::Cattery;

/// Check if a port is available by attempting to bind to it
async fn check_port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .is_ok()
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cattery: Cattery,
    api_key: String,
    allowed_origins: Vec<String>,
    authless: bool,
}

pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Reads the admin key from the configured environment variable unless authless.
    pub fn new(cattery: Cattery, config: &HttpServerConfig) -> Result<Self> {
        let api_key = if config.authless {
            String::new()
        } else {
            std::env::var(&config.api_key_env).map_err(|_| {
                CatteryError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable, or enable authless mode.",
                    config.api_key_env
                ))
            })?
        };

        if config.authless {
            log::warn!("Admin routes are running without authentication (http_server.authless = true)");
        }

        Ok(Self {
            state: AppState {
                cattery,
                api_key,
                allowed_origins: config.allowed_origins.clone(),
                authless: config.authless,
            },
        })
    }

    pub async fn run(&self, port: u16) -> Result<()> {
        let app = self.create_router();
        let addr = format!("127.0.0.1:{}", port);

        if !check_port_available(port).await {
            return Err(CatteryError::Config(format!(
                "Port {} is already in use. Stop the other process or set http_server.port in config.toml",
                port
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            CatteryError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        log::info!("Cattery API listening on http://{}", addr);

        axum::serve(listener, app).await.map_err(|e| {
            CatteryError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })?;

        Ok(())
    }

    pub fn create_router(&self) -> Router {
        let cors = if self.state.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .state
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        let admin = admin::routes().route_layer(middleware::from_fn_with_state(
            self.state.clone(),
            require_admin,
        ));

        Router::new()
            .merge(public::routes())
            .nest("/api/admin", admin)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(self.state.clone())
    }
}

async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.authless {
        if let Err(response) = validate_auth(request.headers(), &state.api_key) {
            return response;
        }
        if let Err(response) = validate_origin(request.headers(), &state.allowed_origins) {
            return response;
        }
    }
    next.run(request).await
}

fn validate_auth(headers: &HeaderMap, expected_key: &str) -> std::result::Result<(), Response> {
    let unauthorized = |error: &str| {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": error,
                "message": "Use 'Authorization: Bearer <api-key>' header"
            })),
        )
            .into_response()
    };

    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;

    let provided_key = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Invalid Authorization header format"))?;

    if expected_key.is_empty() || provided_key != expected_key {
        return Err(unauthorized("Invalid API key"));
    }
    Ok(())
}

fn validate_origin(headers: &HeaderMap, allowed_origins: &[String]) -> std::result::Result<(), Response> {
    // No configured origins means any origin (local development)
    if allowed_origins.is_empty() {
        return Ok(());
    }

    // Non-browser clients send no Origin
    let Some(origin) = headers.get("origin").and_then(|h| h.to_str().ok()) else {
        return Ok(());
    };

    if allowed_origins.iter().any(|allowed| origin == allowed) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "Origin not allowed",
                "message": format!("Origin '{}' is not in the allowed origins list", origin)
            })),
        )
            .into_response())
    }
}
