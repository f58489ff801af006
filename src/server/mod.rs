//! HTTP and WebSocket surface over the scheduler.
//!
//! | Module | Responsibility                                        |
//! |--------|-------------------------------------------------------|
//! | `api`  | JSON routes, `AppState`, `ApiError`                   |
//! | `ws`   | `/ws` event stream with ping/pong keepalive           |

pub mod api;
pub mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerSection;
use crate::scheduler::Scheduler;
pub use api::{AppState, SharedState};

/// Configuration for the HTTP server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow cross-origin requests from any origin
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSection::default())
    }
}

impl From<&ServerSection> for ServerConfig {
    fn from(section: &ServerSection) -> Self {
        Self {
            host: section.host.clone(),
            port: section.port,
            cors: false,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Build the full application router with API and WebSocket routes.
pub fn build_router(state: SharedState, cors: bool) -> Router {
    let mut app = api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Run the scheduler and serve HTTP until Ctrl+C, then drain in-flight jobs.
pub async fn start_server(config: ServerConfig, scheduler: Arc<Scheduler>) -> Result<()> {
    let state = Arc::new(AppState::new(scheduler.clone()));
    let app = build_router(state, config.cors);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;

    let handle = scheduler.spawn();
    info!(addr = %local_addr, "fxgen server listening");
    println!("fxgen running at http://{}", local_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    handle.shutdown().await;
    served?;
    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a handler the server runs until killed.
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::generator::TemplateGenerator;
    use crate::scheduler::SchedulerSettings;
    use crate::store::SqliteStore;

    fn test_router(cors: bool) -> Router {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let scheduler = Arc::new(Scheduler::new(
            store,
            Arc::new(TemplateGenerator::new()),
            SchedulerSettings::default(),
        ));
        build_router(Arc::new(AppState::new(scheduler)), cors)
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = test_router(false).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_mounted() {
        let req = Request::builder()
            .uri("/api/queue")
            .body(Body::empty())
            .unwrap();
        let resp = test_router(false).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let req = Request::builder()
            .uri("/some/client/route")
            .body(Body::empty())
            .unwrap();
        let resp = test_router(false).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = test_router(false).oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn test_cors_layer_when_enabled() {
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let resp = test_router(true).oneshot(req).await.unwrap();
        assert!(resp.headers().contains_key("access-control-allow-origin"));

        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let resp = test_router(false).oneshot(req).await.unwrap();
        assert!(!resp.headers().contains_key("access-control-allow-origin"));
    }

    #[test]
    fn test_server_config_from_section() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:3141");
        assert!(!config.cors);
    }
}
