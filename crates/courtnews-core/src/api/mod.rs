//! HTTP surface of the news service

mod news;

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::AppConfig;
use crate::news::{NewsPipeline, NewsQuery};
use crate::Result;

pub use news::resolve_limit;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<NewsPipeline>,
    query: Arc<NewsQuery>,
    default_limit: u32,
    max_limit: u32,
    environment: Arc<str>,
}

impl AppState {
    pub fn new(pipeline: Arc<NewsPipeline>, query: Arc<NewsQuery>, config: &AppConfig) -> Self {
        Self {
            pipeline,
            query,
            default_limit: config.server.default_limit,
            max_limit: config.server.max_limit,
            environment: Arc::from(config.general.environment.as_str()),
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/news", get(news::list_news))
        .route("/api/news/status", get(news::news_status))
        .route("/api/news/refresh", post(news::refresh_news))
        .fallback(not_found)
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "2ª Vara Cível de Cariacica - API de notícias",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "news": "GET /api/news?limit=<n>",
            "status": "GET /api/news/status",
            "refresh": "POST /api/news/refresh",
            "health": "GET /health",
        },
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": &*state.environment,
    }))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": "Endpoint não encontrado",
        })),
    )
}

/// Serve `router` on `listener` until the shutdown flag flips to `true`
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("HTTP server listening on {}", addr);
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
