use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::core::auth::WriteGate;
use crate::core::config::{AppConfig, DeliveryConfig};
use crate::library::SubtitleLibrary;
use crate::storage::StoreBackend;

use super::handlers;
use super::middleware::{RequestIdLayer, X_REQUEST_ID};

/// Room for multipart boundaries and text fields on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

// ---------------------------------------------------------------------------
// API router
// ---------------------------------------------------------------------------

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<SubtitleLibrary<StoreBackend>>,
    pub gate: Arc<WriteGate>,
    pub config: Arc<AppConfig>,
    pub start_time: Instant,
    /// Prometheus metrics handle for rendering /metrics endpoint.
    pub metrics_handle: PrometheusHandle,
}

/// Build the full Axum router with all routes.
///
/// **Library API** (writes go through the write gate):
/// - `POST   /api/v1/subtitles` upload a file or a zip archive (gated)
/// - `GET    /api/v1/subtitles` fetch one exact version
/// - `HEAD   /api/v1/subtitles` does the episode have any version
/// - `DELETE /api/v1/subtitles` delete by scope (gated)
/// - `GET    /api/v1/versions`  versions of one episode
/// - `GET    /api/v1/catalog`   full catalog
///
/// **Operational:**
/// - `GET /healthz`, `GET /readyz`, `GET /metrics`
pub fn build_router(state: AppState) -> Router {
    let delivery = &state.config.delivery;
    info!(
        cache_control = %delivery.cache_control,
        cors_origins = ?delivery.cors_allowed_origins,
        "delivery configuration loaded"
    );

    let cors = cors_layer(delivery);
    let body_limit = DefaultBodyLimit::max(
        (state.config.upload.max_upload_size_bytes + MULTIPART_OVERHEAD_BYTES) as usize,
    );

    Router::new()
        .route(
            "/api/v1/subtitles",
            get(handlers::fetch_subtitle)
                .head(handlers::subtitle_exists)
                .post(handlers::upload_subtitles)
                .delete(handlers::delete_subtitles),
        )
        .route("/api/v1/versions", get(handlers::list_versions))
        .route("/api/v1/catalog", get(handlers::get_catalog))
        // Health endpoints
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(cors)
        .layer(body_limit)
        .layer(RequestIdLayer)
        .with_state(state)
}

fn cors_layer(config: &DeliveryConfig) -> CorsLayer {
    let origins = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::ETAG,
            header::CONTENT_DISPOSITION,
            X_REQUEST_ID.clone(),
        ])
        .max_age(std::time::Duration::from_secs(86400))
}
