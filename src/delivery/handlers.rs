use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::catalog::scope::CatalogScope;
use crate::core::auth::TokenStatus;
use crate::core::error::LibraryError;
use crate::core::redact::{redact_bearer_token, Redacted};
use crate::library::{ArchiveReport, ArchiveUpload, SubtitleUpload};
use crate::storage::ObjectStore;

use super::router::AppState;

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    status: u16,
}

fn error_json(status: StatusCode, error: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
        status: status.as_u16(),
    };
    (status, Json(body)).into_response()
}

fn library_error(e: &LibraryError) -> Response {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %e, "library operation failed");
    } else {
        debug!(error = %e, "request rejected");
    }
    error_json(status, e.error_code(), &e.to_string())
}

fn query_error(e: QueryRejection) -> Response {
    error_json(StatusCode::BAD_REQUEST, "invalid_query", &e.body_text())
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Address parts shared by the subtitle, version and delete endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SubtitleQuery {
    pub title: Option<String>,
    pub season: Option<String>,
    pub episode: Option<u32>,
    pub version: Option<u32>,
    #[serde(default)]
    pub all: bool,
}

impl SubtitleQuery {
    fn season(&self) -> Option<&str> {
        non_blank(self.season.as_deref())
    }

    fn require_title(&self) -> Result<&str, LibraryError> {
        non_blank(self.title.as_deref()).ok_or_else(|| LibraryError::invalid("title is required"))
    }

    fn require_episode(&self) -> Result<u32, LibraryError> {
        self.episode
            .ok_or_else(|| LibraryError::invalid("episode is required"))
    }

    fn exact_version(&self) -> Result<(&str, u32, u32), LibraryError> {
        let version = self
            .version
            .ok_or_else(|| LibraryError::invalid("version is required"))?;
        Ok((self.require_title()?, self.require_episode()?, version))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Read handlers
// ---------------------------------------------------------------------------

/// `GET /api/v1/subtitles?title&season&episode&version`: one exact version.
pub async fn fetch_subtitle(
    State(state): State<AppState>,
    query: Result<Query<SubtitleQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return query_error(e),
    };
    let (title, episode, version) = match query.exact_version() {
        Ok(parts) => parts,
        Err(e) => return library_error(&e),
    };

    match state
        .library
        .fetch(title, query.season(), episode, version)
        .await
    {
        Ok(subtitle) => {
            let filename = subtitle.key.rsplit('/').next().unwrap_or(&subtitle.key);
            let mut headers = HeaderMap::new();
            insert_header(&mut headers, header::CONTENT_TYPE, &subtitle.content_type);
            insert_header(
                &mut headers,
                header::CACHE_CONTROL,
                &state.config.delivery.cache_control,
            );
            insert_header(
                &mut headers,
                header::CONTENT_DISPOSITION,
                &format!("inline; filename=\"{}\"", filename),
            );
            if !subtitle.etag.is_empty() {
                insert_header(&mut headers, header::ETAG, &subtitle.etag);
            }
            insert_header(
                &mut headers,
                HeaderName::from_static("x-subtitle-version"),
                &subtitle.version.to_string(),
            );
            insert_header(
                &mut headers,
                HeaderName::from_static("x-subtitle-uploaded-at"),
                &subtitle.uploaded_at.to_rfc3339(),
            );
            // Free-text sources may not be valid header values; skipped then.
            insert_header(
                &mut headers,
                HeaderName::from_static("x-subtitle-source"),
                &subtitle.source,
            );
            (StatusCode::OK, headers, subtitle.body).into_response()
        }
        Err(e) => library_error(&e),
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// `HEAD /api/v1/subtitles?title&season&episode`: 200 if any version exists.
pub async fn subtitle_exists(
    State(state): State<AppState>,
    query: Result<Query<SubtitleQuery>, QueryRejection>,
) -> StatusCode {
    let Ok(Query(query)) = query else {
        return StatusCode::BAD_REQUEST;
    };
    let (Ok(title), Ok(episode)) = (query.require_title(), query.require_episode()) else {
        return StatusCode::BAD_REQUEST;
    };

    match state.library.exists(title, query.season(), episode).await {
        Ok(true) => StatusCode::OK,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY),
    }
}

/// `GET /api/v1/versions?title&season&episode`: ascending version list.
pub async fn list_versions(
    State(state): State<AppState>,
    query: Result<Query<SubtitleQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return query_error(e),
    };
    let (title, episode) = match (query.require_title(), query.require_episode()) {
        (Ok(t), Ok(e)) => (t, e),
        (Err(e), _) | (_, Err(e)) => return library_error(&e),
    };

    match state
        .library
        .list_versions(title, query.season(), episode)
        .await
    {
        Ok(versions) => Json(versions).into_response(),
        Err(e) => library_error(&e),
    }
}

/// `GET /api/v1/catalog`: every show, season, episode and version.
pub async fn get_catalog(State(state): State<AppState>) -> Response {
    match state.library.catalog().await {
        Ok(built) => Json(built.catalog).into_response(),
        Err(e) => library_error(&e),
    }
}

// ---------------------------------------------------------------------------
// Write handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct DeleteResponse {
    deleted: usize,
    keys: Vec<String>,
}

/// `DELETE /api/v1/subtitles?title&season&episode&version&all`: delete by scope.
///
/// 200 with the removed keys; 500 `partial_delete` with both lists when some
/// objects could not be removed.
pub async fn delete_subtitles(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<SubtitleQuery>, QueryRejection>,
) -> Response {
    if let Err(resp) = authorize_write(&state, &headers) {
        return resp;
    }
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return query_error(e),
    };

    let scope = match CatalogScope::from_parts(
        query.title.as_deref(),
        query.season.as_deref(),
        query.episode,
        query.version,
        query.all,
    ) {
        Ok(scope) => scope,
        Err(e) => return library_error(&e),
    };

    match state.library.delete(&scope).await {
        Ok(report) if report.is_complete() => Json(DeleteResponse {
            deleted: report.count(),
            keys: report.deleted,
        })
        .into_response(),
        Ok(report) => {
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            (
                status,
                Json(serde_json::json!({
                    "error": "partial_delete",
                    "message": format!(
                        "deleted {} of {} objects in {}",
                        report.count(),
                        report.count() + report.failed.len(),
                        scope
                    ),
                    "status": status.as_u16(),
                    "deleted": report.deleted,
                    "failed": report.failed,
                })),
            )
                .into_response()
        }
        Err(e) => library_error(&e),
    }
}

/// Fields collected from an upload form.
#[derive(Default)]
struct UploadForm {
    title: Option<String>,
    season: Option<String>,
    source: Option<String>,
    episode: Option<String>,
    file: Option<(String, Bytes)>,
    is_archive: bool,
}

/// `POST /api/v1/subtitles`: multipart upload.
///
/// Text fields: `title`, optional `season`, `source`, `episode`. File field:
/// `file` for one subtitle, or `archive` for a zip (a `.zip` file name in
/// `file` is treated as an archive too). Returns 201 with the stored versions
/// and any archive entries skipped for lack of an episode number.
pub async fn upload_subtitles(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    if let Err(resp) = authorize_write(&state, &headers) {
        return resp;
    }

    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };

    let Some(title) = non_blank(form.title.as_deref()).map(str::to_string) else {
        return library_error(&LibraryError::invalid("title is required"));
    };
    let Some((filename, data)) = form.file else {
        return library_error(&LibraryError::invalid(
            "a 'file' or 'archive' field is required",
        ));
    };
    let season = non_blank(form.season.as_deref()).map(str::to_string);
    let source = non_blank(form.source.as_deref()).map(str::to_string);

    let result = if form.is_archive {
        state
            .library
            .upload_archive(ArchiveUpload {
                show: title,
                season,
                source,
                data,
            })
            .await
    } else {
        let episode = match non_blank(form.episode.as_deref()) {
            None => None,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) => Some(n),
                Err(_) => {
                    return library_error(&LibraryError::invalid(format!(
                        "episode '{}' is not a positive integer",
                        raw
                    )))
                }
            },
        };
        state
            .library
            .upload_subtitle(SubtitleUpload {
                show: title,
                season,
                episode,
                source,
                filename,
                data,
            })
            .await
            .map(|stored| ArchiveReport {
                uploaded: vec![stored],
                skipped: Vec::new(),
            })
    };

    match result {
        Ok(report) => {
            info!(
                uploaded = report.uploaded.len(),
                skipped = report.skipped.len(),
                "upload accepted"
            );
            (StatusCode::CREATED, Json(report)).into_response()
        }
        Err(e) => library_error(&e),
    }
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, Response> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => form.title = Some(read_text(field).await?),
            "season" => form.season = Some(read_text(field).await?),
            "source" => form.source = Some(read_text(field).await?),
            "episode" => form.episode = Some(read_text(field).await?),
            "file" | "archive" => {
                let filename = field.file_name().unwrap_or("upload.srt").to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                form.is_archive =
                    name == "archive" || filename.to_ascii_lowercase().ends_with(".zip");
                form.file = Some((filename, data));
            }
            other => debug!(field = other, "ignoring unknown upload field"),
        }
    }

    Ok(form)
}

async fn read_text(field: Field<'_>) -> Result<String, Response> {
    field.text().await.map_err(multipart_error)
}

fn multipart_error(e: MultipartError) -> Response {
    let status = e.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else {
        "invalid_multipart"
    };
    error_json(status, code, &e.body_text())
}

// ---------------------------------------------------------------------------
// Health endpoints
// ---------------------------------------------------------------------------

/// `GET /metrics`: Prometheus metrics endpoint.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    let metrics = state.metrics_handle.render();
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
        .into_response()
}

/// `GET /healthz`: Liveness probe.
pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime = state.start_time.elapsed().as_secs();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /readyz`: Readiness probe.
///
/// Lists a key under the catalog root that never exists to prove the store
/// answers, and reports whether the write gate is open.
pub async fn readyz(State(state): State<AppState>) -> Response {
    let mut checks = serde_json::Map::new();
    let mut all_ok = true;

    match state
        .library
        .store()
        .list_objects("shows/__health_check_nonexistent__/")
        .await
    {
        Ok(_) => {
            checks.insert(
                "storage".to_string(),
                serde_json::json!({"status": "ok", "backend": state.library.store().name()}),
            );
        }
        Err(e) => {
            all_ok = false;
            checks.insert(
                "storage".to_string(),
                serde_json::json!({"status": "error", "error": e.to_string()}),
            );
        }
    }

    let status = if all_ok { "ready" } else { "not_ready" };
    let http_status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(serde_json::json!({
            "status": status,
            "checks": checks,
            "auth_open_mode": state.gate.is_open_mode(),
        })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Write gate
// ---------------------------------------------------------------------------

/// Check the write secret with 401 vs 403 distinction.
///
/// - Header missing or not `Bearer <secret>` → 401 Unauthorized
/// - Secret not accepted → 403 Forbidden
/// - Accepted, or no secrets configured → proceed
fn authorize_write(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let secret = raw.and_then(|v| v.strip_prefix("Bearer "));

    match state.gate.check(secret) {
        TokenStatus::Valid => Ok(()),
        TokenStatus::Missing => {
            debug!(
                authorization = %redact_bearer_token(raw.unwrap_or("")),
                "write rejected: missing or malformed authorization header"
            );
            Err(error_json(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Missing or invalid Authorization header.",
            ))
        }
        TokenStatus::Forbidden => {
            debug!(
                secret = %Redacted::new(secret),
                "write rejected: secret not accepted"
            );
            Err(error_json(
                StatusCode::FORBIDDEN,
                "forbidden",
                "Invalid write secret.",
            ))
        }
    }
}
