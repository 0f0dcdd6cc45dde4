use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use extguard_core::metrics::{MetricsSnapshot, MetricsStore};
use extguard_core::types::{
    CustomAddRequest, CustomExtension, FixedExtension, FixedToggleRequest, PolicyInfo,
    UploadVerdict,
};
use extguard_core::{ApiResponse, PolicyError, PolicyStore, UploadJudge, UploadRecord, UploadRequest};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::pages;

#[derive(Clone)]
pub struct AppState {
    /// Expected to be an [`ObservedPolicyStore`] so mutations are audited and counted.
    ///
    /// [`ObservedPolicyStore`]: extguard_core::ObservedPolicyStore
    pub policy: Arc<dyn PolicyStore>,
    pub judge: Arc<dyn UploadJudge>,
    /// Configured fixed names, reported by `GET /api/policy`.
    pub fixed_configured: Arc<Vec<String>>,
    /// If set, all mutating endpoints require `Authorization: Bearer <token>`
    pub auth_token: Option<String>,
    pub metrics: Arc<MetricsStore>,
}

pub struct Gateway {
    state: AppState,
    port: u16,
    max_upload_bytes: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Failure response: HTTP status plus the standard envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiResponse<()>,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ApiResponse::failure(PolicyError::Server {
                message: "unauthorized".to_string(),
            }),
        }
    }

    /// Keeps the extractor's status, so an oversized body is a 413.
    fn multipart(err: MultipartError) -> Self {
        Self {
            status: err.status(),
            body: ApiResponse {
                success: false,
                message: Some(err.body_text()),
                data: None,
                error: None,
            },
        }
    }

    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ApiResponse {
                success: false,
                message: Some(message.to_string()),
                data: None,
                error: None,
            },
        }
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            body: ApiResponse::failure(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

impl Gateway {
    pub fn new(state: AppState, port: u16, max_upload_bytes: usize) -> Self {
        Self {
            state,
            port,
            max_upload_bytes,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone(), self.max_upload_bytes)
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let app = self.router();

        // Security: bind to localhost-only if no auth token configured
        let addr = if self.state.auth_token.is_some() {
            SocketAddr::from(([0, 0, 0, 0], self.port))
        } else {
            warn!("No server auth token configured — binding to 127.0.0.1 only");
            SocketAddr::from(([127, 0, 0, 1], self.port))
        };

        info!("Extension policy server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/index", get(index_page))
        .route("/block", get(block_page))
        .route("/upload-test", get(upload_test_page))
        .route("/health", get(health_check))
        .route("/api/policy", get(get_policy))
        .route("/api/fixed", get(get_fixed))
        .route("/api/fixed/toggle", patch(toggle_fixed))
        .route("/api/custom", get(get_custom).post(add_custom))
        .route("/api/custom/:extension", delete(delete_custom))
        .route(
            "/api/upload-test",
            post(upload_test).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/upload-history", get(upload_history))
        .route("/api/monitor/metrics", get(get_metrics))
        .with_state(state)
}

/// Verify the Authorization header against the configured token.
fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected_token) = &state.auth_token else {
        // No auth configured = local-only, all requests allowed
        return Ok(());
    };

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let provided_token = auth_header.strip_prefix("Bearer ").unwrap_or("");

    if provided_token == expected_token {
        Ok(())
    } else {
        warn!("Unauthorized policy change attempt");
        Err(ApiError::unauthorized())
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/policy
async fn get_policy(State(state): State<AppState>) -> ApiResult<PolicyInfo> {
    let limits = state.policy.limits().await?;
    Ok(Json(ApiResponse::ok(
        "policy",
        PolicyInfo {
            max_extension_length: limits.max_extension_length,
            max_custom_extensions: limits.max_custom_extensions,
            fixed_configured: state.fixed_configured.as_ref().clone(),
        },
    )))
}

/// GET /api/fixed
async fn get_fixed(State(state): State<AppState>) -> ApiResult<Vec<FixedExtension>> {
    let fixed = state.policy.fixed_state().await?;
    Ok(Json(ApiResponse::ok("fixed extensions", fixed)))
}

/// PATCH /api/fixed/toggle
async fn toggle_fixed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FixedToggleRequest>,
) -> ApiResult<()> {
    check_auth(&state, &headers)?;

    state
        .policy
        .set_fixed_blocked(&req.extension, req.blocked)
        .await?;
    Ok(Json(ApiResponse::done("status updated")))
}

/// GET /api/custom
async fn get_custom(State(state): State<AppState>) -> ApiResult<Vec<CustomExtension>> {
    let custom = state
        .policy
        .list_custom()
        .await?
        .into_iter()
        .map(|extension| CustomExtension { extension })
        .collect();
    Ok(Json(ApiResponse::ok("custom extensions", custom)))
}

/// POST /api/custom
async fn add_custom(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CustomAddRequest>,
) -> ApiResult<CustomExtension> {
    check_auth(&state, &headers)?;

    let extension = state.policy.add_custom(&req.extension).await?;
    Ok(Json(ApiResponse::ok("added", CustomExtension { extension })))
}

/// DELETE /api/custom/:extension
async fn delete_custom(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(extension): Path<String>,
) -> ApiResult<()> {
    check_auth(&state, &headers)?;

    state.policy.remove_custom(&extension).await?;
    Ok(Json(ApiResponse::done("deleted")))
}

/// POST /api/upload-test — multipart `title` and `file`
async fn upload_test(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<UploadVerdict> {
    let mut title = String::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::multipart)?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("title") => {
                title = field
                    .text()
                    .await
                    .map_err(ApiError::multipart)?;
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(ApiError::multipart)?;
                file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let Some((file_name, bytes)) = file.filter(|(name, _)| !name.is_empty()) else {
        return Err(ApiError::bad_request("no file selected"));
    };

    info!("Upload test: '{}' ({} bytes, title: {:?})", file_name, bytes.len(), title);
    let record = state
        .judge
        .judge(&UploadRequest {
            title,
            file_name,
            bytes,
        })
        .await?;

    let message = if record.allowed {
        "upload test: allowed"
    } else {
        "upload test: blocked"
    };
    Ok(Json(ApiResponse::ok(message, UploadVerdict::from(&record))))
}

/// GET /api/upload-history
async fn upload_history(State(state): State<AppState>) -> ApiResult<Vec<UploadRecord>> {
    let recent = state.judge.recent().await?;
    Ok(Json(ApiResponse::ok("recent uploads", recent)))
}

async fn get_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MetricsSnapshot>, ApiError> {
    check_auth(&state, &headers)?;
    Ok(Json(state.metrics.snapshot()))
}

async fn index_page() -> Html<String> {
    Html(pages::render_index())
}

async fn block_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let policy = state.policy.snapshot().await?;
    Ok(Html(pages::render_block_page(&policy)))
}

async fn upload_test_page(State(state): State<AppState>) -> Html<String> {
    // The page still renders when history is unavailable, just with an empty table.
    let recent = match state.judge.recent().await {
        Ok(recent) => recent,
        Err(e) => {
            warn!("Failed to load upload history for page: {}", e);
            Vec::new()
        }
    };
    Html(pages::render_upload_page(&recent))
}
