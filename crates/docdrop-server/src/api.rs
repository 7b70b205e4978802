use crate::error::ServiceError;
use crate::service::DocService;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use docdrop_store::SweeperStats;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeader;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_url: String,
    /// The client's original filename.
    pub file_name: String,
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertRequest {
    #[serde(rename = "fileId", default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertResponse {
    pub success: bool,
    pub html: String,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Clone)]
pub struct DocApi {
    service: Arc<DocService>,
    sweeper_stats: Option<watch::Receiver<SweeperStats>>,
}

impl DocApi {
    pub fn new(service: Arc<DocService>) -> Self {
        Self {
            service,
            sweeper_stats: None,
        }
    }

    /// Exposes a running sweeper's totals on `/metrics`.
    pub fn with_sweeper_stats(mut self, stats: watch::Receiver<SweeperStats>) -> Self {
        self.sweeper_stats = Some(stats);
        self
    }

    pub fn router(self: Arc<Self>) -> Router {
        let config = self.service.config().clone();
        let uploads = SetResponseHeader::overriding(
            ServeDir::new(self.service.store().root()),
            header::CONTENT_SECURITY_POLICY,
            crate::security::upload_content_policy(),
        );

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/upload", post(upload_handler))
            .route("/convert-word", post(convert_handler))
            .route("/files/:id", delete(delete_handler))
            .nest_service("/uploads", uploads)
            .layer(DefaultBodyLimit::max(config.body_limit()));

        if config.static_dir.is_dir() {
            router = router.fallback_service(ServeDir::new(&config.static_dir));
        } else {
            tracing::debug!("Static directory {} not found, serving API only", config.static_dir.display());
        }

        router
            .layer(axum::middleware::from_fn(
                crate::security::security_headers_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    /// Serves until `shutdown` is cancelled, then drains open connections.
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let addr = self.service.config().bind_addr;
        let router = Arc::new(self).router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("docdrop listening on {}", addr);

        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn multipart_error(err: MultipartError, limit: u64) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge { limit }
    } else {
        ServiceError::NoInput(format!("Malformed upload: {}", err.body_text()))
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_handler(State(state): State<Arc<DocApi>>) -> impl IntoResponse {
    let sweeper = state.sweeper_stats.as_ref().map(|rx| *rx.borrow());
    let output = state.service.metrics().render_prometheus(sweeper.as_ref());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        output,
    )
}

async fn upload_handler(
    State(state): State<Arc<DocApi>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ServiceError> {
    let limit = state.service.config().max_upload_bytes;
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!(error = %e, "upload without multipart body");
        ServiceError::NoInput("No files were uploaded.".to_string())
    })?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let chunks = field.map_err(move |e| multipart_error(e, limit));
        let receipt = state.service.handle_upload(&original_name, chunks).await?;

        return Ok(Json(UploadResponse {
            success: true,
            file_url: receipt.file_url,
            file_name: receipt.original_name,
            id: receipt.id.to_string(),
        }));
    }

    Err(ServiceError::NoInput("No files were uploaded.".to_string()))
}

async fn convert_handler(
    State(state): State<Arc<DocApi>>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Json<ConvertResponse>, ServiceError> {
    let Json(request) = payload.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServiceError::PayloadTooLarge {
                limit: state.service.config().max_upload_bytes,
            }
        } else {
            ServiceError::NoInput(format!("Invalid request body: {}", e.body_text()))
        }
    })?;

    let file_id = request.file_id.unwrap_or_default();
    let doc = state.service.handle_convert(&file_id).await?;
    Ok(Json(ConvertResponse {
        success: true,
        html: doc.html,
        messages: doc.messages,
    }))
}

async fn delete_handler(
    State(state): State<Arc<DocApi>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let id = state.service.handle_delete(&id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "id": id
    })))
}
