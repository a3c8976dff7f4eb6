//! HTTP transport.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `POST` | `/convert` | multipart upload (`file`, optional `format`) → [`ConversionResult`] |
//! | `GET`  | `/download/{*path}` | stored artifact as an attachment |
//! | `GET`  | `/health` | [`HealthReport`] |
//!
//! [`serve`] runs the router until a shutdown future resolves, then walks the
//! shutdown sequence: stop accepting connections, tell the expiry scheduler to
//! stop, give in-flight requests a grace period, and finally wait (bounded)
//! for the scheduler to acknowledge.

use crate::convert::{ConversionRequest, ConversionService, RequestOrigin};
use crate::error::DocConvError;
use crate::expiry::{ExpiryHandle, ShutdownOutcome};
use crate::mime;
use crate::output::{ConversionResult, ErrorBody, HealthReport};
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Time in-flight requests get after the listener stops accepting.
pub const SERVER_GRACE: Duration = Duration::from_secs(5);

/// Time the expiry scheduler gets to acknowledge the stop signal.
pub const SCHEDULER_GRACE: Duration = Duration::from_secs(3);

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct AppState {
    pub service: Arc<ConversionService>,
}

impl AppState {
    pub fn new(service: Arc<ConversionService>) -> Self {
        Self { service }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors a handler can return.
#[derive(Debug)]
pub enum ApiError {
    Service(DocConvError),
    Multipart(MultipartError),
}

impl From<DocConvError> for ApiError {
    fn from(e: DocConvError) -> Self {
        ApiError::Service(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Multipart(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Service(e) => {
                let status =
                    StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    error!(error = %e, details = ?e.details(), "Request failed");
                }
                (status, ErrorBody::from(&e))
            }
            ApiError::Multipart(e) => (
                e.status(),
                ErrorBody {
                    error: "Invalid upload".to_string(),
                    details: Some(e.body_text()),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.service.config().max_content_length;
    Router::new()
        .route("/convert", post(convert_handler))
        .route("/download/{*path}", get(download_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn convert_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ConversionResult>, ApiError> {
    let mut upload: Option<(String, Bytes)> = None;
    let mut format: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                upload = Some((filename, data));
            }
            Some("format") => format = Some(field.text().await?),
            _ => {}
        }
    }

    let (filename, data) = upload.ok_or(DocConvError::MissingFile)?;
    let origin = request_origin(&headers, &state.service.config().address());
    let request = ConversionRequest {
        reader: &data[..],
        filename,
        format,
    };
    let result = state.service.convert(request, &origin).await?;
    Ok(Json(result))
}

async fn download_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = state.service.resolve_download(&path).await?;
    let content_type = mime::detect(&resolved.path).await;
    let bytes = tokio::fs::read(&resolved.path)
        .await
        .map_err(|e| DocConvError::Internal(format!("Failed to read '{path}': {e}")))?;

    info!(
        path = %resolved.path.display(),
        bytes = resolved.len,
        content_type,
        "Serving download"
    );

    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&resolved.file_name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    let service = &state.service;
    let config = service.config();
    let availability = service.availability();
    Json(HealthReport {
        status: if availability.is_available() {
            "ok"
        } else {
            "degraded"
        }
        .to_string(),
        libreoffice: if availability.is_available() {
            "available"
        } else {
            "unavailable"
        }
        .to_string(),
        version: availability.version().to_string(),
        data_dir: config.data_dir.display().to_string(),
        file_expiry_hours: config.expiry.hours(),
        port: config.port,
    })
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Scheme and host as the client saw them.
pub fn request_origin(headers: &HeaderMap, fallback_host: &str) -> RequestOrigin {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or(fallback_host);
    let secure = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false);
    RequestOrigin::new(secure, host)
}

/// `attachment` disposition with an ASCII fallback name and an RFC 5987
/// `filename*` for everything else.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if fallback == file_name {
        format!("attachment; filename=\"{file_name}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(file_name)
        )
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
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
}

// ── Serve + shutdown ─────────────────────────────────────────────────────────

/// How the shutdown sequence went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub server: ShutdownOutcome,
    /// `None` when no scheduler was running.
    pub scheduler: Option<ShutdownOutcome>,
}

/// Serve `state` on `listener` until `shutdown` resolves, then shut down in
/// order. Returns an error if the server stopped on its own.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    mut scheduler: Option<ExpiryHandle>,
    shutdown: F,
) -> Result<ShutdownReport, DocConvError>
where
    F: Future<Output = ()> + Send,
{
    let app = build_router(state);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown => {
            info!("Shutdown signal received");
        }
        result = &mut server => {
            if let Some(handle) = scheduler.take() {
                handle.shutdown(SCHEDULER_GRACE).await;
            }
            let reason = match result {
                Ok(Ok(())) => "server stopped unexpectedly".to_string(),
                Ok(Err(e)) => format!("server error: {e}"),
                Err(e) => format!("server task failed: {e}"),
            };
            return Err(DocConvError::Internal(reason));
        }
    }

    // 1. Stop accepting; in-flight requests keep running.
    let _ = stop_tx.send(());

    // 2. Tell the scheduler to stop after its current tick.
    if let Some(handle) = scheduler.as_mut() {
        handle.signal_stop();
    }

    // 3. Grace period for in-flight requests.
    let server_outcome = match tokio::time::timeout(SERVER_GRACE, &mut server).await {
        Ok(Ok(Ok(()))) => ShutdownOutcome::Completed,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "Server reported an error while shutting down");
            ShutdownOutcome::Completed
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Server task ended abnormally");
            ShutdownOutcome::Completed
        }
        Err(_) => {
            warn!(
                grace_secs = SERVER_GRACE.as_secs(),
                "In-flight requests did not finish in time"
            );
            server.abort();
            ShutdownOutcome::TimedOut
        }
    };

    // 4. Bounded wait for the scheduler.
    let scheduler_outcome = match scheduler.as_mut() {
        Some(handle) => Some(handle.join(SCHEDULER_GRACE).await),
        None => None,
    };

    info!(
        server = ?server_outcome,
        scheduler = ?scheduler_outcome,
        "Service stopped"
    );
    Ok(ShutdownReport {
        server: server_outcome,
        scheduler: scheduler_outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("docs.example.com"));
        let origin = request_origin(&headers, "0.0.0.0:15000");
        assert_eq!(origin, RequestOrigin::new(false, "docs.example.com"));

        headers.insert("x-forwarded-proto", HeaderValue::from_static("HTTPS"));
        assert!(request_origin(&headers, "x").secure);

        let origin = request_origin(&HeaderMap::new(), "0.0.0.0:15000");
        assert_eq!(origin.host, "0.0.0.0:15000");
    }

    #[test]
    fn disposition_ascii_and_unicode() {
        assert_eq!(
            content_disposition("report_1.pdf"),
            "attachment; filename=\"report_1.pdf\""
        );
        let d = content_disposition("报告_1.pdf");
        assert!(d.starts_with("attachment; filename=\"___1.pdf\"; filename*=UTF-8''"), "{d}");
        assert!(d.ends_with("_1.pdf"));
    }
}
