//! API Routes

use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::convert::Infallible;
use tower_http::services::ServeDir;

use crate::command_store::DEFAULT_REQUESTER;
use crate::error::Error;
use crate::event_bus::EventRecord;
use crate::ingest_coordinator::{resolve_device_id, DEFAULT_MOTION_MESSAGE};
use crate::models::{
    DeviceStatusResponse, FileListResponse, MotionAck, MotionReport, PhotoQuery, UnlockQueued,
    UnlockRequest, UnlockStatus, UploadResponse,
};
use crate::photo_log::DEFAULT_CAPACITY;
use crate::state::AppState;
use crate::subscription_session::SubscriptionSession;

/// Multipart framing allowance on top of the photo size limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let upload_prefix = normalize_prefix(&state.config.upload_url_prefix);
    let uploads = ServeDir::new(state.storage.dir());

    let router = Router::new()
        // Health & Status
        .route("/", get(super::root))
        .route("/healthz", get(super::health_check))
        // Unlock mailbox
        .route("/api/devices/:id", get(device_status))
        .route("/api/devices/:id/unlock", post(request_unlock))
        .route("/api/devices/:id/unlock_status", get(unlock_status))
        // Device events
        .route("/api/motion", post(report_motion))
        .route(
            "/upload",
            post(upload_photo).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Event stream
        .route("/motion", get(event_stream))
        .route("/api/events", get(event_stream))
        // History & files
        .route("/api/photos", get(list_photos))
        .route("/files", get(list_files));

    let router = if upload_prefix == "/" {
        router.fallback_service(uploads)
    } else {
        router.nest_service(&upload_prefix, uploads)
    };

    router.with_state(state)
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    format!("/{}", trimmed)
}

// ========================================
// Unlock Handlers
// ========================================

/// POST /api/devices/:id/unlock
async fn request_unlock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<UnlockRequest>>,
) -> impl IntoResponse {
    let requested_by = body
        .and_then(|Json(req)| req.user)
        .filter(|user| !user.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REQUESTER.to_string());

    state.commands.request_unlock(&id, &requested_by).await;

    Json(UnlockQueued {
        status: "queued".to_string(),
        device: id,
    })
}

/// GET /api/devices/:id - registry record and mailbox state, without consuming
async fn device_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let device = state.devices.get(&id).await?;
    let unlock = state.commands.state(&id).await;

    if device.is_none() && unlock.is_none() {
        return Err(Error::NotFound(format!("Device {} not found", id)));
    }

    Ok(Json(DeviceStatusResponse {
        device_id: id,
        device,
        unlock,
    }))
}

/// GET /api/devices/:id/unlock_status
async fn unlock_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let unlock = state.commands.poll_and_consume(&id).await;
    Json(UnlockStatus { unlock })
}

// ========================================
// Event Intake Handlers
// ========================================

/// POST /api/motion
async fn report_motion(
    State(state): State<AppState>,
    body: Option<Json<MotionReport>>,
) -> Result<impl IntoResponse, Error> {
    let report = body.map(|Json(report)| report).unwrap_or_default();

    let device_id = resolve_device_id(report.device_id.as_deref())?;
    let message = report
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MOTION_MESSAGE.to_string());

    let payload = state.ingest.report_motion(&device_id, &message).await;

    Ok(Json(MotionAck {
        status: "ok".to_string(),
        payload,
    }))
}

/// POST /upload (multipart, file under `photo`)
async fn upload_photo(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, Error> {
    let mut multipart = multipart.map_err(|e| Error::Validation(e.body_text()))?;
    let limit = state.ingest.max_upload_bytes();
    let to_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge { limit }
        } else {
            Error::Validation(e.body_text())
        }
    };

    let mut form_device_id = None;
    let mut photo = None;
    while let Some(field) = multipart.next_field().await.map_err(to_error)? {
        match field.name() {
            Some("photo") => {
                let hint = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(to_error)?;
                photo = Some((hint, data));
            }
            Some("device_id") => {
                form_device_id = Some(field.text().await.map_err(to_error)?);
            }
            _ => {}
        }
    }

    let (hint, data) = photo
        .ok_or_else(|| Error::Validation("No file uploaded. Use key \"photo\".".to_string()))?;

    let header_device_id = headers
        .get("x-device-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty());
    let device_id = resolve_device_id(header_device_id.or(form_device_id.as_deref()))?;

    let record = state
        .ingest
        .ingest_photo(&device_id, &data, hint.as_deref())
        .await?;

    match record {
        EventRecord::Photo {
            device_id,
            filename,
            url,
            timestamp,
        } => Ok(Json(UploadResponse {
            status: "ok".to_string(),
            device_id,
            filename,
            url,
            timestamp,
        })),
        other => Err(Error::Internal(format!(
            "unexpected {} record from photo ingest",
            other.kind()
        ))),
    }
}

// ========================================
// Event Stream Handler
// ========================================

/// GET /motion - server-push event stream
async fn event_stream(State(state): State<AppState>) -> impl IntoResponse {
    let (session, frames) =
        SubscriptionSession::open(state.bus.clone(), state.config.heartbeat_interval).await;

    tracing::debug!(subscriber_id = %session.id(), "Event stream opened");

    // Dropping the body (client gone) drops `frames`, which ends the session.
    let stream = futures::stream::unfold(frames, |mut frames| async move {
        frames
            .recv()
            .await
            .map(|frame| (Ok::<_, Infallible>(frame), frames))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
}

// ========================================
// History Handlers
// ========================================

/// GET /api/photos - newest first
async fn list_photos(
    State(state): State<AppState>,
    Query(query): Query<PhotoQuery>,
) -> Result<impl IntoResponse, Error> {
    let limit = query.limit.unwrap_or(DEFAULT_CAPACITY);
    let photos = state.photo_log.recent(limit).await?;
    Ok(Json(photos))
}

/// GET /files - upload directory listing
async fn list_files(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let files = state.storage.list().await?;
    Ok(Json(FileListResponse {
        count: files.len(),
        files,
    }))
}
