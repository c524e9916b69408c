use crate::config::Config;
use crate::extract;
use crate::reply::MultipartReply;
use crate::vision::{self, VisionClient, VisionError};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub vision: Arc<VisionClient>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
struct R { ok: bool, data: Option<serde_json::Value>, error: Option<String> }
impl R {
    fn ok<T: Serialize>(d: T) -> Json<R> { Json(R { ok: true, data: Some(serde_json::to_value(d).unwrap_or_default()), error: None }) }
}

pub fn build_router(state: AppState) -> Router {
    let upload_cap = state.config.server.max_upload_bytes;
    Router::new()
        .route("/recognize", post(recognize))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(upload_cap))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---- Status ----

async fn status(State(s): State<AppState>) -> impl IntoResponse {
    let uptime = (chrono::Utc::now() - s.started_at).num_seconds();
    R::ok(serde_json::json!({
        "model": s.vision.model_name(),
        "endpoint": s.config.vision.endpoint,
        "uptime_secs": uptime,
        "prompt_available": Path::new(&s.config.vision.prompt_path).exists(),
        "sample_photo_available": Path::new(&s.config.reply.sample_photo_path).exists(),
    }))
}

// ---- Recognize ----

struct Upload {
    bytes: Vec<u8>,
    declared_type: Option<String>,
}

async fn recognize(State(s): State<AppState>, mut form: Multipart) -> Response {
    let upload = match read_photo_field(&mut form).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return plain(StatusCode::BAD_REQUEST, "missing form file 'photo'"),
        Err(e) => {
            return plain(
                StatusCode::BAD_REQUEST,
                &format!("failed to parse multipart form: {}", e),
            )
        }
    };

    let mime = sniff_mime(&upload.bytes, upload.declared_type.as_deref());
    info!("recognize: {} byte upload ({})", upload.bytes.len(), mime);

    let prompt = match vision::load_prompt(Path::new(&s.config.vision.prompt_path)) {
        Ok(prompt) => prompt,
        Err(e) => {
            error!("failed to load prompt: {:#}", e);
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "server error: failed to load prompt");
        }
    };

    let envelope = match s.vision.identify(&prompt, &upload.bytes, &mime).await {
        Ok(envelope) => envelope,
        Err(VisionError::Upstream { status, body }) => {
            // hand the provider's own error body through
            error!("vision API error {}", status);
            return (
                StatusCode::BAD_GATEWAY,
                [(header::CONTENT_TYPE, "application/json".to_string())],
                body,
            )
                .into_response();
        }
        Err(e) => {
            error!("vision request failed: {}", e);
            return plain(StatusCode::BAD_GATEWAY, &format!("request to vision API failed: {}", e));
        }
    };

    let car_info = match extract::payload_from_response(&envelope) {
        Ok(clean) => clean,
        Err(e) => {
            // the full envelope matters here: failures usually mean the
            // provider changed its response contract
            error!(
                "payload extraction failed: {}; full response: {}",
                e,
                String::from_utf8_lossy(&envelope)
            );
            return plain(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("failed to parse model output: {}", e),
            );
        }
    };

    let sample_photo = match std::fs::read(&s.config.reply.sample_photo_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("failed to read sample photo: {}", e);
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "server error: cannot read sample photo");
        }
    };

    let mut reply = MultipartReply::new();
    reply.file_part("photo", "sample_photo.jpg", "image/jpeg", &sample_photo);
    reply.part("car_info", "application/json", &car_info);
    let (content_type, body) = reply.finish();

    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn read_photo_field(form: &mut Multipart) -> Result<Option<Upload>, MultipartError> {
    while let Some(field) = form.next_field().await? {
        if field.name() == Some("photo") {
            let declared_type = field.content_type().map(|t| t.to_string());
            let bytes = field.bytes().await?.to_vec();
            return Ok(Some(Upload { bytes, declared_type }));
        }
    }
    Ok(None)
}

/// Magic-byte sniff first (uploads lie about their type), the declared
/// part Content-Type second, octet-stream as the last resort.
pub fn sniff_mime(bytes: &[u8], declared: Option<&str>) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }
    declared
        .filter(|t| !t.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn plain(status: StatusCode, msg: &str) -> Response {
    (status, msg.to_string()).into_response()
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];

    #[test]
    fn test_sniff_beats_lying_declared_type() {
        assert_eq!(sniff_mime(JPEG_MAGIC, Some("text/plain")), "image/jpeg");
        assert_eq!(sniff_mime(PNG_MAGIC, Some("image/jpeg")), "image/png");
    }

    #[test]
    fn test_declared_type_used_when_sniff_fails() {
        assert_eq!(sniff_mime(b"not an image", Some("image/webp")), "image/webp");
    }

    #[test]
    fn test_octet_stream_fallback() {
        assert_eq!(sniff_mime(b"???", None), "application/octet-stream");
        assert_eq!(sniff_mime(b"???", Some("")), "application/octet-stream");
    }
}
