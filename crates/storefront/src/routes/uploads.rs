//! Design file uploads.
//!
//! Files land under `temp/{upload_session}/` and stay there until an order
//! claims them. Each stored name is sanitized and prefixed with a random tag.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::session::upload_session;
use crate::services::assets::TEMP_PREFIX;
use crate::state::AppState;

/// Upper bound on a whole upload request.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Longest stored file name, before the random tag.
const MAX_NAME_LEN: usize = 64;

/// One stored file.
#[derive(Debug, Serialize)]
pub struct UploadedAsset {
    /// Storage key to send back with the cart line or checkout.
    pub key: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub assets: Vec<UploadedAsset>,
}

/// Reduce a client file name to `[A-Za-z0-9._-]`.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    let start = trimmed.len().saturating_sub(MAX_NAME_LEN);

    match trimmed.get(start..) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "design".to_string(),
    }
}

/// Store every image field of a multipart request.
#[instrument(skip_all)]
pub async fn upload(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let folder = format!("{TEMP_PREFIX}/{}", upload_session(&session).await?);
    let mut assets = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let is_image = field
            .content_type()
            .is_some_and(|content_type| content_type.starts_with("image/"));
        if !is_image {
            return Err(AppError::BadRequest("Only image files can be uploaded".to_string()));
        }

        let name = sanitize_file_name(field.file_name().unwrap_or_default());
        let tag = Uuid::new_v4().simple().to_string();
        let key = format!("{folder}/{}-{name}", &tag[..8]);

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Empty file".to_string()));
        }

        state.assets().put(&key, &bytes).await?;
        info!(key = %key, bytes = bytes.len(), "Design file stored");

        assets.push(UploadedAsset {
            url: format!("/assets/{key}"),
            key,
        });
    }

    if assets.is_empty() {
        return Err(AppError::BadRequest("No files uploaded".to_string()));
    }

    Ok((StatusCode::CREATED, Json(UploadResponse { assets })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};

    use super::*;
    use crate::routes::test_support::{TestApp, body_json, empty_request};

    const BOUNDARY: &str = "cfboundary7MA4YWxk";

    fn multipart_request(file_name: &str, content_type: &str, data: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n{data}\r\n--{BOUNDARY}--\r\n"
        );
        Request::post("/api/uploads")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("mặt trước.png"), "m-t-tr--c.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\.hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "design");
        assert_eq!(sanitize_file_name(&"a".repeat(100)).len(), MAX_NAME_LEN);
    }

    #[tokio::test]
    async fn test_upload_stores_under_session_folder() {
        let app = TestApp::new();

        let response = app
            .send(multipart_request("front.png", "image/png", "not-really-png"))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        let key = body["assets"][0]["key"].as_str().unwrap();
        assert!(key.starts_with("temp/"));
        assert!(key.ends_with("-front.png"));
        assert!(app.state.assets().exists(key).await.unwrap());

        let served = app
            .send(empty_request("GET", body["assets"][0]["url"].as_str().unwrap()))
            .await;
        assert_eq!(served.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_images() {
        let app = TestApp::new();
        let response = app
            .send(multipart_request("notes.txt", "text/plain", "hello"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
