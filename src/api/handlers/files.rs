use crate::AppState;
use crate::api::error::AppError;
use crate::services::retrieval::StoredFile;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_util::io::ReaderStream;

#[derive(Clone, Copy)]
enum Disposition {
    Inline,
    Attachment,
}

#[utoipa::path(
    get,
    path = "/static/{workspace_id}/{filename}",
    params(
        ("workspace_id" = String, Path, description = "Workspace ID returned by /separate/"),
        ("filename" = String, Path, description = "Canonical stem name, e.g. vocals.wav")
    ),
    responses(
        (status = 200, description = "Stem audio stream"),
        (status = 400, description = "Invalid path"),
        (status = 404, description = "Stem not found")
    ),
    tag = "files"
)]
pub async fn serve_stem(
    State(state): State<AppState>,
    Path((workspace_id, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let stored = state.retrieval.fetch_stem(&workspace_id, &filename).await?;
    stream_file(stored, Disposition::Inline)
}

#[utoipa::path(
    get,
    path = "/download/{workspace_id}/{filename}",
    params(
        ("workspace_id" = String, Path, description = "Workspace ID returned by /separate/"),
        ("filename" = String, Path, description = "File inside the workspace")
    ),
    responses(
        (status = 200, description = "File download stream"),
        (status = 400, description = "Invalid path"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path((workspace_id, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let stored = state.retrieval.fetch(&workspace_id, &filename).await?;
    tracing::info!("📎 Download {}/{}", workspace_id, stored.filename);
    stream_file(stored, Disposition::Attachment)
}

fn stream_file(stored: StoredFile, disposition: Disposition) -> Result<Response, AppError> {
    let (content_type, content_disposition) = resolve_file_headers(&stored.filename, disposition);
    let body = Body::from_stream(ReaderStream::new(stored.file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .header(header::CONTENT_LENGTH, stored.size)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build file response: {}", e)))
}

fn resolve_file_headers(filename: &str, disposition: Disposition) -> (String, String) {
    let extension = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    let content_type = match extension.as_str() {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "flac" => Some("audio/flac"),
        "ogg" | "oga" | "opus" => Some("audio/ogg"),
        "m4a" | "aac" => Some("audio/aac"),
        "aif" | "aiff" => Some("audio/aiff"),
        "webm" => Some("audio/webm"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
    .map(str::to_string)
    .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file"
    } else {
        &ascii_filename
    };
    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    let disposition_type = match disposition {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };

    (
        content_type,
        format!(
            "{}; filename=\"{}\"; filename*=UTF-8''{}",
            disposition_type, fallback_filename, encoded_filename
        ),
    )
}
