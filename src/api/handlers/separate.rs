use crate::AppState;
use crate::api::error::AppError;
use crate::utils::validation::sanitize_upload_filename;
use axum::{
    Json,
    extract::{Multipart, State},
};
use futures::TryStreamExt;
use serde::Serialize;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct SeparateResponse {
    /// Workspace holding the upload and its stems
    pub user_id: String,
    /// Public stem URLs rooted at `/static/`
    pub files: Vec<String>,
}

/// Multipart body accepted by `/separate/`
#[derive(ToSchema)]
pub struct SeparateForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[utoipa::path(
    post,
    path = "/separate/",
    request_body(content = SeparateForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Stems generated", body = SeparateResponse),
        (status = 400, description = "Malformed upload"),
        (status = 413, description = "Upload too large"),
        (status = 500, description = "Storage or engine failure"),
        (status = 504, description = "Separation timed out")
    ),
    tag = "separation"
)]
pub async fn separate_audio(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SeparateResponse>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let original_filename = field
            .file_name()
            .ok_or_else(|| AppError::BadRequest("File field has no filename".to_string()))?
            .to_string();
        let filename = sanitize_upload_filename(&original_filename)?;

        let reader = StreamReader::new(field.map_err(std::io::Error::other));
        let outcome = state.separation.run(&filename, reader).await?;

        tracing::info!(
            "📦 Workspace {} ready with {} stem(s)",
            outcome.workspace_id,
            outcome.stems.len()
        );

        return Ok(Json(SeparateResponse {
            user_id: outcome.workspace_id.to_string(),
            files: outcome.urls(),
        }));
    }

    Err(AppError::BadRequest("No file provided".to_string()))
}
