//! Upload handler
//!
//! POST /api/upload: validate → stage → convert → verify → respond → schedule cleanup

use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::staging::{has_accepted_extension, sanitize_file_name, StagedUpload};
use crate::AppState;

/// Media type of the generated deck
pub const PPTX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Multipart field carrying the Markdown file
pub const FILE_FIELD: &str = "file";

/// The `file` part of the multipart form
struct UploadedFile {
    file_name: Option<String>,
    bytes: Bytes,
}

/// POST /api/upload
pub async fn upload_markdown(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let upload = read_file_field(&mut multipart)
        .await?
        .filter(|upload| !upload.bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;

    let file_name = upload
        .file_name
        .as_deref()
        .and_then(sanitize_file_name)
        .ok_or_else(|| ApiError::BadRequest("Uploaded file has no usable name".to_string()))?;

    if !has_accepted_extension(&file_name) {
        return Err(ApiError::UnsupportedMediaType(
            "Invalid file type. Please upload a Markdown (.md) file.".to_string(),
        ));
    }

    let staged = StagedUpload::plan(&state.upload_dir, &file_name);

    // Runs detached so a client disconnect cannot drop the pipeline between
    // staging and scheduling cleanup.
    let pipeline = tokio::spawn(stage_and_convert(state, staged, upload.bytes));
    let result = pipeline.await.unwrap_or_else(|e| {
        error!(file = %file_name, error = %e, "Upload pipeline task failed");
        Err(ApiError::Internal(format!("Error generating PPTX: {}", e)))
    });

    if let Err(ref e) = result {
        warn!(file = %file_name, status = %e.status(), error = %e, "Upload failed");
    }
    result
}

/// Stage the upload, convert it, and always schedule cleanup of both paths
async fn stage_and_convert(
    state: AppState,
    staged: StagedUpload,
    bytes: Bytes,
) -> ApiResult<Response> {
    // A pending deletion from an earlier upload of the same name must not
    // remove the files this request is about to create.
    for path in staged.paths() {
        state.cleanup.cancel(&path).await;
    }

    let result = match staged.write_input(&bytes).await {
        Ok(()) => {
            info!(
                file = %staged.file_name,
                input = %staged.input_path.display(),
                bytes = bytes.len(),
                "Staged upload"
            );
            convert_and_respond(&state, &staged).await
        }
        Err(e) => {
            error!(file = %staged.file_name, error = %e, "Failed to stage upload");
            Err(ApiError::Internal(format!("Error generating PPTX: {}", e)))
        }
    };

    // Scheduled after the response body is opened; an open file handle keeps
    // streaming on unix even if the timer fires first.
    state.cleanup.schedule(staged.paths()).await;
    result
}

async fn convert_and_respond(state: &AppState, staged: &StagedUpload) -> ApiResult<Response> {
    let outcome = state
        .converter
        .convert(&staged.input_path, &staged.output_path)
        .await?;

    info!(
        file = %staged.file_name,
        output = %staged.output_path.display(),
        status = %outcome.status,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "Converter finished"
    );

    if !staged.output_exists().await {
        return Err(ApiError::Conflict("PPTX file was not generated.".to_string()));
    }

    let file = tokio::fs::File::open(&staged.output_path).await?;
    let length = file.metadata().await?.len();

    let disposition = HeaderValue::from_bytes(
        format!("attachment; filename={}", staged.download_name()).as_bytes(),
    )
    .map_err(|e| ApiError::Internal(format!("Invalid download file name: {}", e)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(PPTX_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// Read the form, keeping the first `file` part and ignoring other fields
async fn read_file_field(multipart: &mut Multipart) -> ApiResult<Option<UploadedFile>> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if upload.is_some() || field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some(UploadedFile { file_name, bytes });
    }

    Ok(upload)
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/api/upload", post(upload_markdown))
}
