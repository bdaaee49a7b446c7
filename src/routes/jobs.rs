use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use garde::Validate;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{AnimationSettings, Job, JobSpec, JobStats};
use crate::models::submission::{
    require_motion_prompt, ClearQuery, DownloadResponse, QueueResponse, SubmitJobRequest,
    SubmitJobResponse,
};
use crate::services::download::DownloadError;

/// GET /api/v1/jobs — every job in queue order plus aggregate counts.
pub async fn list_jobs(State(state): State<AppState>) -> Json<QueueResponse> {
    let jobs = state.store.get_all().await;
    let stats = JobStats::from_jobs(&jobs);
    Json(QueueResponse {
        jobs,
        stats,
        processing: state.processor.is_processing(),
    })
}

/// GET /api/v1/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<JobStats> {
    Json(state.store.get_stats().await)
}

/// POST /api/v1/jobs — queue a sprite given by URL or data URI.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let spec: JobSpec = request.into();
    let job_id = state.store.add_job(spec).await;

    Ok((StatusCode::CREATED, Json(submitted(job_id))))
}

/// POST /api/v1/jobs/upload — queue an uploaded sprite file.
///
/// The `image` part carries the file; every other text part becomes an
/// animation setting.
pub async fn upload_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let mut image: Option<(String, Option<String>)> = None;
    let mut image_name: Option<String> = None;
    let mut settings = AnimationSettings::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                image = Some((to_data_uri(&data)?, file_name));
            }
            "image_name" => {
                image_name = Some(field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?);
            }
            "" => {}
            _ => {
                let value = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                settings.insert(name, Value::String(value));
            }
        }
    }

    let (image, file_name) = image.ok_or_else(|| ApiError::BadRequest("image part is required".to_string()))?;
    require_motion_prompt(&settings, &()).map_err(|e| ApiError::Validation(e.to_string()))?;

    let job_id = state
        .store
        .add_job(JobSpec {
            image,
            image_preview: None,
            image_name: image_name.or(file_name),
            settings,
        })
        .await;

    Ok((StatusCode::CREATED, Json(submitted(job_id))))
}

/// DELETE /api/v1/jobs?only_completed=true
pub async fn clear_jobs(State(state): State<AppState>, Query(query): Query<ClearQuery>) -> StatusCode {
    state.store.clear_jobs(query.only_completed).await;
    StatusCode::NO_CONTENT
}

/// DELETE /api/v1/jobs/{id}
pub async fn remove_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    state.store.remove_job(id).await;
    StatusCode::NO_CONTENT
}

/// PATCH /api/v1/jobs/{id}/settings — merge new settings into a job.
pub async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(partial): Json<AnimationSettings>,
) -> Result<Json<Job>, ApiError> {
    state.store.update_job_settings(id, partial).await;
    state.store.get(id).await.map(Json).ok_or(ApiError::NotFound)
}

/// POST /api/v1/jobs/{id}/retry — reset a failed job and run it right away.
pub async fn retry_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    if !state.processor.retry_job(id).await {
        return match state.store.get(id).await {
            Some(job) => Err(ApiError::Conflict(format!("job is {}, only failed jobs can be retried", job.status))),
            None => Err(ApiError::NotFound),
        };
    }

    let processor = state.processor.clone();
    tokio::spawn(async move {
        processor.process_single(id).await;
    });
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/queue/process — start a batch run in the background.
pub async fn process_all(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if state.processor.is_processing() {
        return Err(ApiError::Conflict("a batch is already running".to_string()));
    }

    let processor = state.processor.clone();
    tokio::spawn(async move {
        processor.process_all().await;
    });
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/queue/cancel — stop the batch after the job in flight.
pub async fn cancel_processing(State(state): State<AppState>) -> StatusCode {
    state.processor.cancel_processing();
    StatusCode::ACCEPTED
}

/// POST /api/v1/jobs/{id}/frames — save the frames of one finished job.
pub async fn download_frames(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let job = state.store.get(id).await.ok_or(ApiError::NotFound)?;
    let files = state.downloader.download_frames(&job).await?;
    Ok(Json(to_response(files)))
}

/// POST /api/v1/results/download — save every finished spritesheet.
pub async fn download_results(State(state): State<AppState>) -> Result<Json<DownloadResponse>, ApiError> {
    let jobs = state.store.get_all().await;
    let files = state.downloader.download_sheets(&jobs).await?;
    Ok(Json(to_response(files)))
}

fn submitted(job_id: Uuid) -> SubmitJobResponse {
    SubmitJobResponse {
        job_id,
        status: crate::models::job::JobStatus::Pending,
    }
}

fn to_response(files: Vec<std::path::PathBuf>) -> DownloadResponse {
    DownloadResponse {
        files: files.iter().map(|p| p.display().to_string()).collect(),
    }
}

/// Sniff the uploaded bytes and wrap them as a data URI.
fn to_data_uri(data: &[u8]) -> Result<String, ApiError> {
    let format = image::guess_format(data).map_err(|_| ApiError::UnsupportedMedia)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    Ok(format!("data:{};base64,{}", format.to_mime_type(), encoded))
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Job not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Unsupported image format")]
    UnsupportedMedia,

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Download(DownloadError::MissingResult(_)) => StatusCode::CONFLICT,
            ApiError::Download(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri_from_png_bytes() {
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::new_rgba8(2, 2)
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();

        let uri = to_data_uri(png.get_ref()).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_data_uri_rejects_non_image() {
        assert!(matches!(
            to_data_uri(b"definitely not an image"),
            Err(ApiError::UnsupportedMedia)
        ));
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Validation("motion_prompt is required".to_string())
                .into_response()
                .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
