//! Axum route handlers for resume intake and status polling.

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::analysis::{status, AnalysisSnapshot};
use crate::queue::AnalysisJob;
use crate::state::AppState;
use crate::storage::{sanitize_filename, upload_key};

const FILE_FIELD: &str = "file";
const JOB_DESCRIPTION_FIELD: &str = "job_description";

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: Uuid,
}

/// The two multipart fields an upload carries.
struct UploadForm {
    filename: String,
    contents: Bytes,
    job_description: String,
}

async fn read_upload_form(multipart: &mut Multipart) -> Result<UploadForm, AppError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut job_description: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let contents = field.bytes().await?;
                file = Some((filename, contents));
            }
            Some(JOB_DESCRIPTION_FIELD) => {
                job_description = Some(field.text().await?);
            }
            _ => {}
        }
    }

    let (filename, contents) =
        file.ok_or_else(|| AppError::Validation("missing multipart field 'file'".to_string()))?;
    let job_description = job_description.ok_or_else(|| {
        AppError::Validation("missing multipart field 'job_description'".to_string())
    })?;

    Ok(UploadForm {
        filename,
        contents,
        job_description,
    })
}

/// POST /upload
///
/// Creates the record, stores the file, queues the job, and returns the record id.
/// The worker picks it up from there; clients poll `GET /{id}`.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let form = read_upload_form(&mut multipart).await?;

    let file_id = Uuid::new_v4();
    let name = if form.filename.trim().is_empty() {
        sanitize_filename(&form.filename)
    } else {
        form.filename.clone()
    };

    state
        .records
        .create(file_id, &name, &form.job_description)
        .await?;

    if let Err(e) = store_and_enqueue(&state, file_id, form).await {
        if let Err(write_err) = state.records.fail(file_id, &e.to_string()).await {
            error!("Could not record intake failure for {file_id}: {write_err:?}");
        }
        return Err(e);
    }

    info!("Queued resume analysis {file_id} ({name})");

    Ok(Json(UploadResponse { file_id }))
}

async fn store_and_enqueue(
    state: &AppState,
    file_id: Uuid,
    form: UploadForm,
) -> Result<(), AppError> {
    let file_key = upload_key(file_id, &form.filename);
    state.blobs.put(&file_key, form.contents).await?;

    // Written before the push so it can never overwrite a status the worker has already set.
    state.records.set_status(file_id, status::QUEUED).await?;

    state
        .queue
        .enqueue(&AnalysisJob {
            file_id,
            file_key,
            job_description: form.job_description,
        })
        .await?;
    Ok(())
}

/// GET /:id
///
/// Returns the record as currently stored, whatever stage it has reached.
pub async fn handle_get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisSnapshot>, AppError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::Validation(format!("'{id}' is not a valid record id")))?;

    let record = state
        .records
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Record {id} not found")))?;

    Ok(Json(record))
}
