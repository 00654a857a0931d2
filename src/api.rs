use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::auth::SharedState;
use crate::engine::TaskPage;
use crate::error::ServiceError;
use crate::models::{Caller, NewTask, Task};
use crate::query::RawQuery;
use crate::uploads::IncomingFile;

/// Multipart field that carries attachments.
const DOCUMENTS_FIELD: &str = "documents";

// GET /
pub async fn index() -> Json<Value> {
    Json(json!({ "message": "Task Manager API is running!" }))
}

// GET /api/tasks
pub async fn list_tasks(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Query(raw): Query<RawQuery>,
) -> Result<Json<TaskPage>, ServiceError> {
    Ok(Json(state.engine.list(&caller, &raw)?))
}

// POST /api/tasks
pub async fn create_task(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ServiceError> {
    let (form, files) = read_task_form(multipart).await?;
    let task = state.engine.create(&caller, form, files)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "msg": "Task created successfully", "task_id": task.id })),
    ))
}

// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ServiceError> {
    Ok(Json(state.engine.get(&caller, &id)?))
}

// PUT /api/tasks/:id
pub async fn update_task(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    let task = state.engine.update(&caller, &id, &body)?;
    Ok(Json(json!({ "msg": "Task updated successfully", "task": task })))
}

// DELETE /api/tasks/:id
pub async fn delete_task(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.engine.delete(&caller, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/tasks/:id/documents/:stored_name
pub async fn download_document(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path((id, stored_name)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    let attachment = state.engine.download(&caller, &id, &stored_name)?;

    let content_type = if attachment.document.mime_type.is_empty() {
        "application/octet-stream".to_string()
    } else {
        attachment.document.mime_type.clone()
    };
    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment.document.original_name.replace('"', "")
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        attachment.data,
    )
        .into_response())
}

/// Split a multipart task form into its text fields and attached files.
async fn read_task_form(mut multipart: Multipart) -> Result<(NewTask, Vec<IncomingFile>), ServiceError> {
    let mut form = NewTask::default();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == DOCUMENTS_FIELD {
            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(bad_form)?;
            // Browsers send an empty part when no file was picked.
            if filename.is_empty() && data.is_empty() {
                continue;
            }
            files.push(IncomingFile { filename, content_type, data: data.to_vec() });
            continue;
        }

        let text = field.text().await.map_err(bad_form)?;
        match name.as_str() {
            "title" => form.title = Some(text),
            "description" => form.description = Some(text),
            "status" => form.status = Some(text),
            "priority" => form.priority = Some(text),
            "due_date" => form.due_date = Some(text),
            "assigned_to" => form.assigned_to = Some(text),
            _ => {}
        }
    }

    Ok((form, files))
}

fn bad_form(e: MultipartError) -> ServiceError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ServiceError::PayloadTooLarge("Upload exceeds the allowed request size".into());
    }
    ServiceError::Validation(format!("Invalid multipart body: {e}"))
}
