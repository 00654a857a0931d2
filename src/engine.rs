//! Task access engine.
//!
//! Composition root for everything a task route does: list queries run
//! through the translator and the scope resolver; single-task operations
//! load the record and pass the authorization gate first. The engine owns
//! the document store and the blob store behind their traits.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::error::ServiceError;
use crate::gate::{self, TaskAction};
use crate::models::{Caller, DocumentRef, NewTask, Task, TaskPatch, TaskPriority, TaskStatus};
use crate::query::{self, RawQuery};
use crate::scope::scope;
use crate::store::TaskStore;
use crate::uploads::{secure_filename, stored_name_for, IncomingFile, UploadPolicy};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub total_tasks: u64,
    pub current_page: u64,
    pub total_pages: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub pagination: Pagination,
}

/// What a delete left behind. `orphaned` lists blob locations that could not
/// be removed; the task record is gone regardless.
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    pub orphaned: Vec<String>,
}

/// A document and its bytes, ready to stream.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub document: DocumentRef,
    pub data: Vec<u8>,
}

#[derive(Clone)]
pub struct TaskEngine {
    store: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    uploads: UploadPolicy,
    page_size: u64,
}

impl TaskEngine {
    pub fn new(
        store: Arc<dyn TaskStore>,
        blobs: Arc<dyn BlobStore>,
        uploads: UploadPolicy,
        page_size: u64,
    ) -> Self {
        TaskEngine { store, blobs, uploads, page_size }
    }

    // ── Listing ────────────────────────────────────────────────

    /// Filtered, sorted, paginated listing restricted to what `caller` may see.
    pub fn list(&self, caller: &Caller, raw: &RawQuery) -> Result<TaskPage, ServiceError> {
        let descriptor = scope(query::translate(raw, self.page_size), caller);

        let total = self.store.count(&descriptor.filter)?;
        let tasks = self.store.find(
            &descriptor.filter,
            &descriptor.sort,
            descriptor.offset,
            descriptor.limit,
        )?;

        Ok(TaskPage {
            tasks,
            pagination: Pagination {
                total_tasks: total,
                current_page: descriptor.current_page(),
                total_pages: total.div_ceil(descriptor.limit),
                page_size: descriptor.limit,
            },
        })
    }

    // ── Single-task operations ─────────────────────────────────

    pub fn get(&self, caller: &Caller, raw_id: &str) -> Result<Task, ServiceError> {
        self.load_authorized(caller, raw_id, TaskAction::Read)
    }

    /// Apply the recognised fields of `body`. Fails without touching the
    /// record when nothing recognisable was supplied.
    pub fn update(
        &self,
        caller: &Caller,
        raw_id: &str,
        body: &serde_json::Value,
    ) -> Result<Task, ServiceError> {
        let task = self.load_authorized(caller, raw_id, TaskAction::Update)?;

        let patch = TaskPatch::from_json(body)?;
        if patch.is_empty() {
            return Err(ServiceError::Validation("No valid fields provided for update".into()));
        }

        let task = self
            .store
            .update_one(task.id, &patch)?
            .ok_or_else(|| ServiceError::NotFound("Task not found".into()))?;

        tracing::info!(task_id = %task.id, caller = %caller.id, "task updated");
        Ok(task)
    }

    /// Remove the task's stored files, then the record. File removal is
    /// best-effort: failures are logged and reported, never fatal.
    pub fn delete(&self, caller: &Caller, raw_id: &str) -> Result<DeleteReport, ServiceError> {
        let task = self.load_authorized(caller, raw_id, TaskAction::Delete)?;

        let orphaned = self.remove_documents(&task.attached_documents);
        self.store.delete_one(task.id)?;

        tracing::info!(task_id = %task.id, caller = %caller.id, orphaned = orphaned.len(), "task deleted");
        Ok(DeleteReport { orphaned })
    }

    pub fn download(
        &self,
        caller: &Caller,
        raw_id: &str,
        stored_name: &str,
    ) -> Result<Attachment, ServiceError> {
        let task = self.load_authorized(caller, raw_id, TaskAction::Download)?;

        let document = task
            .document(stored_name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound("Document not found on this task".into()))?;

        match self.blobs.get(&document.location)? {
            Some(data) => Ok(Attachment { document, data }),
            None => {
                tracing::error!(
                    task_id = %task.id,
                    location = %document.location,
                    "document metadata present but stored file is missing"
                );
                Err(ServiceError::StorageInconsistency(
                    "File found in DB but not on server storage".into(),
                ))
            }
        }
    }

    // ── Creation ───────────────────────────────────────────────

    pub fn create(
        &self,
        caller: &Caller,
        form: NewTask,
        files: Vec<IncomingFile>,
    ) -> Result<Task, ServiceError> {
        let title = form
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ServiceError::Validation("Title is required".into()))?;

        let status = match non_empty(form.status) {
            Some(label) => TaskStatus::from_label(&label)
                .ok_or_else(|| ServiceError::Validation(format!("Invalid status '{label}'")))?,
            None => TaskStatus::default(),
        };
        let priority = match non_empty(form.priority) {
            Some(label) => TaskPriority::from_label(&label)
                .ok_or_else(|| ServiceError::Validation(format!("Invalid priority '{label}'")))?,
            None => TaskPriority::default(),
        };
        let assigned_to = match non_empty(form.assigned_to) {
            Some(raw) => Uuid::parse_str(raw.trim()).map_err(|_| {
                ServiceError::Validation("Invalid Assigned To User ID format".into())
            })?,
            None => caller.id,
        };

        self.uploads.check_count(&files)?;
        let attached_documents = self.store_documents(files)?;

        let task = Task {
            id: Uuid::new_v4(),
            title,
            description: non_empty(form.description),
            status,
            priority,
            due_date: non_empty(form.due_date),
            assigned_to,
            created_by: caller.id,
            attached_documents,
        };

        if let Err(e) = self.store.insert(&task) {
            self.remove_documents(&task.attached_documents);
            return Err(e.into());
        }

        tracing::info!(task_id = %task.id, caller = %caller.id, documents = task.attached_documents.len(), "task created");
        Ok(task)
    }

    // ── Account cascade ────────────────────────────────────────

    /// Delete every task `user_id` created or is assigned to, plus their
    /// stored files. Returns how many tasks went.
    pub fn purge_user_tasks(&self, user_id: Uuid) -> Result<usize, ServiceError> {
        let removed = self
            .store
            .delete_many(&|t: &Task| t.created_by == user_id || t.assigned_to == user_id)?;

        for task in &removed {
            self.remove_documents(&task.attached_documents);
        }
        Ok(removed.len())
    }

    // ── Helpers ────────────────────────────────────────────────

    fn load_authorized(
        &self,
        caller: &Caller,
        raw_id: &str,
        action: TaskAction,
    ) -> Result<Task, ServiceError> {
        let id = parse_task_id(raw_id)?;
        let task = self
            .store
            .find_one(id)?
            .ok_or_else(|| ServiceError::NotFound("Task not found".into()))?;
        gate::check(&task, caller, action)?;
        Ok(task)
    }

    fn store_documents(&self, files: Vec<IncomingFile>) -> Result<Vec<DocumentRef>, ServiceError> {
        let mut stored = Vec::with_capacity(files.len());

        for file in files {
            let original_name = secure_filename(&file.filename);
            if original_name.is_empty() || !self.uploads.allows(&original_name) {
                tracing::warn!(filename = %file.filename, "skipping disallowed upload");
                continue;
            }

            let stored_name = stored_name_for(&original_name);
            match self.blobs.put(&stored_name, &file.data) {
                Ok(location) => stored.push(DocumentRef {
                    original_name,
                    stored_name,
                    location,
                    mime_type: file.content_type,
                    size_bytes: file.data.len() as u64,
                }),
                Err(e) => {
                    self.remove_documents(&stored);
                    return Err(e.into());
                }
            }
        }

        Ok(stored)
    }

    /// Best-effort removal. Returns the locations that could not be removed.
    fn remove_documents(&self, documents: &[DocumentRef]) -> Vec<String> {
        let mut failed = Vec::new();
        for doc in documents {
            if let Err(e) = self.blobs.delete(&doc.location) {
                tracing::warn!(location = %doc.location, error = %e, "failed to remove stored file");
                failed.push(doc.location.clone());
            }
        }
        failed
    }
}

/// Parse a task identifier from a path segment. Malformed ids are a
/// validation failure, distinct from a well-formed id that matches nothing.
pub fn parse_task_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServiceError::Validation("Invalid Task ID format".into()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ── Tests ──────────────────────────────────────────────────────
