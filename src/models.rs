use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ServiceError;

// ── Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "To Do")]
    ToDo,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Completed")]
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::ToDo, TaskStatus::InProgress, TaskStatus::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::ToDo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    #[default]
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 3] = [TaskPriority::Low, TaskPriority::Medium, TaskPriority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

// ── Entities ───────────────────────────────────────────────────

/// Metadata for one stored attachment. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub original_name: String,
    pub stored_name: String,
    /// Opaque handle handed back by the blob store.
    pub location: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Free-form; compared as a string by the due-date filter and sort.
    pub due_date: Option<String>,
    pub assigned_to: Uuid,
    pub created_by: Uuid,
    pub attached_documents: Vec<DocumentRef>,
}

impl Task {
    pub fn document(&self, stored_name: &str) -> Option<&DocumentRef> {
        self.attached_documents
            .iter()
            .find(|d| d.stored_name == stored_name)
    }

    /// Apply a validated patch. `id`, `created_by` and attachments never change.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = &patch.due_date {
            self.due_date = due_date.clone();
        }
        if let Some(assigned_to) = patch.assigned_to {
            self.assigned_to = assigned_to;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn to_view(&self) -> UserView {
        UserView {
            id: self.id,
            email: self.email.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

/// A user as returned over HTTP. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The authenticated identity behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn new(id: Uuid, role: Role) -> Self {
        Caller { id, role }
    }
}

// ── Requests ───────────────────────────────────────────────────

/// Form fields of a task creation request, still unvalidated.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub assigned_to: Option<String>,
}

/// Partial task update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<Option<String>>,
    pub assigned_to: Option<Uuid>,
}

impl TaskPatch {
    /// Build a patch from a JSON update body.
    ///
    /// Unknown keys, values of the wrong JSON type, and unknown status or
    /// priority labels are ignored. An empty title or a malformed
    /// `assigned_to` is rejected outright.
    pub fn from_json(body: &Value) -> Result<Self, ServiceError> {
        let map = body
            .as_object()
            .ok_or_else(|| ServiceError::Validation("Request body must be a JSON object".into()))?;

        let mut patch = TaskPatch::default();

        if let Some(Value::String(title)) = map.get("title") {
            if title.trim().is_empty() {
                return Err(ServiceError::Validation("Title cannot be empty".into()));
            }
            patch.title = Some(title.clone());
        }
        match map.get("description") {
            Some(Value::String(d)) => patch.description = Some(Some(d.clone())),
            Some(Value::Null) => patch.description = Some(None),
            _ => {}
        }
        if let Some(Value::String(s)) = map.get("status") {
            patch.status = TaskStatus::from_label(s);
        }
        if let Some(Value::String(p)) = map.get("priority") {
            patch.priority = TaskPriority::from_label(p);
        }
        match map.get("due_date") {
            Some(Value::String(d)) => patch.due_date = Some(Some(d.clone())),
            Some(Value::Null) => patch.due_date = Some(None),
            _ => {}
        }
        if let Some(Value::String(a)) = map.get("assigned_to") {
            let id = Uuid::parse_str(a.trim()).map_err(|_| {
                ServiceError::Validation("Invalid Assigned To User ID format".into())
            })?;
            patch.assigned_to = Some(id);
        }

        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }
}

// ── Tests ──────────────────────────────────────────────────────
