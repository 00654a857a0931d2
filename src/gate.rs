//! Task authorization gate.
//!
//! One policy for every single-task operation: admins may do anything, other
//! callers only what is assigned to them. `created_by` plays no part.

use crate::error::ServiceError;
use crate::models::{Caller, Role, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Read,
    Update,
    Delete,
    Download,
}

impl TaskAction {
    pub const ALL: [TaskAction; 4] = [
        TaskAction::Read,
        TaskAction::Update,
        TaskAction::Delete,
        TaskAction::Download,
    ];

    fn denial(&self) -> &'static str {
        match self {
            TaskAction::Read => "You do not have permission to view this task",
            TaskAction::Update => "You do not have permission to modify this task",
            TaskAction::Delete => "You do not have permission to delete this task",
            TaskAction::Download => "You do not have permission to access this task's files",
        }
    }
}

pub fn authorize(task: &Task, caller: &Caller) -> bool {
    caller.role.is_admin() || task.assigned_to == caller.id
}

/// [`authorize`] as a `Result`, with a message naming the refused action.
pub fn check(task: &Task, caller: &Caller, action: TaskAction) -> Result<(), ServiceError> {
    if authorize(task, caller) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(action.denial().into()))
    }
}

/// Role guard for account-management routes.
pub fn require_role(caller: &Caller, role: Role) -> Result<(), ServiceError> {
    if caller.role == role {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "Authorization failed: insufficient permissions or role.".into(),
        ))
    }
}
