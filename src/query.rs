//! Query translator: filtering, sorting and pagination parameters.
//!
//! Turns the raw, untrusted `?page=&limit=&status=...` parameters of a list
//! request into a [`QueryDescriptor`]. Nothing here fails: unparseable
//! numbers fall back to defaults, and a malformed `assigned_to` is dropped.
//! The descriptor also knows how to evaluate itself against a [`Task`], so a
//! document store only needs to scan, match and order.

use std::cmp::Ordering;

use serde::Deserialize;
use uuid::Uuid;

use crate::models::Task;

/// Page size used when a caller does not supply its own default.
pub const DEFAULT_LIMIT: u64 = 10;

/// Sort applied when the request has no `sort` parameter at all.
pub const DEFAULT_SORT: &str = "-due_date";

/// Raw query string of a list request. Every field is an unparsed string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date_max: Option<String>,
    pub assigned_to: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        SortKey { field: field.to_string(), direction: Direction::Ascending }
    }

    pub fn desc(field: &str) -> Self {
        SortKey { field: field.to_string(), direction: Direction::Descending }
    }
}

/// Field constraints, all combined with AND. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Exact match on the status label. Unknown labels match nothing.
    pub status: Option<String>,
    /// Exact match on the priority label. Unknown labels match nothing.
    pub priority: Option<String>,
    /// `due_date <= value`, string comparison. Tasks without a due date never match.
    pub due_date_max: Option<String>,
    pub assigned_to: Option<Uuid>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = &self.status {
            if task.status.as_str() != status {
                return false;
            }
        }
        if let Some(priority) = &self.priority {
            if task.priority.as_str() != priority {
                return false;
            }
        }
        if let Some(max) = &self.due_date_max {
            match &task.due_date {
                Some(due) if due.as_str() <= max.as_str() => {}
                _ => return false,
            }
        }
        if let Some(assignee) = self.assigned_to {
            if task.assigned_to != assignee {
                return false;
            }
        }
        true
    }
}

/// A request-scoped, fully normalized list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub filter: TaskFilter,
    pub sort: Vec<SortKey>,
    pub offset: u64,
    /// Always at least 1.
    pub limit: u64,
}

impl QueryDescriptor {
    /// 1-based page number implied by offset and limit.
    pub fn current_page(&self) -> u64 {
        self.offset / self.limit + 1
    }
}

/// Translate raw parameters into a descriptor. `default_limit` is used when
/// `limit` is absent or unparseable; list endpoints pick their own.
pub fn translate(raw: &RawQuery, default_limit: u64) -> QueryDescriptor {
    let page = parse_int(raw.page.as_deref()).unwrap_or(1);
    let limit = parse_int(raw.limit.as_deref())
        .unwrap_or(default_limit as i64)
        .max(1) as u64;

    let offset = if page > 0 {
        ((page - 1) as u64).saturating_mul(limit)
    } else {
        0
    };

    let mut filter = TaskFilter {
        status: non_empty(&raw.status),
        priority: non_empty(&raw.priority),
        due_date_max: non_empty(&raw.due_date_max),
        assigned_to: None,
    };

    if let Some(assignee) = non_empty(&raw.assigned_to) {
        // A malformed identity is treated as if no filter had been given.
        match Uuid::parse_str(assignee.trim()) {
            Ok(id) => filter.assigned_to = Some(id),
            Err(e) => tracing::debug!(assigned_to = %assignee, error = %e, "dropping malformed assigned_to filter"),
        }
    }

    let sort = parse_sort(raw.sort.as_deref().unwrap_or(DEFAULT_SORT));

    QueryDescriptor { filter, sort, offset, limit }
}

/// Parse `"a,-b, c"` into ordered sort keys. Empty tokens are skipped.
pub fn parse_sort(param: &str) -> Vec<SortKey> {
    param
        .split(',')
        .map(str::trim)
        .filter_map(|token| match token.strip_prefix('-') {
            Some(field) => {
                let field = field.trim();
                (!field.is_empty()).then(|| SortKey::desc(field))
            }
            None => (!token.is_empty()).then(|| SortKey::asc(token)),
        })
        .collect()
}

/// Compare two tasks by a sequence of keys, left-to-right tie-break.
/// Missing values sort before present ones; unknown fields compare equal.
pub fn compare(a: &Task, b: &Task, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ord = sort_value(a, &key.field).cmp(&sort_value(b, &key.field));
        let ord = match key.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Order a slice in place. Stable, so equal tasks keep their store order.
pub fn sort_tasks(tasks: &mut [Task], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    tasks.sort_by(|a, b| compare(a, b, keys));
}

fn sort_value(task: &Task, field: &str) -> Option<String> {
    match field {
        "_id" | "id" => Some(task.id.to_string()),
        "title" => Some(task.title.clone()),
        "description" => task.description.clone(),
        "status" => Some(task.status.as_str().to_string()),
        "priority" => Some(task.priority.as_str().to_string()),
        "due_date" => task.due_date.clone(),
        "assigned_to" => Some(task.assigned_to.to_string()),
        "created_by" => Some(task.created_by.to_string()),
        _ => None,
    }
}

fn parse_int(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse::<i64>().ok())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

// ── Tests ──────────────────────────────────────────────────────
