//! Document-store contract for tasks.
//!
//! The engine only ever talks to this trait. Each call is atomic on its own;
//! nothing spans more than one call.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{Task, TaskPatch};
use crate::query::{SortKey, TaskFilter};

pub trait TaskStore: Send + Sync {
    fn insert(&self, task: &Task) -> Result<(), StoreError>;

    /// Number of tasks matching `filter`.
    fn count(&self, filter: &TaskFilter) -> Result<u64, StoreError>;

    /// Matching tasks, ordered by `sort`, then `skip` and `limit` applied.
    fn find(
        &self,
        filter: &TaskFilter,
        sort: &[SortKey],
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Task>, StoreError>;

    fn find_one(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Apply `patch` to one task and return it as stored. `None` if the task
    /// does not exist.
    fn update_one(&self, id: Uuid, patch: &TaskPatch) -> Result<Option<Task>, StoreError>;

    /// Returns false if the task did not exist.
    fn delete_one(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Remove every task the predicate accepts and hand them back.
    fn delete_many(&self, predicate: &dyn Fn(&Task) -> bool) -> Result<Vec<Task>, StoreError>;
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redb: {0}")]
    Redb(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("encode: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_layer() {
        assert_eq!(StoreError::Redb("locked".into()).to_string(), "redb: locked");
        assert_eq!(StoreError::Decode("eof".into()).to_string(), "decode: eof");
        assert_eq!(StoreError::Encode("full".into()).to_string(), "encode: full");
    }
}
