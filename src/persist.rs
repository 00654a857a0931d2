//! redb-backed document store.
//!
//! One file holds tasks, users and an email → user id index. Records are
//! postcard-encoded. Queries scan the tasks table and evaluate the filter in
//! memory.

use redb::{Database, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Task, TaskPatch, User};
use crate::query::{sort_tasks, SortKey, TaskFilter};
use crate::store::{StoreError, TaskStore};

const TASKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tasks");
const USERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("users");
const EMAIL_INDEX: TableDefinition<&str, &[u8]> = TableDefinition::new("email_index");

/// Outcome of writing a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserWrite {
    Saved,
    NotFound,
    EmailTaken,
}

/// Thin handle to the redb file. Cloneable (Arc inside).
#[derive(Clone)]
pub struct SaveFile {
    db: Arc<Database>,
}

impl SaveFile {
    /// Open (or create) the save file at the given path.
    /// Creates tables if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(TASKS)?;
            let _ = txn.open_table(USERS)?;
            let _ = txn.open_table(EMAIL_INDEX)?;
        }
        txn.commit()?;

        Ok(SaveFile { db: Arc::new(db) })
    }

    fn scan_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TASKS)?;

        let mut tasks = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let task: Task = decode(value.value())?;
            if filter.matches(&task) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    // ── Users ──────────────────────────────────────────────────

    /// Insert a new user unless the email is already registered.
    pub fn create_user(&self, user: &User) -> Result<UserWrite, StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut users = txn.open_table(USERS)?;
            let mut index = txn.open_table(EMAIL_INDEX)?;

            if index.get(user.email.as_str())?.is_some() {
                return Ok(UserWrite::EmailTaken);
            }

            let bytes = encode(user)?;
            users.insert(user.id.as_bytes().as_slice(), bytes.as_slice())?;
            index.insert(user.email.as_str(), user.id.as_bytes().as_slice())?;
        }
        txn.commit()?;
        Ok(UserWrite::Saved)
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let txn = self.db.begin_read()?;
        let users = txn.open_table(USERS)?;
        match users.get(id.as_bytes().as_slice())? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(EMAIL_INDEX)?;

        let id = match index.get(email)? {
            Some(id) => id.value().to_vec(),
            None => return Ok(None),
        };

        let users = txn.open_table(USERS)?;
        match users.get(id.as_slice())? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let txn = self.db.begin_read()?;
        let users = txn.open_table(USERS)?;

        let mut out = Vec::new();
        for entry in users.iter()? {
            let (_, value) = entry?;
            out.push(decode(value.value())?);
        }
        out.sort_by(|a: &User, b: &User| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    pub fn has_users(&self) -> Result<bool, StoreError> {
        let txn = self.db.begin_read()?;
        let users = txn.open_table(USERS)?;
        let mut iter = users.iter()?;
        let found = iter.next().is_some();
        Ok(found)
    }

    /// Overwrite an existing user, moving the email index entry if the email changed.
    pub fn update_user(&self, user: &User) -> Result<UserWrite, StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut users = txn.open_table(USERS)?;
            let mut index = txn.open_table(EMAIL_INDEX)?;

            let previous: User = match users.get(user.id.as_bytes().as_slice())? {
                Some(data) => decode(data.value())?,
                None => return Ok(UserWrite::NotFound),
            };

            if previous.email != user.email {
                let taken = match index.get(user.email.as_str())? {
                    Some(owner) => owner.value() != user.id.as_bytes().as_slice(),
                    None => false,
                };
                if taken {
                    return Ok(UserWrite::EmailTaken);
                }
                index.remove(previous.email.as_str())?;
            }

            let bytes = encode(user)?;
            users.insert(user.id.as_bytes().as_slice(), bytes.as_slice())?;
            index.insert(user.email.as_str(), user.id.as_bytes().as_slice())?;
        }
        txn.commit()?;
        Ok(UserWrite::Saved)
    }

    pub fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let txn = self.db.begin_write()?;
        let deleted;
        {
            let mut users = txn.open_table(USERS)?;
            let mut index = txn.open_table(EMAIL_INDEX)?;

            let removed: Option<User> = match users.remove(id.as_bytes().as_slice())? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };
            if let Some(user) = &removed {
                index.remove(user.email.as_str())?;
            }
            deleted = removed.is_some();
        }
        txn.commit()?;
        Ok(deleted)
    }
}

impl TaskStore for SaveFile {
    fn insert(&self, task: &Task) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let bytes = encode(task)?;
            tasks.insert(task.id.as_bytes().as_slice(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn count(&self, filter: &TaskFilter) -> Result<u64, StoreError> {
        Ok(self.scan_tasks(filter)?.len() as u64)
    }

    fn find(
        &self,
        filter: &TaskFilter,
        sort: &[SortKey],
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Task>, StoreError> {
        let mut tasks = self.scan_tasks(filter)?;
        sort_tasks(&mut tasks, sort);

        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(tasks.into_iter().skip(skip).take(limit).collect())
    }

    fn find_one(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let txn = self.db.begin_read()?;
        let tasks = txn.open_table(TASKS)?;
        match tasks.get(id.as_bytes().as_slice())? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn update_one(&self, id: Uuid, patch: &TaskPatch) -> Result<Option<Task>, StoreError> {
        let txn = self.db.begin_write()?;
        let updated;
        {
            let mut tasks = txn.open_table(TASKS)?;

            let mut task: Task = match tasks.get(id.as_bytes().as_slice())? {
                Some(data) => decode(data.value())?,
                None => return Ok(None),
            };
            task.apply(patch);

            let bytes = encode(&task)?;
            tasks.insert(id.as_bytes().as_slice(), bytes.as_slice())?;
            updated = task;
        }
        txn.commit()?;
        Ok(Some(updated))
    }

    fn delete_one(&self, id: Uuid) -> Result<bool, StoreError> {
        let txn = self.db.begin_write()?;
        let deleted;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let result = tasks.remove(id.as_bytes().as_slice())?;
            deleted = result.is_some();
        }
        txn.commit()?;
        Ok(deleted)
    }

    fn delete_many(&self, predicate: &dyn Fn(&Task) -> bool) -> Result<Vec<Task>, StoreError> {
        let txn = self.db.begin_write()?;
        let doomed;
        {
            let mut tasks = txn.open_table(TASKS)?;

            let mut matched = Vec::new();
            for entry in tasks.iter()? {
                let (_, value) = entry?;
                let task: Task = decode(value.value())?;
                if predicate(&task) {
                    matched.push(task);
                }
            }

            for task in &matched {
                tasks.remove(task.id.as_bytes().as_slice())?;
            }
            doomed = matched;
        }
        txn.commit()?;
        Ok(doomed)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    postcard::to_allocvec(value).map_err(|e| StoreError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

// redb 2.x has many error types. Blanket them all into StoreError::Redb.
macro_rules! from_redb {
    ($($t:ty),*) => {
        $(impl From<$t> for StoreError {
            fn from(e: $t) -> Self { StoreError::Redb(e.to_string()) }
        })*
    };
}

from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError
);

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentRef, Role, TaskPriority, TaskStatus};
    use crate::query::parse_sort;
    use chrono::Utc;
    use tempfile::TempDir;

    fn temp_save() -> (SaveFile, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sf = SaveFile::open(dir.path().join("tasks.redb")).unwrap();
        (sf, dir)
    }

    fn task(title: &str, priority: TaskPriority, assignee: Uuid) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            status: TaskStatus::ToDo,
            priority,
            due_date: None,
            assigned_to: assignee,
            created_by: assignee,
            attached_documents: vec![],
        }
    }

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_find_one_round_trip() {
        let (sf, _dir) = temp_save();
        let mut t = task("with docs", TaskPriority::High, Uuid::new_v4());
        t.due_date = Some("2025-05-05".into());
        t.attached_documents.push(DocumentRef {
            original_name: "spec.pdf".into(),
            stored_name: "abc_spec.pdf".into(),
            location: "abc_spec.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 12,
        });
        sf.insert(&t).unwrap();

        assert_eq!(sf.find_one(t.id).unwrap(), Some(t));
        assert_eq!(sf.find_one(Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn count_and_find_respect_filter_sort_and_window() {
        let (sf, _dir) = temp_save();
        let owner = Uuid::new_v4();
        for title in ["b", "d", "a", "c"] {
            sf.insert(&task(title, TaskPriority::Low, owner)).unwrap();
        }
        sf.insert(&task("z", TaskPriority::High, owner)).unwrap();

        let filter = TaskFilter { priority: Some("Low".into()), ..Default::default() };
        assert_eq!(sf.count(&filter).unwrap(), 4);

        let page = sf.find(&filter, &parse_sort("-title"), 1, 2).unwrap();
        let titles: Vec<_> = page.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["c", "b"]);

        let past_end = sf.find(&filter, &parse_sort("title"), 10, 5).unwrap();
        assert!(past_end.is_empty());
    }

    #[test]
    fn update_one_applies_patch() {
        let (sf, _dir) = temp_save();
        let t = task("old", TaskPriority::Low, Uuid::new_v4());
        sf.insert(&t).unwrap();

        let patch = TaskPatch { title: Some("new".into()), ..Default::default() };
        let updated = sf.update_one(t.id, &patch).unwrap().unwrap();
        assert_eq!(updated.title, "new");
        assert_eq!(sf.find_one(t.id).unwrap(), Some(updated));

        assert_eq!(sf.update_one(Uuid::new_v4(), &patch).unwrap(), None);
    }

    #[test]
    fn delete_one_and_many() {
        let (sf, _dir) = temp_save();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let a1 = task("a1", TaskPriority::Low, alice);
        let a2 = task("a2", TaskPriority::Low, alice);
        let b1 = task("b1", TaskPriority::Low, bob);
        for t in [&a1, &a2, &b1] {
            sf.insert(t).unwrap();
        }

        assert!(sf.delete_one(a1.id).unwrap());
        assert!(!sf.delete_one(a1.id).unwrap());

        let removed = sf.delete_many(&|t: &Task| t.assigned_to == alice).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, a2.id);
        assert_eq!(sf.count(&TaskFilter::default()).unwrap(), 1);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.redb");
        let t = task("persisted", TaskPriority::Medium, Uuid::new_v4());
        {
            let sf = SaveFile::open(&path).unwrap();
            sf.insert(&t).unwrap();
        }
        let sf = SaveFile::open(&path).unwrap();
        assert_eq!(sf.find_one(t.id).unwrap().unwrap().title, "persisted");
    }

    #[test]
    fn users_are_unique_by_email() {
        let (sf, _dir) = temp_save();
        assert!(!sf.has_users().unwrap());

        let alice = user("alice@example.com");
        assert_eq!(sf.create_user(&alice).unwrap(), UserWrite::Saved);
        assert_eq!(
            sf.create_user(&user("alice@example.com")).unwrap(),
            UserWrite::EmailTaken
        );
        assert!(sf.has_users().unwrap());

        let found = sf.get_user_by_email("alice@example.com").unwrap().unwrap();
        assert_eq!(found.id, alice.id);
        assert_eq!(sf.list_users().unwrap().len(), 1);
    }

    #[test]
    fn update_user_moves_email_index() {
        let (sf, _dir) = temp_save();
        let mut alice = user("alice@example.com");
        let bob = user("bob@example.com");
        sf.create_user(&alice).unwrap();
        sf.create_user(&bob).unwrap();

        alice.email = "bob@example.com".into();
        assert_eq!(sf.update_user(&alice).unwrap(), UserWrite::EmailTaken);

        alice.email = "alice@corp.example".into();
        assert_eq!(sf.update_user(&alice).unwrap(), UserWrite::Saved);
        assert!(sf.get_user_by_email("alice@example.com").unwrap().is_none());
        assert_eq!(
            sf.get_user_by_email("alice@corp.example").unwrap().unwrap().id,
            alice.id
        );

        assert_eq!(sf.update_user(&user("ghost@example.com")).unwrap(), UserWrite::NotFound);
    }

    #[test]
    fn delete_user_clears_index() {
        let (sf, _dir) = temp_save();
        let alice = user("alice@example.com");
        sf.create_user(&alice).unwrap();

        assert!(sf.delete_user(alice.id).unwrap());
        assert!(!sf.delete_user(alice.id).unwrap());
        assert!(sf.get_user_by_email("alice@example.com").unwrap().is_none());
        assert_eq!(sf.create_user(&user("alice@example.com")).unwrap(), UserWrite::Saved);
    }
}
