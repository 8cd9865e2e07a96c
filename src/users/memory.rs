//! In-process [`AccountStore`] used by the handler and service tests.
//!
//! A transaction holds the table lock for its whole lifetime and works on a
//! copy of the rows, so `rollback` (or drop) leaves the table untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::repo::{AccountStore, AccountTx};
use super::repo_types::AccountView;
use crate::error::AppError;

/// A stored account, password digest included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i32,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub pwd: String,
    pub created_at: OffsetDateTime,
    pub last_modified: Option<OffsetDateTime>,
}

impl Account {
    /// Copy of `self` with `last_modified` set to `at`.
    pub fn touched(self, at: OffsetDateTime) -> Self {
        Self {
            last_modified: Some(at),
            ..self
        }
    }
}

impl From<&Account> for AccountView {
    fn from(a: &Account) -> Self {
        Self {
            id: a.id,
            name: a.display_name.clone(),
            email: a.email.clone(),
            created_at: a.created_at,
            last_modified: a.last_modified,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Table {
    last_id: i32,
    rows: BTreeMap<i32, Account>,
}

#[derive(Clone, Default)]
pub struct InMemoryAccountStore {
    table: Arc<Mutex<Table>>,
    fail_writes: bool,
    fail_reads: bool,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose mutating statements all fail, as if the database went away.
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// A store whose `list` and `get_by_id` fail the same way.
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    fn check_readable(&self) -> Result<(), AppError> {
        if self.fail_reads {
            return Err(anyhow::anyhow!("database is unavailable").into());
        }
        Ok(())
    }

    pub async fn seed(&self, display_name: &str, email: &str, pwd_hash: &str) -> i32 {
        let mut table = self.table.lock().await;
        table.last_id += 1;
        let id = table.last_id;
        table.rows.insert(
            id,
            Account {
                id,
                display_name: Some(display_name.to_string()),
                email: Some(email.to_string()),
                pwd: pwd_hash.to_string(),
                created_at: OffsetDateTime::now_utc(),
                last_modified: None,
            },
        );
        id
    }

    pub async fn account(&self, id: i32) -> Option<Account> {
        self.table.lock().await.rows.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.rows.len()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn list(&self) -> Result<Vec<AccountView>, AppError> {
        self.check_readable()?;
        Ok(self.table.lock().await.rows.values().map(AccountView::from).collect())
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<AccountView>, AppError> {
        self.check_readable()?;
        Ok(self.table.lock().await.rows.get(&id).map(AccountView::from))
    }

    async fn begin(&self) -> Result<Box<dyn AccountTx>, AppError> {
        let guard = self.table.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx {
            guard,
            working,
            fail_writes: self.fail_writes,
        }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<Table>,
    working: Table,
    fail_writes: bool,
}

impl InMemoryTx {
    /// Mirrors the `UNIQUE (email)` constraint of the `users` table.
    fn check_unique_email(
        &self,
        email: Option<&str>,
        own_id: Option<i32>,
    ) -> Result<(), AppError> {
        let Some(email) = email else {
            return Ok(());
        };
        let taken = self
            .working
            .rows
            .values()
            .any(|a| a.email.as_deref() == Some(email) && Some(a.id) != own_id);
        if taken {
            return Err(AppError::conflict("Email already registered"));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes {
            return Err(anyhow::anyhow!("database is unavailable").into());
        }
        Ok(())
    }
}

#[async_trait]
impl AccountTx for InMemoryTx {
    async fn exists_by_email(
        &mut self,
        email: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool, AppError> {
        Ok(self
            .working
            .rows
            .values()
            .any(|a| a.email.as_deref() == Some(email) && Some(a.id) != exclude_id))
    }

    async fn exists_by_password_hash(&mut self, id: i32, hash: &str) -> Result<bool, AppError> {
        Ok(self.working.rows.get(&id).is_some_and(|a| a.pwd == hash))
    }

    async fn insert(
        &mut self,
        display_name: Option<&str>,
        email: Option<&str>,
        hashed_pwd: &str,
    ) -> Result<i32, AppError> {
        self.check_writable()?;
        self.check_unique_email(email, None)?;
        self.working.last_id += 1;
        let id = self.working.last_id;
        self.working.rows.insert(
            id,
            Account {
                id,
                display_name: display_name.map(str::to_string),
                email: email.map(str::to_string),
                pwd: hashed_pwd.to_string(),
                created_at: OffsetDateTime::now_utc(),
                last_modified: None,
            },
        );
        Ok(id)
    }

    async fn update_profile(
        &mut self,
        id: i32,
        display_name: Option<&str>,
        email: Option<&str>,
        last_modified: OffsetDateTime,
    ) -> Result<u64, AppError> {
        self.check_writable()?;
        let Some(current) = self.working.rows.get(&id).cloned() else {
            return Ok(0);
        };
        self.check_unique_email(email, Some(id))?;
        let updated = Account {
            display_name: display_name.map(str::to_string),
            email: email.map(str::to_string),
            ..current
        }
        .touched(last_modified);
        self.working.rows.insert(id, updated);
        Ok(1)
    }

    async fn update_password(
        &mut self,
        id: i32,
        hashed_pwd: &str,
        last_modified: OffsetDateTime,
    ) -> Result<u64, AppError> {
        self.check_writable()?;
        let Some(current) = self.working.rows.remove(&id) else {
            return Ok(0);
        };
        let updated = Account {
            pwd: hashed_pwd.to_string(),
            ..current
        }
        .touched(last_modified);
        self.working.rows.insert(id, updated);
        Ok(1)
    }

    async fn delete(&mut self, id: i32) -> Result<u64, AppError> {
        self.check_writable()?;
        Ok(self.working.rows.remove(&id).map_or(0, |_| 1))
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let InMemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = InMemoryAccountStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(Some("Ana"), Some("ana@example.com"), "H").await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn commit_publishes_writes() {
        let store = InMemoryAccountStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert(None, Some("ana@example.com"), "H").await.unwrap();
        tx.commit().await.unwrap();
        let stored = store.account(id).await.unwrap();
        assert_eq!(stored.email.as_deref(), Some("ana@example.com"));
        assert!(stored.display_name.is_none());
    }

    #[test]
    fn touched_replaces_only_last_modified() {
        let created = OffsetDateTime::UNIX_EPOCH;
        let at = created + time::Duration::hours(1);
        let a = Account {
            id: 1,
            display_name: Some("Ana".into()),
            email: None,
            pwd: "H".into(),
            created_at: created,
            last_modified: None,
        };
        let b = a.clone().touched(at);
        assert_eq!(b.last_modified, Some(at));
        assert_eq!(b.created_at, a.created_at);
        assert_eq!(b.display_name, a.display_name);
        assert_eq!(b.pwd, a.pwd);
    }

    #[tokio::test]
    async fn email_exclusion_ignores_own_row() {
        let store = InMemoryAccountStore::new();
        let id = store.seed("Ana", "ana@example.com", "H").await;
        let mut tx = store.begin().await.unwrap();
        assert!(tx.exists_by_email("ana@example.com", None).await.unwrap());
        assert!(!tx.exists_by_email("ana@example.com", Some(id)).await.unwrap());
        assert!(!tx.exists_by_email("bob@example.com", None).await.unwrap());
    }
}
