use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;

use super::repo_types::AccountView;
use crate::error::AppError;

/// Source of account data. Reads go straight to the store; writes go through
/// an [`AccountTx`] obtained from [`AccountStore::begin`].
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn list(&self) -> Result<Vec<AccountView>, AppError>;
    async fn get_by_id(&self, id: i32) -> Result<Option<AccountView>, AppError>;
    /// Acquires a connection and opens a transaction on it.
    async fn begin(&self) -> Result<Box<dyn AccountTx>, AppError>;
}

/// One open transaction. Dropping it without `commit` discards its writes.
#[async_trait]
pub trait AccountTx: Send {
    async fn exists_by_email(
        &mut self,
        email: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool, AppError>;
    async fn exists_by_password_hash(&mut self, id: i32, hash: &str) -> Result<bool, AppError>;
    async fn insert(
        &mut self,
        display_name: Option<&str>,
        email: Option<&str>,
        hashed_pwd: &str,
    ) -> Result<i32, AppError>;
    async fn update_profile(
        &mut self,
        id: i32,
        display_name: Option<&str>,
        email: Option<&str>,
        last_modified: OffsetDateTime,
    ) -> Result<u64, AppError>;
    async fn update_password(
        &mut self,
        id: i32,
        hashed_pwd: &str,
        last_modified: OffsetDateTime,
    ) -> Result<u64, AppError>;
    async fn delete(&mut self, id: i32) -> Result<u64, AppError>;
    async fn commit(self: Box<Self>) -> Result<(), AppError>;
    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn list(&self) -> Result<Vec<AccountView>, AppError> {
        let rows = sqlx::query_as::<_, AccountView>(
            r#"
            SELECT id, display_name AS name, email, created_at, last_modified
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<AccountView>, AppError> {
        let row = sqlx::query_as::<_, AccountView>(
            r#"
            SELECT id, display_name AS name, email, created_at, last_modified
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn begin(&self) -> Result<Box<dyn AccountTx>, AppError> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgAccountTx { tx }))
    }
}

pub struct PgAccountTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AccountTx for PgAccountTx {
    async fn exists_by_email(
        &mut self,
        email: &str,
        exclude_id: Option<i32>,
    ) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE email = $1 AND ($2::INT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn exists_by_password_hash(&mut self, id: i32, hash: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND pwd = $2)"#,
        )
        .bind(id)
        .bind(hash)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert(
        &mut self,
        display_name: Option<&str>,
        email: Option<&str>,
        hashed_pwd: &str,
    ) -> Result<i32, AppError> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO users (display_name, email, pwd, created_at)
            VALUES ($1, $2, $3, now())
            RETURNING id
            "#,
        )
        .bind(display_name)
        .bind(email)
        .bind(hashed_pwd)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn update_profile(
        &mut self,
        id: i32,
        display_name: Option<&str>,
        email: Option<&str>,
        last_modified: OffsetDateTime,
    ) -> Result<u64, AppError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET display_name = $2, email = $3, last_modified = $4
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(display_name)
        .bind(email)
        .bind(last_modified)
        .execute(&mut *self.tx)
        .await?;
        Ok(res.rows_affected())
    }

    async fn update_password(
        &mut self,
        id: i32,
        hashed_pwd: &str,
        last_modified: OffsetDateTime,
    ) -> Result<u64, AppError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET pwd = $2, last_modified = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(hashed_pwd)
        .bind(last_modified)
        .execute(&mut *self.tx)
        .await?;
        Ok(res.rows_affected())
    }

    async fn delete(&mut self, id: i32) -> Result<u64, AppError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}
