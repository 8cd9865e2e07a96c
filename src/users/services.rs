use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::dto::{ChangePasswordRequest, CreateUserRequest, UpdateProfileRequest};
use super::password::hash_password;
use super::repo::{AccountStore, AccountTx};
use super::repo_types::AccountView;
use super::validation::{email_available, password_changed, passwords_match};
use crate::error::AppError;

pub async fn list_accounts(store: &dyn AccountStore) -> Result<Vec<AccountView>, AppError> {
    let accounts = store.list().await?;
    if accounts.is_empty() {
        return Err(AppError::not_found("No users registered"));
    }
    Ok(accounts)
}

pub async fn get_account(store: &dyn AccountStore, id: i32) -> Result<AccountView, AppError> {
    store
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

pub async fn create_account(
    store: &dyn AccountStore,
    req: CreateUserRequest,
) -> Result<i32, AppError> {
    let mut tx = store.begin().await?;
    let outcome = create_in_tx(tx.as_mut(), &req).await;
    let id = finish(tx, outcome).await?;
    info!(user_id = id, "user created");
    Ok(id)
}

async fn create_in_tx(tx: &mut dyn AccountTx, req: &CreateUserRequest) -> Result<i32, AppError> {
    email_available(tx, req.email.as_deref(), None).await?;
    passwords_match(&req.pwd, &req.re_enter_pwd)?;
    let hashed = hash_password(&req.pwd);
    tx.insert(req.display_name.as_deref(), req.email.as_deref(), &hashed)
        .await
}

pub async fn update_profile(
    store: &dyn AccountStore,
    id: i32,
    req: UpdateProfileRequest,
) -> Result<(), AppError> {
    let mut tx = store.begin().await?;
    let outcome = update_profile_in_tx(tx.as_mut(), id, &req).await;
    finish(tx, outcome).await?;
    info!(user_id = id, "user profile updated");
    Ok(())
}

async fn update_profile_in_tx(
    tx: &mut dyn AccountTx,
    id: i32,
    req: &UpdateProfileRequest,
) -> Result<(), AppError> {
    email_available(tx, req.email.as_deref(), Some(id)).await?;
    let rows = tx
        .update_profile(
            id,
            req.display_name.as_deref(),
            req.email.as_deref(),
            OffsetDateTime::now_utc(),
        )
        .await?;
    found(rows)
}

pub async fn change_password(
    store: &dyn AccountStore,
    id: i32,
    req: ChangePasswordRequest,
) -> Result<(), AppError> {
    let mut tx = store.begin().await?;
    let outcome = change_password_in_tx(tx.as_mut(), id, &req).await;
    finish(tx, outcome).await?;
    info!(user_id = id, "user password changed");
    Ok(())
}

async fn change_password_in_tx(
    tx: &mut dyn AccountTx,
    id: i32,
    req: &ChangePasswordRequest,
) -> Result<(), AppError> {
    passwords_match(&req.pwd, &req.re_enter_pwd)?;
    let hashed = hash_password(&req.pwd);
    password_changed(tx, id, &hashed).await?;
    let rows = tx
        .update_password(id, &hashed, OffsetDateTime::now_utc())
        .await?;
    found(rows)
}

pub async fn delete_account(store: &dyn AccountStore, id: i32) -> Result<(), AppError> {
    let mut tx = store.begin().await?;
    let outcome = tx.delete(id).await.and_then(found);
    finish(tx, outcome).await?;
    info!(user_id = id, "user deleted");
    Ok(())
}

fn found(rows_affected: u64) -> Result<(), AppError> {
    if rows_affected == 0 {
        return Err(AppError::not_found("User not found"));
    }
    Ok(())
}

/// Commits on success, rolls back otherwise. A failed rollback is logged and
/// the original error is returned.
async fn finish<T>(tx: Box<dyn AccountTx>, outcome: Result<T, AppError>) -> Result<T, AppError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            match &e {
                AppError::Internal(cause) => error!(error = %cause, "store operation failed"),
                rejected => {
                    warn!(status = %rejected.status(), reason = %rejected, "request rejected")
                }
            }
            if let Err(rb) = tx.rollback().await {
                error!(error = %rb, "rollback failed");
            }
            Err(e)
        }
    }
}
