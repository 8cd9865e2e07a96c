use super::repo::AccountTx;
use crate::error::AppError;

pub fn passwords_match(pwd: &str, re_enter_pwd: &str) -> Result<(), AppError> {
    if pwd != re_enter_pwd {
        return Err(AppError::bad_request("Passwords do not match"));
    }
    Ok(())
}

/// Rejects an email already held by another account. `exclude_id` lets an
/// account keep its own address on update. An absent email never conflicts.
pub async fn email_available(
    tx: &mut dyn AccountTx,
    email: Option<&str>,
    exclude_id: Option<i32>,
) -> Result<(), AppError> {
    let Some(email) = email else {
        return Ok(());
    };
    if tx.exists_by_email(email, exclude_id).await? {
        return Err(AppError::conflict("Email already registered"));
    }
    Ok(())
}

/// Rejects setting the password an account already has.
pub async fn password_changed(
    tx: &mut dyn AccountTx,
    id: i32,
    new_hash: &str,
) -> Result<(), AppError> {
    if tx.exists_by_password_hash(id, new_hash).await? {
        return Err(AppError::bad_request(
            "New password cannot reuse the current password",
        ));
    }
    Ok(())
}
