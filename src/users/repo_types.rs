use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Public projection of a `users` row. Password columns never reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: i32,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
}
