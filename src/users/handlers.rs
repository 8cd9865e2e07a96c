use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::dto::{
    ChangePasswordRequest, CreateUserRequest, CreatedUserResponse, UpdateProfileRequest,
};
use super::repo_types::AccountView;
use super::services;
use crate::{error::AppError, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user)
                .put(update_user)
                .patch(change_password)
                .delete(delete_user),
        )
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<AccountView>>, AppError> {
    let users = services::list_accounts(state.store.as_ref()).await?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<AccountView>, AppError> {
    let user = services::get_account(state.store.as_ref(), id).await?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = services::create_account(state.store.as_ref(), payload).await?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/v1/users/{}", id))],
        Json(CreatedUserResponse { id }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<StatusCode, AppError> {
    services::update_profile(state.store.as_ref(), id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    services::change_password(state.store.as_ref(), id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    services::delete_account(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
