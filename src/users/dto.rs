use serde::{Deserialize, Serialize};

/// Body of `POST /users`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub pwd: String,
    pub re_enter_pwd: String,
}

/// Body of `PUT /users/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// Body of `PATCH /users/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub pwd: String,
    pub re_enter_pwd: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedUserResponse {
    pub id: i32,
}
