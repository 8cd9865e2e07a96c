use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
#[cfg(test)]
pub mod memory;
mod password;
pub mod repo;
mod repo_types;
mod services;
mod validation;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
