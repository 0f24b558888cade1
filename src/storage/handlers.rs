use axum::{
    Json,
    extract::{Extension, Path, Query},
};
use serde::Deserialize;
use std::sync::Arc;

use super::memory::MemoryStore;
use super::types::UserRow;
use crate::error::NodeError;

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub limit: Option<usize>,
}

pub async fn handle_list_users(
    Extension(store): Extension<Arc<MemoryStore>>,
    Query(query): Query<ListUsersQuery>,
) -> Json<Vec<UserRow>> {
    Json(store.list_users(query.limit))
}

pub async fn handle_get_user(
    Extension(store): Extension<Arc<MemoryStore>>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserRow>, NodeError> {
    store
        .get_user(user_id)
        .map(Json)
        .ok_or_else(|| NodeError::NotFound(format!("user {}", user_id)))
}
