use axum::{
    Json,
    extract::{Extension, Query},
};
use serde::Deserialize;
use std::sync::Arc;

use super::log::Outbox;
use super::types::{OutboxEntry, OutboxStatus};
use crate::error::NodeError;

#[derive(Debug, Default, Deserialize)]
pub struct OutboxQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn handle_list_outbox(
    Extension(outbox): Extension<Arc<Outbox>>,
    Query(query): Query<OutboxQuery>,
) -> Result<Json<Vec<OutboxEntry>>, NodeError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OutboxStatus>)
        .transpose()
        .map_err(NodeError::Validation)?;
    Ok(Json(outbox.entries(status, query.limit)))
}
