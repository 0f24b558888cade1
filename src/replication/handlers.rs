use axum::{Json, extract::Extension};
use std::sync::Arc;

use super::apply::ApplyEngine;
use super::types::{ApplyOutcome, ReplicationMessage};
use crate::error::NodeError;

pub async fn handle_apply(
    Extension(engine): Extension<Arc<ApplyEngine>>,
    Json(message): Json<ReplicationMessage>,
) -> Result<Json<ApplyOutcome>, NodeError> {
    tracing::debug!(
        "Incoming replication {} from {} (key={})",
        message.global_tx_id,
        message.source_node,
        message.entity_key
    );
    let outcome = engine.receive(&message).await?;
    Ok(Json(outcome))
}
