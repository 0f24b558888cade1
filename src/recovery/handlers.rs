use axum::{
    Json,
    extract::{Extension, Query},
};
use std::sync::Arc;

use super::replayer::RecoveryReplayer;
use super::types::{DEFAULT_RECOVERY_LIMIT, RecoveryQuery, RecoveryResult};
use crate::error::NodeError;

pub async fn handle_recovery_run(
    Extension(replayer): Extension<Arc<RecoveryReplayer>>,
    Query(query): Query<RecoveryQuery>,
) -> Result<Json<RecoveryResult>, NodeError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECOVERY_LIMIT);
    if limit == 0 {
        return Err(NodeError::validation("limit must be at least 1"));
    }
    Ok(Json(replayer.replay_pending_outgoing(limit).await))
}
