use axum::{Json, extract::Extension};
use std::sync::Arc;

use super::sync::DistributedSync;
use super::types::{BulkInsertRequest, BulkInsertResponse, PartitionStats, SyncResult};
use crate::error::NodeError;

pub async fn handle_bulk_insert(
    Extension(sync): Extension<Arc<DistributedSync>>,
    Json(request): Json<BulkInsertRequest>,
) -> Result<Json<BulkInsertResponse>, NodeError> {
    let count = sync.bulk_load(request.users).await?;
    Ok(Json(BulkInsertResponse { count }))
}

pub async fn handle_distribute(
    Extension(sync): Extension<Arc<DistributedSync>>,
) -> Result<Json<Vec<SyncResult>>, NodeError> {
    Ok(Json(sync.distribute().await?))
}

pub async fn handle_partition_stats(
    Extension(sync): Extension<Arc<DistributedSync>>,
) -> Json<PartitionStats> {
    Json(sync.stats())
}
