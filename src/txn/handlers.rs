use axum::{Json, extract::Extension};
use std::sync::Arc;

use super::interpreter::ScriptedInterpreter;
use super::orchestrator::TransactionOrchestrator;
use super::types::{InsertRequest, ScriptRequest, ScriptedTrace};
use crate::error::NodeError;

pub async fn handle_insert_auto(
    Extension(orchestrator): Extension<Arc<TransactionOrchestrator>>,
    Json(request): Json<InsertRequest>,
) -> Result<Json<ScriptedTrace>, NodeError> {
    let trace = orchestrator.perform_insert(request).await?;
    Ok(Json(trace))
}

pub async fn handle_scripted(
    Extension(interpreter): Extension<Arc<ScriptedInterpreter>>,
    Json(request): Json<ScriptRequest>,
) -> Result<Json<ScriptedTrace>, NodeError> {
    tracing::debug!(
        "Scripted transaction on user {} with {} steps ({})",
        request.user_id,
        request.steps.len(),
        request.isolation
    );
    let trace = interpreter.run_scripted(request).await?;
    Ok(Json(trace))
}
