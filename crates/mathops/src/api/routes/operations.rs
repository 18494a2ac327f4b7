use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::ErrorResponse,
    Json,
};
use log::error;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{Operation, OperationStatus, SubmitOperation},
    startup::AppState,
};

/// Operations are accepted as `pending` and resolved asynchronously by the
/// background worker, so submission returns before a result exists.
pub async fn submit_operation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitOperation>,
) -> Result<(StatusCode, Json<Operation>), ErrorResponse> {
    state
        .operation_store
        .add_operation(body)
        .await
        .map(|operation| (StatusCode::CREATED, Json(operation)))
        .map_err(|e| {
            error!(target: "http_error", "error submitting operation: {:?}", e);
            e.into()
        })
}

pub async fn get_operation(
    State(state): State<Arc<AppState>>,
    Path(operation_id): Path<Uuid>,
) -> Result<Json<Operation>, ErrorResponse> {
    state
        .operation_store
        .get_operation(operation_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!(target: "http_error", "error getting operation: {:?}", e);
            e.into()
        })
}

#[derive(Debug, Deserialize)]
pub struct ListOperationsQuery {
    pub status: Option<OperationStatus>,
}

pub async fn get_operations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOperationsQuery>,
) -> Result<Json<Vec<Operation>>, ErrorResponse> {
    state
        .operation_store
        .get_operations(query.status)
        .await
        .map(Json)
        .map_err(|e| {
            error!(target: "http_error", "error listing operations: {:?}", e);
            e.into()
        })
}
