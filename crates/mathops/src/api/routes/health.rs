use axum::{extract::State, response::ErrorResponse};
use hyper::StatusCode;
use log::{debug, error};
use std::sync::Arc;

use crate::{domain::Error, startup::AppState};

pub async fn health(State(state): State<Arc<AppState>>) -> Result<StatusCode, ErrorResponse> {
    // Ping the database
    state.operation_store.ping().await.map_err(|e| {
        error!(target: "http_error", "{}", e);
        Error::DbError(e)
    })?;

    // Verify the background worker is still running
    for (task_name, task) in state.background_threads.iter() {
        if task.is_finished() {
            let err = Error::Task(format!(
                "task {} has died, we need to restart the service",
                task_name
            ));
            error!(target: "http_error", "{}", err);
            return Err(err.into());
        }
    }

    debug!("service, background worker, and db are up");
    Ok(StatusCode::OK)
}
