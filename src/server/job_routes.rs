//! Job HTTP routes.
//!
//! - POST   /                       submit a job
//! - GET    /                       list jobs (status, name, newFirst)
//! - GET    /actions/find-by-name   oldest job with the given name
//! - GET    /{id}                   single job
//! - PUT    /{id}/stop-execution    cancel a running job
//! - DELETE /{id}                   cancel and remove

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jobs::{JobFilter, NewJob};
use crate::server::state::{GuardedJobService, ServerState};

#[derive(Debug, Deserialize)]
pub struct FindByNameQuery {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct StopExecutionResponse {
    pub stopped: bool,
}

async fn submit_job(
    State(service): State<GuardedJobService>,
    Json(body): Json<NewJob>,
) -> Response {
    match service.submit(body) {
        Ok(job) => (StatusCode::ACCEPTED, Json(job)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list_jobs(
    State(service): State<GuardedJobService>,
    Query(filter): Query<JobFilter>,
) -> Response {
    match service.list(&filter) {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_job(State(service): State<GuardedJobService>, Path(id): Path<Uuid>) -> Response {
    match service.get(id) {
        Ok(job) => Json(job).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn find_job_by_name(
    State(service): State<GuardedJobService>,
    Query(query): Query<FindByNameQuery>,
) -> Response {
    match service.find_by_name(&query.name) {
        Ok(job) => Json(job).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn stop_execution(
    State(service): State<GuardedJobService>,
    Path(id): Path<Uuid>,
) -> Response {
    match service.cancel(id) {
        Ok(stopped) => Json(StopExecutionResponse { stopped }).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn delete_job(State(service): State<GuardedJobService>, Path(id): Path<Uuid>) -> Response {
    match service.delete(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn job_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(list_jobs).post(submit_job))
        .route("/actions/find-by-name", get(find_job_by_name))
        .route("/{id}", get(get_job).delete(delete_job))
        .route("/{id}/stop-execution", put(stop_execution))
}
