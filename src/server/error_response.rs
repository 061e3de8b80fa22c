use crate::error::JobError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl JobError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            JobError::InvalidCodeProvided(_) => StatusCode::BAD_REQUEST,
            JobError::JobNotFound(_) => StatusCode::NOT_FOUND,
            JobError::InvalidExecutionState { .. } | JobError::AlreadyExecuting(_) => {
                StatusCode::CONFLICT
            }
            JobError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
