//! Request logging middleware

use super::super::state::ServerState;
use crate::server::metrics::{normalize_path, record_http_request};
use axum::extract::State;
use axum::{
    body::Body,
    http::{Request, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::info;

#[derive(PartialEq, PartialOrd, Clone, Debug, Default, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub async fn log_requests(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let level = state.config.requests_logging_level.clone();
    let start = Instant::now();

    let method = request.method().to_string();
    let uri = request.uri().to_string();
    let path = normalize_path(request.uri().path());

    if level > RequestsLoggingLevel::None {
        info!(">>> {} {}", method, uri);
    }

    if level >= RequestsLoggingLevel::Headers {
        info!("  Req Headers:");
        for header in request.headers().iter() {
            info!("    {:?}: {:?}", header.0, header.1);
        }
    }

    let response = next.run(request).await;

    if level >= RequestsLoggingLevel::Headers {
        info!("  Resp Headers:");
        for header in response.headers().iter() {
            info!("    {:?}: {:?}", header.0, header.1);
        }
    }

    let status = response.status().as_u16();
    let duration = start.elapsed();

    if level > RequestsLoggingLevel::None {
        info!("<<< {} ({}ms)", status, duration.as_millis());
    }

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::RequestsLoggingLevel;
    use clap::ValueEnum;

    #[test]
    fn level_ordering() {
        let none = RequestsLoggingLevel::None;

        assert!(none < RequestsLoggingLevel::Path);
        assert!(RequestsLoggingLevel::Headers > RequestsLoggingLevel::Path);
    }

    #[test]
    fn level_parses_from_cli_names() {
        assert_eq!(
            RequestsLoggingLevel::from_str("headers", true).unwrap(),
            RequestsLoggingLevel::Headers
        );
        assert_eq!(RequestsLoggingLevel::default(), RequestsLoggingLevel::Path);
    }
}
