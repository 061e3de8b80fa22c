use axum::extract::FromRef;

use crate::job_service::JobService;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedJobService = Arc<JobService>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub job_service: GuardedJobService,
    pub hash: String,
}

impl ServerState {
    pub fn new(config: ServerConfig, job_service: GuardedJobService) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            job_service,
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

impl FromRef<ServerState> for GuardedJobService {
    fn from_ref(input: &ServerState) -> Self {
        input.job_service.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
