pub mod config;
mod error_response;
mod http_layers;
mod job_routes;
pub mod metrics;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub(self) use job_routes::job_routes;
pub use server::{make_app, run_server};
