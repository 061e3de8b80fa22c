//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, HELLO_SCRIPT};
//!
//! #[tokio::test]
//! async fn test_hello() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let job = client.submit_ok(serde_json::json!({ "code": HELLO_SCRIPT })).await;
//!     client.wait_for_status(job["id"].as_str().unwrap(), "COMPLETED").await;
//! }
//! ```

mod client;
mod constants;
mod server;

// Public API - this is what tests import
pub use client::TestClient;
pub use constants::*;
#[allow(unused_imports)]
pub use server::{TestServer, TestServerOptions};
