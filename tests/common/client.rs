//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per job endpoint.
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Job Endpoints
    // ========================================================================

    /// POST /v1/jobs with an arbitrary body
    pub async fn submit_raw(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/v1/jobs", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Submit request failed")
    }

    /// POST /v1/jobs with just code
    pub async fn submit(&self, code: &str) -> Response {
        self.submit_raw(json!({ "code": code })).await
    }

    /// Submits and returns the created job, asserting it was accepted
    pub async fn submit_ok(&self, body: Value) -> Value {
        let response = self.submit_raw(body).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        response.json().await.expect("Invalid job body")
    }

    /// GET /v1/jobs/{id}
    pub async fn get_job(&self, id: &str) -> Response {
        self.client
            .get(format!("{}/v1/jobs/{}", self.base_url, id))
            .send()
            .await
            .expect("Get job request failed")
    }

    /// GET /v1/jobs with query parameters
    pub async fn list_jobs(&self, query: &[(&str, &str)]) -> Response {
        self.client
            .get(format!("{}/v1/jobs", self.base_url))
            .query(query)
            .send()
            .await
            .expect("List jobs request failed")
    }

    /// GET /v1/jobs/actions/find-by-name
    pub async fn find_by_name(&self, name: &str) -> Response {
        self.client
            .get(format!("{}/v1/jobs/actions/find-by-name", self.base_url))
            .query(&[("name", name)])
            .send()
            .await
            .expect("Find by name request failed")
    }

    /// PUT /v1/jobs/{id}/stop-execution
    pub async fn stop_execution(&self, id: &str) -> Response {
        self.client
            .put(format!("{}/v1/jobs/{}/stop-execution", self.base_url, id))
            .send()
            .await
            .expect("Stop execution request failed")
    }

    /// DELETE /v1/jobs/{id}
    pub async fn delete_job(&self, id: &str) -> Response {
        self.client
            .delete(format!("{}/v1/jobs/{}", self.base_url, id))
            .send()
            .await
            .expect("Delete request failed")
    }

    /// GET /metrics
    pub async fn metrics(&self) -> Response {
        self.client
            .get(format!("{}/metrics", self.base_url))
            .send()
            .await
            .expect("Metrics request failed")
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Polls the job until its status is `status`, returning the last body.
    ///
    /// # Panics
    ///
    /// Panics if the status isn't reached within the settle timeout.
    pub async fn wait_for_status(&self, id: &str, status: &str) -> Value {
        let start = std::time::Instant::now();
        loop {
            let job: Value = self
                .get_job(id)
                .await
                .json()
                .await
                .expect("Invalid job body");
            if job["status"] == status {
                return job;
            }
            if start.elapsed() > Duration::from_millis(JOB_SETTLE_TIMEOUT_MS) {
                panic!("Job {} never reached {}, last seen: {}", id, status, job);
            }
            tokio::time::sleep(Duration::from_millis(TEST_POLL_INTERVAL_MS)).await;
        }
    }
}
