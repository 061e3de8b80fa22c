//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own SQLite database and a
//! dispatcher ticking fast enough for tests to observe full job lifecycles.

use super::constants::*;
use snippet_runner::config::DispatcherSettings;
use snippet_runner::execution::{Dispatcher, ExecutionRegistry};
use snippet_runner::job_store::{JobStore, SqliteJobStore};
use snippet_runner::sandbox::{QuickJsEngine, SandboxRunner, ScriptEngine};
use snippet_runner::server::{make_app, RequestsLoggingLevel, ServerConfig};
use snippet_runner::JobService;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Knobs a test may want to turn before spawning.
#[derive(Clone)]
pub struct TestServerOptions {
    pub worker_pool_size: usize,
    pub script_timeout: Duration,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            worker_pool_size: 2,
            script_timeout: Duration::from_secs(30),
        }
    }
}

/// Test server instance with an isolated database and dispatcher
///
/// When dropped, the server and dispatcher shut down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Store for direct database access in tests
    pub store: Arc<dyn JobStore>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port with default options
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the database can't be created, the port can't be bound or
    /// the server doesn't become ready within the timeout.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let store: Arc<dyn JobStore> = Arc::new(
            SqliteJobStore::new(temp_db_dir.path().join("jobs.db"))
                .expect("Failed to open job store"),
        );

        let registry = Arc::new(ExecutionRegistry::new());
        let engine: Arc<dyn ScriptEngine> = Arc::new(QuickJsEngine::default());
        let runner = Arc::new(SandboxRunner::new(engine.clone(), options.script_timeout));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            registry.clone(),
            runner,
            DispatcherSettings {
                poll_interval: Duration::from_millis(TEST_POLL_INTERVAL_MS),
                worker_pool_size: options.worker_pool_size,
                shutdown_grace: Duration::from_secs(2),
                ..Default::default()
            },
        ));
        let job_service = Arc::new(JobService::new(store.clone(), registry, engine));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
        };
        let app = make_app(config, job_service);

        let shutdown = CancellationToken::new();

        let dispatcher_shutdown = shutdown.clone();
        tokio::spawn(async move { dispatcher.run(dispatcher_shutdown).await });

        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            store,
            _temp_db_dir: temp_db_dir,
            shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the / endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
