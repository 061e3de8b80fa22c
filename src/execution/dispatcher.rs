use super::registry::{ExecutionHandle, ExecutionRegistry};
use crate::config::DispatcherSettings;
use crate::error::{JobError, JobResult};
use crate::job_store::JobStore;
use crate::jobs::{Job, JobStatus};
use crate::sandbox::{ExecutionError, RunReport, SandboxRunner};
use crate::server::metrics;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const RESTART_INTERRUPTED_MESSAGE: &str = "Execution was interrupted by a process restart";

/// What to do with jobs found SCHEDULED or EXECUTING while nothing in this
/// process is running them, typically after a crash or restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RecoveryPolicy {
    /// Reset them to NEW and run them again from scratch.
    #[default]
    Rerun,
    /// Move stale EXECUTING jobs to ERRORED. Stale SCHEDULED jobs never
    /// started, so they are rerun regardless.
    MarkErrored,
}

impl std::fmt::Display for RecoveryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryPolicy::Rerun => write!(f, "rerun"),
            RecoveryPolicy::MarkErrored => write!(f, "mark-errored"),
        }
    }
}

/// Periodically claims eligible jobs and runs them on a bounded worker pool.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    registry: Arc<ExecutionRegistry>,
    runner: Arc<SandboxRunner>,
    settings: DispatcherSettings,

    /// One permit per worker slot.
    workers: Arc<Semaphore>,

    /// Spawned worker tasks, awaited on shutdown.
    tracker: TaskTracker,

    /// Serializes ticks.
    tick_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ExecutionRegistry>,
        runner: Arc<SandboxRunner>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            workers: Arc::new(Semaphore::new(settings.worker_pool_size)),
            store,
            registry,
            runner,
            settings,
            tracker: TaskTracker::new(),
            tick_lock: Mutex::new(()),
        }
    }

    /// Number of free worker slots.
    pub fn idle_workers(&self) -> usize {
        self.workers.available_permits()
    }

    /// Main dispatcher loop. Returns after `shutdown` fires and in-flight runs
    /// have been cancelled and drained.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Starting dispatcher: polling every {:?} with {} workers (recovery policy: {})",
            self.settings.poll_interval,
            self.settings.worker_pool_size,
            self.settings.recovery_policy
        );

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = shutdown.cancelled() => {
                    info!("Dispatcher received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown().await;
        info!("Dispatcher stopped");
    }

    /// One scan-and-claim pass. Returns how many jobs were handed to workers.
    ///
    /// Jobs beyond the free worker slots are left untouched for a later tick.
    pub fn tick(&self) -> usize {
        let _guard = self.tick_lock.lock().unwrap();

        let candidates = match self.store.find_all_by_status_in(&JobStatus::DISPATCHABLE) {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Failed to query dispatchable jobs: {:#}", e);
                return 0;
            }
        };

        let now = Utc::now();
        let mut dispatched = 0;
        for job in candidates {
            if self.registry.contains(job.id) || !job.is_due(now) {
                continue;
            }

            let job_id = job.id;
            let claim = match self.prepare_claim(job) {
                Ok(Some(claim)) => claim,
                Ok(None) => continue,
                Err(e) => {
                    error!("Failed to recover job {}: {}", job_id, e);
                    continue;
                }
            };

            let permit = match Arc::clone(&self.workers).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    debug!("All workers busy, deferring remaining jobs to the next tick");
                    break;
                }
            };

            match self.dispatch(claim, permit) {
                Ok(true) => dispatched += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to dispatch job {}: {}", job_id, e);
                    mark_errored(self.store.as_ref(), job_id, &e.to_string());
                }
            }
        }

        if dispatched > 0 {
            debug!("Dispatched {} jobs", dispatched);
        }
        dispatched
    }

    /// Cancels every in-flight run and waits, within the grace period, for the
    /// workers to record their final state.
    pub async fn shutdown(&self) {
        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            info!("Cancelling {} running jobs", cancelled);
        }

        self.tracker.close();
        if tokio::time::timeout(self.settings.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "{} jobs still running after {:?}",
                self.tracker.len(),
                self.settings.shutdown_grace
            );
        }
    }

    /// Applies the recovery policy to jobs nothing in this process is running.
    /// Returns the job to claim along with the status it is expected to have
    /// in the store.
    fn prepare_claim(&self, mut job: Job) -> JobResult<Option<(Job, JobStatus)>> {
        let stored_status = job.status;
        match stored_status {
            JobStatus::New => {}
            JobStatus::Scheduled => {
                warn!("Job {} was left SCHEDULED, running it again", job.id);
                job.reset_for_recovery()?;
            }
            JobStatus::Executing => match self.settings.recovery_policy {
                RecoveryPolicy::Rerun => {
                    warn!("Job {} was left EXECUTING, running it again", job.id);
                    job.reset_for_recovery()?;
                }
                RecoveryPolicy::MarkErrored => {
                    let output = std::mem::take(&mut job.output);
                    job.fail(output, RESTART_INTERRUPTED_MESSAGE.to_string())?;
                    if self.store.save_if_status(&job, JobStatus::Executing)? {
                        warn!("Job {} was left EXECUTING, marked as ERRORED", job.id);
                        metrics::record_execution_finished(JobStatus::Errored, Duration::ZERO);
                    }
                    return Ok(None);
                }
            },
            _ => return Ok(None),
        }
        Ok(Some((job, stored_status)))
    }

    /// Claims the job, registers it and hands it to a worker. Returns `false`
    /// when the claim was lost to a concurrent change.
    fn dispatch(
        &self,
        (mut job, expected): (Job, JobStatus),
        permit: OwnedSemaphorePermit,
    ) -> JobResult<bool> {
        let job_id = job.id;

        job.schedule()?;
        if !self.store.save_if_status(&job, expected)? {
            debug!("Job {} changed before it could be claimed", job_id);
            return Ok(false);
        }

        let handle = self.registry.register(job_id)?;
        match self.start(&mut job) {
            Ok(true) => {}
            Ok(false) => {
                self.registry.unregister(job_id);
                debug!("Job {} was removed before it could start", job_id);
                return Ok(false);
            }
            Err(e) => {
                self.registry.unregister(job_id);
                return Err(e);
            }
        }

        info!("Executing job {} ({})", job_id, job.name);
        metrics::set_executions_in_flight(self.registry.len());

        let worker = Worker {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            runner: Arc::clone(&self.runner),
        };
        self.tracker.spawn(async move {
            worker.execute(job, handle, permit).await;
        });
        Ok(true)
    }

    fn start(&self, job: &mut Job) -> JobResult<bool> {
        job.start()?;
        Ok(self.store.save_if_status(job, JobStatus::Scheduled)?)
    }
}

/// What a spawned worker task needs to run one job to completion.
struct Worker {
    store: Arc<dyn JobStore>,
    registry: Arc<ExecutionRegistry>,
    runner: Arc<SandboxRunner>,
}

impl Worker {
    async fn execute(self, mut job: Job, handle: ExecutionHandle, _permit: OwnedSemaphorePermit) {
        let job_id = job.id;

        let runner = Arc::clone(&self.runner);
        let code = job.code.clone();
        let io = handle.io.clone();
        let cancel = handle.cancel.clone();
        let result = tokio::task::spawn_blocking(move || runner.run(&code, &io, cancel)).await;

        let finished = match result {
            Ok(report) => apply_report(&mut job, report),
            Err(e) => {
                error!("Job {} panicked: {}", job_id, e);
                job.fail(
                    handle.io.stdout.snapshot(),
                    format!("{}Execution panicked: {}\n", handle.io.stderr.snapshot(), e),
                )
            }
        };

        match finished {
            Ok(()) => self.persist_final(&job),
            Err(e) => {
                error!("Job {} could not be finalized: {}", job_id, e);
                mark_errored(self.store.as_ref(), job_id, &e.to_string());
            }
        }

        self.registry.unregister(job_id);
        metrics::set_executions_in_flight(self.registry.len());
    }

    fn persist_final(&self, job: &Job) {
        let elapsed = job
            .execution_duration(Utc::now())
            .and_then(|duration| duration.to_std().ok())
            .unwrap_or_default();
        match self.store.save_if_status(job, JobStatus::Executing) {
            Ok(true) => {
                info!("Job {} finished as {} in {:?}", job.id, job.status, elapsed);
                metrics::record_execution_finished(job.status, elapsed);
            }
            Ok(false) => {
                info!(
                    "Job {} was removed while executing, discarding its result",
                    job.id
                );
            }
            Err(e) => {
                error!("Failed to persist final state of job {}: {:#}", job.id, e);
            }
        }
    }
}

/// Moves the run's outcome onto the job: success completes it, cancellation
/// stops it, anything else is an error.
fn apply_report(job: &mut Job, report: RunReport) -> JobResult<()> {
    match report.result {
        Ok(()) => job.complete(report.output, report.error),
        Err(ExecutionError::Interrupted) => job.stop(report.output, report.error),
        Err(_) => job.fail(report.output, report.error),
    }
}

/// Best effort: records `reason` on a job the store still shows as EXECUTING.
fn mark_errored(store: &dyn JobStore, job_id: Uuid, reason: &str) {
    let result = store.find_by_id(job_id).map_err(JobError::from).and_then(|job| {
        match job {
            Some(mut job) if job.status == JobStatus::Executing => {
                let output = std::mem::take(&mut job.output);
                let error = format!("{}{}\n", job.error, reason);
                job.fail(output, error)?;
                Ok(store.save_if_status(&job, JobStatus::Executing)?)
            }
            _ => Ok(false),
        }
    });
    match result {
        Ok(true) => warn!("Job {} marked as ERRORED: {}", job_id, reason),
        Ok(false) => debug!("Job {} left for recovery", job_id),
        Err(e) => error!("Failed to mark job {} as ERRORED: {}", job_id, e),
    }
}
