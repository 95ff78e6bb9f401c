//! Runs a single improvement job through the AI worker.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::Instrument;

use crate::domain::{Job, JobStatus, RunningJob, Stage};
use crate::store::{JobStore, RepositoryStore, StoreError};
use crate::worker::{AiWorker, WorkerError, WorkerOutcome, WorkerRequest};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Repository '{repository_id}' of job '{job_id}' not found")]
    RepositoryNotFound {
        job_id: String,
        repository_id: String,
    },

    #[error("Job '{id}' already finished as {status}")]
    AlreadyFinished { id: String, status: JobStatus },

    #[error("Job '{0}' is already running")]
    AlreadyRunning(String),

    /// The stored job left `running` while the worker was busy; the
    /// worker's result was discarded.
    #[error("Job '{0}' was settled by another writer")]
    Superseded(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Drives one job from `running` to a terminal status.
pub struct JobProcessor {
    jobs: Arc<dyn JobStore>,
    repositories: Arc<dyn RepositoryStore>,
    worker: Arc<dyn AiWorker>,
    worker_timeout: Option<Duration>,
}

impl JobProcessor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        repositories: Arc<dyn RepositoryStore>,
        worker: Arc<dyn AiWorker>,
    ) -> Self {
        Self {
            jobs,
            repositories,
            worker,
            worker_timeout: None,
        }
    }

    /// Aborts the worker and fails the job if it runs longer than `timeout`.
    pub fn with_worker_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// Claims a queued job, runs it and returns its terminal status.
    ///
    /// Jobs that are already running belong to whoever claimed them and are
    /// rejected. Every outcome of the worker, including a panic or a
    /// timeout, ends in at most one terminal write, and only while the stored
    /// job is still `running`.
    pub async fn execute(&self, job_id: &str) -> Result<JobStatus, ProcessError> {
        let span = tracing::info_span!("execute_job", job_id = %job_id);
        self.execute_inner(job_id, false).instrument(span).await
    }

    /// Runs a job the scheduler has already moved to `running`.
    pub(crate) async fn execute_claimed(&self, job_id: &str) -> Result<JobStatus, ProcessError> {
        let span = tracing::info_span!("execute_job", job_id = %job_id);
        self.execute_inner(job_id, true).instrument(span).await
    }

    async fn execute_inner(&self, job_id: &str, claimed: bool) -> Result<JobStatus, ProcessError> {
        let mut job = self
            .jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| ProcessError::NotFound(job_id.to_string()))?;

        let claim_now = match job.stage() {
            Stage::Queued(queued) => {
                queued.mark_running("Processing started");
                true
            }
            Stage::Running(_) if claimed => false,
            Stage::Running(_) => return Err(ProcessError::AlreadyRunning(job_id.to_string())),
            Stage::Finished(status) => {
                return Err(ProcessError::AlreadyFinished {
                    id: job_id.to_string(),
                    status,
                })
            }
        };
        if claim_now && !self.jobs.save_if_status(&job, JobStatus::Queued).await? {
            return Err(ProcessError::AlreadyRunning(job_id.to_string()));
        }

        let repository_id = job.repository_id().to_string();
        let repository = match self.repositories.find_by_id(&repository_id).await? {
            Some(repository) => repository,
            None => {
                log::warn!("Repository {} for job {} is gone", repository_id, job_id);
                if let Stage::Running(running) = job.stage() {
                    running.mark_failed(format!("Repository {} not found", repository_id));
                }
                self.persist_terminal(&job).await?;
                return Err(ProcessError::RepositoryNotFound {
                    job_id: job_id.to_string(),
                    repository_id,
                });
            }
        };

        let request = WorkerRequest {
            repository_path: repository.path.clone(),
            target_path: job.target_path().to_string(),
            owner: repository.effective_owner().to_string(),
            repository_name: repository.name.clone(),
        };
        log::info!(
            "Improving coverage of {} in {}/{}",
            request.target_path,
            request.owner,
            request.repository_name
        );

        let result = self.run_worker(request).await;

        if let Stage::Running(running) = job.stage() {
            settle(running, result);
        }
        self.persist_terminal(&job).await?;

        match job.status() {
            JobStatus::Completed => log::info!(
                "Job {} completed: {}",
                job_id,
                job.result_artifact().unwrap_or_default()
            ),
            status => log::warn!("Job {} finished as {}", job_id, status),
        }
        Ok(job.status())
    }

    async fn persist_terminal(&self, job: &Job) -> Result<(), ProcessError> {
        if self.jobs.save_if_status(job, JobStatus::Running).await? {
            return Ok(());
        }
        log::warn!(
            "Job {} left running while the worker was busy, dropping its {} result",
            job.id(),
            job.status()
        );
        Err(ProcessError::Superseded(job.id().to_string()))
    }

    /// Runs the worker on its own task so a panic surfaces as an error.
    async fn run_worker(&self, request: WorkerRequest) -> Result<WorkerOutcome, WorkerError> {
        let worker = Arc::clone(&self.worker);
        let mut handle =
            tokio::spawn(async move { worker.run(&request).await }.in_current_span());

        let joined = match self.worker_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(WorkerError::TimedOut(limit));
                }
            },
            None => handle.await,
        };
        joined.map_err(|e| WorkerError::Crashed(e.to_string()))?
    }
}

/// Applies the terminal transition for a worker result.
fn settle(running: RunningJob<'_>, result: Result<WorkerOutcome, WorkerError>) {
    match result {
        Ok(WorkerOutcome {
            success: true,
            output,
        }) => match extract_artifact(&output) {
            Some(url) => {
                let note = format!("Pull request opened at {}", url);
                running.mark_completed(Some(url), note);
            }
            None => running.mark_failed("Worker reported success without a pull request URL"),
        },
        Ok(WorkerOutcome {
            success: false,
            output,
        }) if output.trim().is_empty() => running.mark_failed("Worker failed without output"),
        Ok(WorkerOutcome {
            success: false,
            output,
        }) => running.mark_failed(format!("Worker failed: {}", output.trim())),
        Err(e) => running.mark_failed(format!("Worker error: {}", e)),
    }
}

/// The artifact is the last non-empty line of the worker's output.
pub fn extract_artifact(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(String::from)
}
