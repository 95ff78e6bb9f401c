//! Storage interfaces for jobs and repositories.
//!
//! The scheduler, processor and service only see these traits. Two adapters
//! exist: [`crate::db::SqliteStore`] for durable storage and [`MemoryStore`]
//! for tests and ephemeral runs.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::domain::{Job, JobStatus, Repository, RepositoryIdentity};

pub mod memory;

pub use memory::MemoryStore;

/// Errors raised by a store adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Corrupt record '{id}': {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Per-repository job counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoJobStats {
    pub repository_id: String,
    pub queued: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
    /// Queued plus running.
    pub open: u64,
}

impl RepoJobStats {
    pub fn new(repository_id: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            ..Default::default()
        }
    }

    /// Adds `count` jobs in `status` to the tally.
    pub fn add(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Queued => self.queued += count,
            JobStatus::Running => self.running += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
        }
        self.total += count;
        self.open = self.queued + self.running;
    }
}

/// Durable repository of improvement jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts or fully replaces a job.
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    /// Replaces a stored job only while its stored status is still
    /// `expected`. Returns `false`, writing nothing, when another writer has
    /// moved it on or the job does not exist.
    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Lists jobs, newest first, optionally restricted to one repository.
    async fn list(&self, repository_id: Option<&str>) -> Result<Vec<Job>, StoreError>;

    /// Jobs in `status`, oldest first.
    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError>;

    /// Queued and running jobs, oldest first.
    async fn find_incomplete(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs = self.find_by_status(JobStatus::Queued).await?;
        jobs.extend(self.find_by_status(JobStatus::Running).await?);
        sort_fifo(&mut jobs);
        Ok(jobs)
    }

    async fn stats_by_repo(
        &self,
        repository_id: Option<&str>,
    ) -> Result<Vec<RepoJobStats>, StoreError>;
}

/// Durable repository of target repositories.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Repository>, StoreError>;

    /// First repository with this owner and name, whatever its fork settings.
    async fn find_by_owner_and_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repository>, StoreError>;

    async fn find_by_identity(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<Option<Repository>, StoreError>;

    /// Inserts or updates a repository.
    async fn save(&self, repository: &Repository) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<Repository>, StoreError>;
}

/// Orders jobs by creation time, breaking ties by id.
pub fn sort_fifo(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
}
