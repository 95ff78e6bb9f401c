//! Submission and query operations for clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::ForkConfig;
use crate::domain::{Job, Repository};
use crate::github::{self, InvalidUrl, RepoRef};
use crate::scheduler::Scheduler;
use crate::store::{JobStore, RepoJobStats, RepositoryStore, StoreError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    InvalidUrl(#[from] InvalidUrl),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A repository with its job counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySummary {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub effective_owner: String,
    pub https_url: String,
    pub ssh_url: String,
    /// Working checkout the worker runs in.
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub open_jobs: u64,
    pub queued_jobs: u64,
    pub total_jobs: u64,
}

impl RepositorySummary {
    fn new(repository: &Repository, stats: Option<&RepoJobStats>) -> Self {
        let upstream = RepoRef::new(&repository.owner, &repository.name);
        Self {
            id: repository.id.clone(),
            owner: repository.owner.clone(),
            name: repository.name.clone(),
            effective_owner: repository.effective_owner().to_string(),
            https_url: upstream.https_url(),
            ssh_url: upstream.ssh_url(),
            path: repository.path.clone(),
            created_at: repository.created_at,
            updated_at: repository.updated_at,
            open_jobs: stats.map_or(0, |s| s.open),
            queued_jobs: stats.map_or(0, |s| s.queued),
            total_jobs: stats.map_or(0, |s| s.total),
        }
    }
}

pub struct CoverageService {
    jobs: Arc<dyn JobStore>,
    repositories: Arc<dyn RepositoryStore>,
    scheduler: Arc<Scheduler>,
    fork: ForkConfig,
    workspace_root: PathBuf,
}

impl CoverageService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        repositories: Arc<dyn RepositoryStore>,
        scheduler: Arc<Scheduler>,
        fork: ForkConfig,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            jobs,
            repositories,
            scheduler,
            fork,
            workspace_root,
        }
    }

    /// Queues an improvement of `target_path` in a known repository.
    pub async fn submit_job(
        &self,
        repository_id: &str,
        target_path: &str,
    ) -> Result<Job, ServiceError> {
        let target_path = target_path.trim();
        if target_path.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "target path must not be empty".to_string(),
            ));
        }
        if Path::new(target_path).is_absolute() {
            return Err(ServiceError::InvalidRequest(format!(
                "target path must be relative to the repository root: {}",
                target_path
            )));
        }
        if self.repositories.find_by_id(repository_id).await?.is_none() {
            return Err(ServiceError::RepositoryNotFound(repository_id.to_string()));
        }

        Ok(self.scheduler.enqueue(repository_id, target_path).await?)
    }

    pub async fn get_job(&self, id: &str) -> Result<Job, ServiceError> {
        self.jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::JobNotFound(id.to_string()))
    }

    /// Jobs newest first, optionally for one repository.
    pub async fn list_jobs(&self, repository_id: Option<&str>) -> Result<Vec<Job>, ServiceError> {
        Ok(self.jobs.list(repository_id).await?)
    }

    /// Returns the repository record for `url` under the configured fork
    /// settings, creating it on first use.
    pub async fn ensure_repository(&self, url: &str) -> Result<Repository, ServiceError> {
        let repo_ref = github::parse_repository_url(url)?;
        let identity = self.fork.identity(&repo_ref.owner, &repo_ref.name);

        let repository = match self.repositories.find_by_identity(&identity).await? {
            Some(mut existing) => {
                existing.touch();
                existing
            }
            None => {
                let created = Repository::new(identity, &self.workspace_root);
                log::info!(
                    "Registered repository {}/{} as {}",
                    created.owner,
                    created.name,
                    created.id
                );
                created
            }
        };
        self.repositories.save(&repository).await?;
        Ok(repository)
    }

    pub async fn get_repository(&self, id: &str) -> Result<RepositorySummary, ServiceError> {
        let repository = self
            .repositories
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::RepositoryNotFound(id.to_string()))?;
        let stats = self.jobs.stats_by_repo(Some(id)).await?;
        Ok(RepositorySummary::new(&repository, stats.first()))
    }

    pub async fn list_repositories(&self) -> Result<Vec<RepositorySummary>, ServiceError> {
        let repositories = self.repositories.list().await?;
        let stats = self.jobs.stats_by_repo(None).await?;
        Ok(repositories
            .iter()
            .map(|repository| {
                let repo_stats = stats.iter().find(|s| s.repository_id == repository.id);
                RepositorySummary::new(repository, repo_stats)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use crate::processor::JobProcessor;
    use crate::scheduler::SchedulerConfig;
    use crate::store::MemoryStore;
    use crate::worker::DryRunWorker;

    fn service_with(fork: ForkConfig) -> (Arc<MemoryStore>, CoverageService) {
        let store = Arc::new(MemoryStore::new());
        let processor = Arc::new(JobProcessor::new(
            store.clone(),
            store.clone(),
            Arc::new(DryRunWorker::new()),
        ));
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            processor,
            SchedulerConfig::default(),
        ));
        let service = CoverageService::new(
            store.clone(),
            store.clone(),
            scheduler,
            fork,
            PathBuf::from("/ws"),
        );
        (store, service)
    }

    fn service() -> (Arc<MemoryStore>, CoverageService) {
        service_with(ForkConfig::default())
    }

    #[tokio::test]
    async fn test_ensure_repository_is_idempotent() {
        let (_store, service) = service();
        let first = service
            .ensure_repository("https://github.com/acme/widgets")
            .await
            .unwrap();
        let second = service
            .ensure_repository("git@github.com:acme/widgets.git")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(service.list_repositories().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fork_configurations_get_separate_records() {
        let (store, upstream_service) = service();
        let upstream = upstream_service
            .ensure_repository("https://github.com/acme/widgets")
            .await
            .unwrap();

        let fork_service = CoverageService::new(
            store.clone(),
            store.clone(),
            upstream_service.scheduler.clone(),
            ForkConfig {
                enabled: true,
                owner: Some("bot".to_string()),
                org: None,
            },
            PathBuf::from("/ws"),
        );
        let fork = fork_service
            .ensure_repository("https://github.com/acme/widgets")
            .await
            .unwrap();

        assert_ne!(upstream.id, fork.id);
        assert_ne!(upstream.path, fork.path);
        assert_eq!(fork.effective_owner(), "bot");
    }

    #[tokio::test]
    async fn test_ensure_repository_rejects_bad_url() {
        let (_store, service) = service();
        let result = service.ensure_repository("ftp://example.com/x").await;
        assert!(matches!(result, Err(ServiceError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_submit_job_validates_input() {
        let (store, service) = service();
        let repo = service
            .ensure_repository("https://github.com/acme/widgets")
            .await
            .unwrap();

        assert!(matches!(
            service.submit_job(&repo.id, "  ").await,
            Err(ServiceError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.submit_job(&repo.id, "/etc/passwd").await,
            Err(ServiceError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.submit_job("missing", "src/a.ts").await,
            Err(ServiceError::RepositoryNotFound(_))
        ));
        assert_eq!(store.job_writes(), 0);

        let job = service.submit_job(&repo.id, "src/a.ts").await.unwrap();
        assert_eq!(job.status(), JobStatus::Queued);
        assert_eq!(service.get_job(job.id()).await.unwrap(), job);
    }

    #[tokio::test]
    async fn test_repository_summary_counts_jobs() {
        let (_store, service) = service();
        let repo = service
            .ensure_repository("https://github.com/acme/widgets")
            .await
            .unwrap();
        service.submit_job(&repo.id, "src/a.ts").await.unwrap();
        service.submit_job(&repo.id, "src/b.ts").await.unwrap();

        let summary = service.get_repository(&repo.id).await.unwrap();
        assert_eq!(summary.queued_jobs, 2);
        assert_eq!(summary.open_jobs, 2);
        assert_eq!(summary.total_jobs, 2);
        assert_eq!(summary.https_url, "https://github.com/acme/widgets");
        assert_eq!(summary.ssh_url, "git@github.com:acme/widgets.git");
        assert_eq!(summary.path, repo.path);

        assert_eq!(service.list_jobs(Some(&repo.id)).await.unwrap().len(), 2);
        assert!(matches!(
            service.get_job("nope").await,
            Err(ServiceError::JobNotFound(_))
        ));
        assert!(matches!(
            service.get_repository("nope").await,
            Err(ServiceError::RepositoryNotFound(_))
        ));
    }
}
