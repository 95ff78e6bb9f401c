//! Scheduler test harness.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use coverage_improver::domain::{Job, JobStatus, Repository, RepositoryIdentity};
use coverage_improver::store::RepoJobStats;
use coverage_improver::{
    AiWorker, JobProcessor, JobStore, MemoryStore, RepositoryStore, Scheduler, SchedulerConfig,
    StoreError,
};

/// In-memory store, processor and scheduler sharing one worker.
pub struct Harness<W> {
    pub store: Arc<MemoryStore>,
    pub worker: Arc<W>,
    pub processor: Arc<JobProcessor>,
    pub scheduler: Arc<Scheduler>,
}

pub fn harness<W: AiWorker + 'static>(worker: W, config: SchedulerConfig) -> Harness<W> {
    let store = Arc::new(MemoryStore::new());
    let worker = Arc::new(worker);
    let processor = Arc::new(JobProcessor::new(
        store.clone(),
        store.clone(),
        worker.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        Arc::clone(&processor),
        config,
    ));
    Harness {
        store,
        worker,
        processor,
        scheduler,
    }
}

impl<W> Harness<W> {
    pub async fn add_repository(&self, owner: &str, name: &str) -> Repository {
        let repository = Repository::new(
            RepositoryIdentity::upstream(owner, name),
            Path::new("/workspaces"),
        );
        RepositoryStore::save(self.store.as_ref(), &repository)
            .await
            .unwrap();
        repository
    }

    pub async fn job(&self, id: &str) -> Job {
        JobStore::find_by_id(self.store.as_ref(), id)
            .await
            .unwrap()
            .expect("job should exist")
    }

    pub async fn status(&self, id: &str) -> JobStatus {
        self.job(id).await.status()
    }

    /// Running jobs per repository id, for checking the exclusivity rule.
    pub async fn running_per_repository(&self) -> Vec<(String, usize)> {
        let running = self.store.find_by_status(JobStatus::Running).await.unwrap();
        let mut counts: Vec<(String, usize)> = Vec::new();
        for job in running {
            match counts.iter_mut().find(|(id, _)| id == job.repository_id()) {
                Some((_, count)) => *count += 1,
                None => counts.push((job.repository_id().to_string(), 1)),
            }
        }
        counts
    }
}

/// Job store whose `find_incomplete` waits for the test to open a gate.
pub struct GatedStore {
    pub inner: Arc<MemoryStore>,
    pub entered: Semaphore,
    pub gate: Semaphore,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            entered: Semaphore::new(0),
            gate: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl JobStore for GatedStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        JobStore::save(self.inner.as_ref(), job).await
    }

    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, StoreError> {
        self.inner.save_if_status(job, expected).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, StoreError> {
        JobStore::find_by_id(self.inner.as_ref(), id).await
    }

    async fn list(&self, repository_id: Option<&str>) -> Result<Vec<Job>, StoreError> {
        JobStore::list(self.inner.as_ref(), repository_id).await
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        self.inner.find_by_status(status).await
    }

    async fn find_incomplete(&self) -> Result<Vec<Job>, StoreError> {
        self.entered.add_permits(1);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.inner.find_incomplete().await
    }

    async fn stats_by_repo(
        &self,
        repository_id: Option<&str>,
    ) -> Result<Vec<RepoJobStats>, StoreError> {
        self.inner.stats_by_repo(repository_id).await
    }
}
