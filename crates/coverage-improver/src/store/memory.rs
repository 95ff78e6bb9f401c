//! In-memory job and repository store.
//!
//! Backs tests and dry runs. Counts job writes and can be switched into a
//! failing mode to exercise store-failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{sort_fifo, JobStore, RepoJobStats, RepositoryStore, StoreError};
use crate::domain::{Job, JobStatus, Repository, RepositoryIdentity};

/// Thread-safe in-memory store implementing both store traits.
#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<String, Job>>,
    repositories: RwLock<HashMap<String, Repository>>,
    job_writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `JobStore::save` calls so far.
    pub fn job_writes(&self) -> usize {
        self.job_writes.load(Ordering::SeqCst)
    }

    /// When set, every operation fails with `StoreError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".into()));
        }
        Ok(())
    }

    fn jobs(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        self.jobs.read().unwrap_or_else(|poisoned| {
            log::warn!("Memory job store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn jobs_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        self.jobs.write().unwrap_or_else(|poisoned| {
            log::warn!("Memory job store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn repositories(&self) -> RwLockReadGuard<'_, HashMap<String, Repository>> {
        self.repositories.read().unwrap_or_else(|poisoned| {
            log::warn!("Memory repository store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn repositories_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Repository>> {
        self.repositories.write().unwrap_or_else(|poisoned| {
            log::warn!("Memory repository store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        self.check()?;
        self.jobs_mut().insert(job.id().to_string(), job.clone());
        self.job_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, StoreError> {
        self.check()?;
        let mut jobs = self.jobs_mut();
        match jobs.get_mut(job.id()) {
            Some(stored) if stored.status() == expected => {
                *stored = job.clone();
                self.job_writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, StoreError> {
        self.check()?;
        Ok(self.jobs().get(id).cloned())
    }

    async fn list(&self, repository_id: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.check()?;
        let mut jobs: Vec<Job> = self
            .jobs()
            .values()
            .filter(|job| repository_id.map_or(true, |id| job.repository_id() == id))
            .cloned()
            .collect();
        sort_fifo(&mut jobs);
        jobs.reverse();
        Ok(jobs)
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        self.check()?;
        let mut jobs: Vec<Job> = self
            .jobs()
            .values()
            .filter(|job| job.status() == status)
            .cloned()
            .collect();
        sort_fifo(&mut jobs);
        Ok(jobs)
    }

    async fn stats_by_repo(
        &self,
        repository_id: Option<&str>,
    ) -> Result<Vec<RepoJobStats>, StoreError> {
        self.check()?;
        let mut stats: BTreeMap<String, RepoJobStats> = BTreeMap::new();
        for job in self.jobs().values() {
            if repository_id.is_some_and(|id| job.repository_id() != id) {
                continue;
            }
            stats
                .entry(job.repository_id().to_string())
                .or_insert_with(|| RepoJobStats::new(job.repository_id()))
                .add(job.status(), 1);
        }
        Ok(stats.into_values().collect())
    }
}

#[async_trait]
impl RepositoryStore for MemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Repository>, StoreError> {
        self.check()?;
        Ok(self.repositories().get(id).cloned())
    }

    async fn find_by_owner_and_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repository>, StoreError> {
        self.check()?;
        Ok(self
            .repositories()
            .values()
            .filter(|repo| repo.owner == owner && repo.name == name)
            .min_by_key(|repo| repo.created_at)
            .cloned())
    }

    async fn find_by_identity(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<Option<Repository>, StoreError> {
        self.check()?;
        Ok(self
            .repositories()
            .values()
            .find(|repo| &repo.identity() == identity)
            .cloned())
    }

    async fn save(&self, repository: &Repository) -> Result<(), StoreError> {
        self.check()?;
        self.repositories_mut()
            .insert(repository.id.clone(), repository.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Repository>, StoreError> {
        self.check()?;
        let mut repositories: Vec<Repository> = self.repositories().values().cloned().collect();
        repositories.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(repositories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Stage;
    use std::path::Path;

    fn running(repository_id: &str) -> Job {
        let mut job = Job::new(repository_id, "a.ts");
        if let Stage::Queued(q) = job.stage() {
            q.mark_running("Started");
        }
        job
    }

    #[tokio::test]
    async fn test_save_and_find_counts_writes() {
        let store = MemoryStore::new();
        let job = Job::new("r1", "a.ts");
        JobStore::save(&store, &job).await.unwrap();

        let found = JobStore::find_by_id(&store, job.id()).await.unwrap();
        assert_eq!(found.as_ref(), Some(&job));
        assert_eq!(store.job_writes(), 1);
    }

    #[tokio::test]
    async fn test_find_incomplete_excludes_terminal_jobs() {
        let store = MemoryStore::new();
        let queued = Job::new("r1", "a.ts");
        let active = running("r2");
        let mut done = running("r3");
        if let Stage::Running(r) = done.stage() {
            r.mark_failed("Boom");
        }
        for job in [&queued, &active, &done] {
            JobStore::save(&store, job).await.unwrap();
        }

        let incomplete = store.find_incomplete().await.unwrap();
        let ids: Vec<&str> = incomplete.iter().map(|j| j.id()).collect();
        assert_eq!(incomplete.len(), 2);
        assert!(ids.contains(&queued.id()));
        assert!(ids.contains(&active.id()));
    }

    #[tokio::test]
    async fn test_save_if_status_checks_stored_status() {
        let store = MemoryStore::new();
        let queued = Job::new("r1", "a.ts");
        JobStore::save(&store, &queued).await.unwrap();

        let mut claimed = queued.clone();
        if let Stage::Queued(q) = claimed.stage() {
            q.mark_running("Started");
        }
        assert!(store.save_if_status(&claimed, JobStatus::Queued).await.unwrap());
        assert!(!store.save_if_status(&claimed, JobStatus::Queued).await.unwrap());
        assert!(!store
            .save_if_status(&running("r2"), JobStatus::Running)
            .await
            .unwrap());

        let stored = JobStore::find_by_id(&store, queued.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), JobStatus::Running);
        assert_eq!(store.job_writes(), 2);
    }

    #[tokio::test]
    async fn test_stats_by_repo() {
        let store = MemoryStore::new();
        JobStore::save(&store, &Job::new("r1", "a.ts")).await.unwrap();
        JobStore::save(&store, &running("r1")).await.unwrap();
        JobStore::save(&store, &Job::new("r2", "b.ts")).await.unwrap();

        let stats = store.stats_by_repo(Some("r1")).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].queued, 1);
        assert_eq!(stats[0].running, 1);
        assert_eq!(stats[0].open, 2);

        assert_eq!(store.stats_by_repo(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(matches!(
            JobStore::save(&store, &Job::new("r1", "a.ts")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.job_writes(), 0);

        store.set_failing(false);
        assert!(store.find_incomplete().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repository_lookup() {
        let store = MemoryStore::new();
        let repo = Repository::new(
            RepositoryIdentity::upstream("acme", "widgets"),
            Path::new("/ws"),
        );
        RepositoryStore::save(&store, &repo).await.unwrap();

        let by_name = store.find_by_owner_and_name("acme", "widgets").await.unwrap();
        assert_eq!(by_name.map(|r| r.id), Some(repo.id.clone()));

        let by_identity = store.find_by_identity(&repo.identity()).await.unwrap();
        assert!(by_identity.is_some());

        let other = RepositoryIdentity {
            fork_mode: true,
            ..repo.identity()
        };
        assert!(store.find_by_identity(&other).await.unwrap().is_none());
    }
}
