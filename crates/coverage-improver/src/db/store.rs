//! SQLite-backed implementation of the store traits.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use super::job_repo::{self, JobRow};
use super::repository_repo::{self, RepositoryRow};
use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::domain::{Job, JobRecord, JobStatus, LogEntry, Repository, RepositoryIdentity};
use crate::store::{JobStore, RepoJobStats, RepositoryStore, StoreError};

/// Durable store over a [`Database`].
///
/// rusqlite calls block, so every query runs on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Unavailable(format!("database task failed: {}", e)))?
    }
}

fn job_to_row(job: &Job) -> Result<JobRow, StoreError> {
    let log = serde_json::to_string(job.log()).map_err(|e| DatabaseError::Json {
        column: "log",
        source: e,
    })?;
    Ok(JobRow {
        id: job.id().to_string(),
        repository_id: job.repository_id().to_string(),
        target_path: job.target_path().to_string(),
        status: job.status().as_str().to_string(),
        result_artifact: job.result_artifact().map(String::from),
        log,
        created_at: format_timestamp(job.created_at()),
        updated_at: format_timestamp(job.updated_at()),
    })
}

fn job_from_row(row: JobRow) -> Result<Job, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        id: row.id.clone(),
        reason,
    };
    let status = JobStatus::parse(&row.status)
        .ok_or_else(|| corrupt(format!("unknown status '{}'", row.status)))?;
    let log: Vec<LogEntry> =
        serde_json::from_str(&row.log).map_err(|e| corrupt(format!("bad log: {}", e)))?;
    let created_at = parse_timestamp(&row.created_at).map_err(corrupt)?;
    let updated_at = parse_timestamp(&row.updated_at).map_err(corrupt)?;

    Ok(Job::from(JobRecord {
        id: row.id,
        repository_id: row.repository_id,
        target_path: row.target_path,
        status,
        result_artifact: row.result_artifact,
        log,
        created_at,
        updated_at,
    }))
}

fn repository_to_row(repo: &Repository) -> RepositoryRow {
    RepositoryRow {
        id: repo.id.clone(),
        owner: repo.owner.clone(),
        name: repo.name.clone(),
        fork_mode: repo.fork_mode,
        fork_owner: repo.fork_owner.clone(),
        fork_org: repo.fork_org.clone(),
        path: repo.path.to_string_lossy().into_owned(),
        created_at: format_timestamp(repo.created_at),
        updated_at: format_timestamp(repo.updated_at),
    }
}

fn repository_from_row(row: RepositoryRow) -> Result<Repository, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        id: row.id.clone(),
        reason,
    };
    let created_at = parse_timestamp(&row.created_at).map_err(corrupt)?;
    let updated_at = parse_timestamp(&row.updated_at).map_err(corrupt)?;
    Ok(Repository {
        id: row.id,
        owner: row.owner,
        name: row.name,
        fork_mode: row.fork_mode,
        fork_owner: row.fork_owner.filter(|s| !s.is_empty()),
        fork_org: row.fork_org.filter(|s| !s.is_empty()),
        path: PathBuf::from(row.path),
        created_at,
        updated_at,
    })
}

fn jobs_from_rows(rows: Vec<JobRow>) -> Result<Vec<Job>, StoreError> {
    rows.into_iter().map(job_from_row).collect()
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let row = job_to_row(job)?;
        self.blocking(move |db| Ok(job_repo::upsert(db, &row)?))
            .await
    }

    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, StoreError> {
        let row = job_to_row(job)?;
        self.blocking(move |db| Ok(job_repo::update_if_status(db, &row, expected.as_str())?))
            .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let id = id.to_string();
        self.blocking(move |db| job_repo::find_by_id(db, &id)?.map(job_from_row).transpose())
            .await
    }

    async fn list(&self, repository_id: Option<&str>) -> Result<Vec<Job>, StoreError> {
        let repository_id = repository_id.map(String::from);
        self.blocking(move |db| jobs_from_rows(job_repo::list(db, repository_id.as_deref())?))
            .await
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        self.blocking(move |db| {
            jobs_from_rows(job_repo::find_by_statuses(db, &[status.as_str()])?)
        })
        .await
    }

    async fn find_incomplete(&self) -> Result<Vec<Job>, StoreError> {
        self.blocking(|db| {
            jobs_from_rows(job_repo::find_by_statuses(
                db,
                &[JobStatus::Queued.as_str(), JobStatus::Running.as_str()],
            )?)
        })
        .await
    }

    async fn stats_by_repo(
        &self,
        repository_id: Option<&str>,
    ) -> Result<Vec<RepoJobStats>, StoreError> {
        let repository_id = repository_id.map(String::from);
        let counts = self
            .blocking(move |db| {
                Ok(job_repo::count_by_repository_and_status(
                    db,
                    repository_id.as_deref(),
                )?)
            })
            .await?;
        let mut stats: BTreeMap<String, RepoJobStats> = BTreeMap::new();
        for count in counts {
            let status = JobStatus::parse(&count.status).ok_or_else(|| StoreError::Corrupt {
                id: count.repository_id.clone(),
                reason: format!("unknown status '{}'", count.status),
            })?;
            stats
                .entry(count.repository_id.clone())
                .or_insert_with(|| RepoJobStats::new(&count.repository_id))
                .add(status, count.count);
        }
        Ok(stats.into_values().collect())
    }
}

#[async_trait]
impl RepositoryStore for SqliteStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Repository>, StoreError> {
        let id = id.to_string();
        self.blocking(move |db| {
            repository_repo::find_by_id(db, &id)?
                .map(repository_from_row)
                .transpose()
        })
        .await
    }

    async fn find_by_owner_and_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repository>, StoreError> {
        let (owner, name) = (owner.to_string(), name.to_string());
        self.blocking(move |db| {
            repository_repo::find_by_owner_and_name(db, &owner, &name)?
                .map(repository_from_row)
                .transpose()
        })
        .await
    }

    async fn find_by_identity(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<Option<Repository>, StoreError> {
        let identity = identity.clone();
        self.blocking(move |db| {
            repository_repo::find_by_identity(
                db,
                &identity.owner,
                &identity.name,
                identity.fork_mode,
                identity.fork_owner.as_deref(),
                identity.fork_org.as_deref(),
            )?
            .map(repository_from_row)
            .transpose()
        })
        .await
    }

    async fn save(&self, repository: &Repository) -> Result<(), StoreError> {
        let row = repository_to_row(repository);
        self.blocking(move |db| Ok(repository_repo::upsert(db, &row)?))
            .await
    }

    async fn list(&self) -> Result<Vec<Repository>, StoreError> {
        self.blocking(|db| {
            repository_repo::list(db)?
                .into_iter()
                .map(repository_from_row)
                .collect()
        })
        .await
    }
}
