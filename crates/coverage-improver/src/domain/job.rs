//! Improvement job entity and its lifecycle.
//!
//! A job moves `queued → running → completed | failed`, or directly
//! `queued → failed`. The legal transitions are only reachable through the
//! stage handles returned by [`Job::stage`], so an illegal edge cannot be
//! expressed. Transitions change the in-memory entity only; callers persist.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an improvement job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Storage representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parses the storage representation. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Returns true for `completed` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped line of a job's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    fn now(message: String) -> Self {
        Self {
            at: Utc::now(),
            message,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            self.message
        )
    }
}

/// Persisted shape of a job, used by store adapters to rehydrate entities.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: String,
    pub repository_id: String,
    pub target_path: String,
    pub status: JobStatus,
    pub result_artifact: Option<String>,
    pub log: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A request to improve test coverage for one file of a repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    id: String,
    repository_id: String,
    target_path: String,
    status: JobStatus,
    result_artifact: Option<String>,
    log: Vec<LogEntry>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a queued job with a single creation log entry.
    pub fn new(repository_id: impl Into<String>, target_path: impl Into<String>) -> Self {
        let target_path = target_path.into();
        let entry = LogEntry::now(format!("Job created for {}", target_path));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            repository_id: repository_id.into(),
            target_path,
            status: JobStatus::Queued,
            result_artifact: None,
            created_at: entry.at,
            updated_at: entry.at,
            log: vec![entry],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn result_artifact(&self) -> Option<&str> {
        self.result_artifact.as_deref()
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the current lifecycle stage with the transitions legal from it.
    pub fn stage(&mut self) -> Stage<'_> {
        match self.status {
            JobStatus::Queued => Stage::Queued(QueuedJob(self)),
            JobStatus::Running => Stage::Running(RunningJob(self)),
            status => Stage::Finished(status),
        }
    }

    /// Copies the entity into its persisted shape.
    pub fn to_record(&self) -> JobRecord {
        JobRecord {
            id: self.id.clone(),
            repository_id: self.repository_id.clone(),
            target_path: self.target_path.clone(),
            status: self.status,
            result_artifact: self.result_artifact.clone(),
            log: self.log.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn transition(&mut self, status: JobStatus, note: String) {
        let entry = LogEntry::now(note);
        self.status = status;
        self.updated_at = entry.at;
        self.log.push(entry);
    }
}

impl From<JobRecord> for Job {
    fn from(record: JobRecord) -> Self {
        Self {
            id: record.id,
            repository_id: record.repository_id,
            target_path: record.target_path,
            status: record.status,
            result_artifact: record.result_artifact,
            log: record.log,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Lifecycle stage of a job, borrowed mutably for a single transition.
#[derive(Debug)]
pub enum Stage<'a> {
    Queued(QueuedJob<'a>),
    Running(RunningJob<'a>),
    Finished(JobStatus),
}

/// A job waiting to be picked up.
#[derive(Debug)]
pub struct QueuedJob<'a>(&'a mut Job);

impl QueuedJob<'_> {
    pub fn mark_running(self, note: impl Into<String>) {
        self.0.transition(JobStatus::Running, note.into());
    }

    pub fn mark_failed(self, note: impl Into<String>) {
        self.0.transition(JobStatus::Failed, note.into());
    }
}

/// A job currently handed to a worker.
#[derive(Debug)]
pub struct RunningJob<'a>(&'a mut Job);

impl RunningJob<'_> {
    pub fn mark_completed(self, artifact: Option<String>, note: impl Into<String>) {
        self.0.result_artifact = artifact;
        self.0.transition(JobStatus::Completed, note.into());
    }

    pub fn mark_failed(self, note: impl Into<String>) {
        self.0.transition(JobStatus::Failed, note.into());
    }
}
