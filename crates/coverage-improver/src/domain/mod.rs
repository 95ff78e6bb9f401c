//! Domain entities.

pub mod job;
pub mod repository;

pub use job::{Job, JobRecord, JobStatus, LogEntry, QueuedJob, RunningJob, Stage};
pub use repository::{Repository, RepositoryIdentity};
