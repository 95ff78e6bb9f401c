//! AI worker interface and adapters.
//!
//! A worker performs the actual coverage improvement for one file and reports
//! back with a success flag and its textual output. On success the output is
//! expected to end with the pull request URL.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod command;
pub mod dry_run;

pub use command::CommandWorker;
pub use dry_run::DryRunWorker;

/// Input handed to a worker for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
    /// Local checkout of the repository.
    pub repository_path: PathBuf,
    /// File to improve, relative to `repository_path`.
    pub target_path: String,
    /// Owner the pull request should be opened from.
    pub owner: String,
    pub repository_name: String,
}

/// What a worker reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub success: bool,
    pub output: String,
}

impl WorkerOutcome {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace unavailable at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Worker crashed: {0}")]
    Crashed(String),

    #[error("Invalid command template: {0}")]
    InvalidTemplate(String),
}

/// Performs the improvement for a single job.
#[async_trait]
pub trait AiWorker: Send + Sync {
    async fn run(&self, request: &WorkerRequest) -> Result<WorkerOutcome, WorkerError>;
}
