pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod github;
pub mod logging;
pub mod processor;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod worker;

pub use config::{load_config, load_config_with_env, Config};
pub use db::{Database, SqliteStore};
pub use domain::{Job, JobStatus, Repository, RepositoryIdentity};
pub use error::{ConfigError, CoverageError, Result};
pub use processor::{JobProcessor, ProcessError};
pub use scheduler::{DispatchPolicy, Scheduler, SchedulerConfig, TickOutcome, TickReport};
pub use service::{CoverageService, RepositorySummary, ServiceError};
pub use store::{JobStore, MemoryStore, RepositoryStore, StoreError};
pub use worker::{AiWorker, CommandWorker, DryRunWorker, WorkerError, WorkerOutcome, WorkerRequest};
