//! Worker that pretends to open a pull request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{AiWorker, WorkerError, WorkerOutcome, WorkerRequest};

/// Returns a fabricated pull request URL without touching the repository.
/// Useful for exercising the scheduler end to end.
#[derive(Debug, Default)]
pub struct DryRunWorker {
    delay: Duration,
    next_number: AtomicU64,
}

impl DryRunWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` before answering, to mimic a slow tool.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            next_number: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl AiWorker for DryRunWorker {
    async fn run(&self, request: &WorkerRequest) -> Result<WorkerOutcome, WorkerError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let number = self.next_number.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!(
            "[dry run] Would improve {} in {}/{}",
            request.target_path,
            request.owner,
            request.repository_name
        );
        Ok(WorkerOutcome::succeeded(format!(
            "Dry run for {}\nhttps://github.com/{}/{}/pull/{}",
            request.target_path, request.owner, request.repository_name, number
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_fabricates_numbered_pull_requests() {
        let worker = DryRunWorker::new();
        let request = WorkerRequest {
            repository_path: PathBuf::from("/ws/widgets"),
            target_path: "src/a.ts".to_string(),
            owner: "bot".to_string(),
            repository_name: "widgets".to_string(),
        };

        let first = worker.run(&request).await.unwrap();
        let second = worker.run(&request).await.unwrap();
        assert!(first.success);
        assert!(first.output.ends_with("https://github.com/bot/widgets/pull/1"));
        assert!(second.output.ends_with("/pull/2"));
    }
}
