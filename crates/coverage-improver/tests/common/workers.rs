//! Fake AI workers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use coverage_improver::{AiWorker, WorkerError, WorkerOutcome, WorkerRequest};

/// Blocks every call until the test releases it, then reports a pull
/// request numbered by call order.
pub struct GatedWorker {
    gate: Semaphore,
    calls: AtomicUsize,
    finished: AtomicUsize,
}

impl GatedWorker {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    /// Lets `n` blocked (or future) calls complete.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Waits until at least `n` calls have reached the gate.
    pub async fn wait_for_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("worker was never called");
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiWorker for GatedWorker {
    async fn run(&self, _request: &WorkerRequest) -> Result<WorkerOutcome, WorkerError> {
        let number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| WorkerError::Crashed(e.to_string()))?;
        permit.forget();
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(WorkerOutcome::succeeded(format!("https://pr/{}", number)))
    }
}

/// Returns the same answer on every call and records the requests.
pub struct ScriptedWorker {
    success: bool,
    output: String,
    requests: std::sync::Mutex<Vec<WorkerRequest>>,
}

impl ScriptedWorker {
    pub fn succeeding(output: &str) -> Self {
        Self {
            success: true,
            output: output.to_string(),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing(output: &str) -> Self {
        Self {
            success: false,
            ..Self::succeeding(output)
        }
    }

    pub fn requests(&self) -> Vec<WorkerRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiWorker for ScriptedWorker {
    async fn run(&self, request: &WorkerRequest) -> Result<WorkerOutcome, WorkerError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(WorkerOutcome {
            success: self.success,
            output: self.output.clone(),
        })
    }
}
