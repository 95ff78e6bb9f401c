//! Polling scheduler that dispatches queued jobs.
//!
//! Every tick loads the open jobs, lets at most one job per repository run
//! and hands newly started jobs to the [`JobProcessor`] on their own tasks.
//! Ticks never overlap: a tick that finds a sweep in progress returns
//! immediately.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::domain::{Job, JobStatus, Stage};
use crate::processor::JobProcessor;
use crate::store::{sort_fifo, JobStore, StoreError};

/// How many jobs a single tick may start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Start at most one job per tick.
    #[default]
    OnePerTick,
    /// Start the oldest queued job of every idle repository.
    AllEligible,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub dispatch: DispatchPolicy,
    /// Running jobs not executed by this scheduler and untouched for this
    /// long are marked failed. `None` disables the check.
    pub stale_after: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            dispatch: DispatchPolicy::OnePerTick,
            stale_after: None,
        }
    }
}

/// What a completed sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Ids of jobs moved to `running` and dispatched.
    pub started: Vec<String>,
    /// Queued jobs left waiting because their repository is busy.
    pub deferred: usize,
    /// Ids of stale running jobs marked failed.
    pub reclaimed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another sweep was in progress.
    Skipped,
    Swept(TickReport),
}

/// Clears the sweep flag when dropped, whatever path the tick leaves by.
struct SweepGuard<'a>(&'a AtomicBool);

impl<'a> SweepGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Removes a job from the in-flight set when its task ends.
struct InFlight {
    ids: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.ids).remove(&self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("Scheduler lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

pub struct Scheduler {
    jobs: Arc<dyn JobStore>,
    processor: Arc<JobProcessor>,
    config: SchedulerConfig,
    sweeping: AtomicBool,
    shutdown: AtomicBool,
    wake: Notify,
    in_flight: Arc<Mutex<HashSet<String>>>,
    tasks: Mutex<JoinSet<()>>,
}

impl Scheduler {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        processor: Arc<JobProcessor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            jobs,
            processor,
            config,
            sweeping: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Creates and persists a queued job. The next tick picks it up.
    pub async fn enqueue(&self, repository_id: &str, target_path: &str) -> Result<Job, StoreError> {
        let job = Job::new(repository_id, target_path);
        self.jobs.save(&job).await?;
        log::info!(
            "Enqueued job {} for {} in repository {}",
            job.id(),
            target_path,
            repository_id
        );
        Ok(job)
    }

    /// Number of dispatched jobs whose processing has not finished.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Runs one sweep over the open jobs.
    pub async fn tick(&self) -> Result<TickOutcome, StoreError> {
        let Some(_guard) = SweepGuard::acquire(&self.sweeping) else {
            log::debug!("Sweep already in progress, skipping tick");
            return Ok(TickOutcome::Skipped);
        };
        self.reap_finished();

        let mut report = TickReport::default();
        let (mut running, mut queued): (Vec<Job>, Vec<Job>) = self
            .jobs
            .find_incomplete()
            .await?
            .into_iter()
            .partition(|job| job.status() == JobStatus::Running);

        if let Some(stale_after) = self.config.stale_after {
            running = self
                .reclaim_stale(running, stale_after, &mut report)
                .await?;
        }

        let mut busy: HashSet<String> = running
            .iter()
            .map(|job| job.repository_id().to_string())
            .collect();

        sort_fifo(&mut queued);
        for mut job in queued {
            if busy.contains(job.repository_id()) {
                report.deferred += 1;
                continue;
            }
            if self.config.dispatch == DispatchPolicy::OnePerTick && !report.started.is_empty() {
                break;
            }

            if let Stage::Queued(queued) = job.stage() {
                queued.mark_running("Picked up by scheduler");
            }
            busy.insert(job.repository_id().to_string());
            if !self.jobs.save_if_status(&job, JobStatus::Queued).await? {
                log::debug!("Job {} was claimed elsewhere, skipping", job.id());
                continue;
            }

            self.dispatch(job.id().to_string());
            report.started.push(job.id().to_string());
        }

        Ok(TickOutcome::Swept(report))
    }

    /// Fails running jobs that nobody is executing and that stopped making
    /// progress. Returns the running jobs that remain.
    async fn reclaim_stale(
        &self,
        running: Vec<Job>,
        stale_after: Duration,
        report: &mut TickReport,
    ) -> Result<Vec<Job>, StoreError> {
        let Ok(limit) = chrono::Duration::from_std(stale_after) else {
            return Ok(running);
        };
        let in_flight = lock(&self.in_flight).clone();
        let now = chrono::Utc::now();

        let mut remaining = Vec::with_capacity(running.len());
        for mut job in running {
            if in_flight.contains(job.id()) || now - job.updated_at() < limit {
                remaining.push(job);
                continue;
            }
            if let Stage::Running(stale) = job.stage() {
                stale.mark_failed(format!(
                    "No progress for {}s, marked failed",
                    stale_after.as_secs()
                ));
            }
            if !self.jobs.save_if_status(&job, JobStatus::Running).await? {
                continue;
            }
            log::warn!("Reclaimed stale job {}", job.id());
            report.reclaimed.push(job.id().to_string());
        }
        Ok(remaining)
    }

    fn dispatch(&self, job_id: String) {
        lock(&self.in_flight).insert(job_id.clone());
        let guard = InFlight {
            ids: Arc::clone(&self.in_flight),
            id: job_id,
        };
        let processor = Arc::clone(&self.processor);

        lock(&self.tasks).spawn(async move {
            match processor.execute_claimed(&guard.id).await {
                Ok(status) => log::debug!("Job {} settled as {}", guard.id, status),
                Err(e) => log::error!("Job {} could not be processed: {}", guard.id, e),
            }
            drop(guard);
        });
    }

    fn reap_finished(&self) {
        let mut tasks = lock(&self.tasks);
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                log::error!("Dispatched job task failed: {}", e);
            }
        }
    }

    /// Waits until every dispatched job has finished processing.
    pub async fn wait_idle(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *lock(&self.tasks));
            if tasks.is_empty() {
                return;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    log::error!("Dispatched job task failed: {}", e);
                }
            }
        }
    }

    /// Spawns the polling loop. Runs until [`Scheduler::stop`] is called.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(scheduler.config.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            log::info!(
                "Scheduler started, polling every {:?}",
                scheduler.config.interval
            );

            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    _ = scheduler.wake.notified() => {}
                }
                if scheduler.shutdown.load(Ordering::Acquire) {
                    break;
                }

                match scheduler.tick().await {
                    Ok(TickOutcome::Swept(report)) if !report.started.is_empty() => {
                        log::info!(
                            "Started {} job(s), {} waiting on a busy repository",
                            report.started.len(),
                            report.deferred
                        );
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Scheduler tick failed: {}", e),
                }
            }

            log::info!("Scheduler stopped");
        })
    }

    /// Signals the polling loop to exit. In-flight jobs keep running.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
