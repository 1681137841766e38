//! Per-pair job scheduler.
//!
//! Each (network, contract) pair gets its own Tokio task that runs
//! [`SyncEngine::run_cycle`] repeatedly. Cycles of one pair never overlap;
//! cycles of different pairs run concurrently. A failed cycle is retried
//! with exponential backoff; after `max_attempts` consecutive failures the
//! job is reported as stalled and keeps polling at the normal interval.
//!
//! Replacing a pair's job waits for the old task to finish its running
//! cycle first, so two cycles of one pair never overlap.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use paindex_core::{IndexerError, PairKey, SyncConfig};
use paindex_rpc::{RetryConfig, RetryPolicy};

use crate::sync::{CycleOutcome, SyncEngine};

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub poll_interval: Duration,
    /// Consecutive failures before the job counts as stalled.
    pub max_attempts: u32,
    pub backoff: RetryPolicy,
}

impl JobConfig {
    pub fn from_sync(sync: &SyncConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(sync.poll_interval_ms),
            max_attempts: sync.max_attempts.max(1),
            backoff: RetryPolicy::new(RetryConfig {
                max_retries: sync.max_attempts,
                initial_backoff: Duration::from_millis(sync.retry_initial_backoff_ms),
                max_backoff: Duration::from_millis(sync.retry_max_backoff_ms),
                multiplier: 2.0,
            }),
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self::from_sync(&SyncConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for the next cycle.
    Idle { last_block: Option<u64> },
    Running,
    /// The last cycle failed; the next one starts after a backoff.
    Retrying { attempts: u32, last_error: String },
    /// Retries exhausted, or the error cannot be fixed by retrying.
    Stalled { attempts: u32, last_error: String },
    Cancelled,
}

impl JobStatus {
    /// The stall as an error, for callers that alert on it.
    pub fn stall_error(&self) -> Option<IndexerError> {
        match self {
            Self::Stalled { attempts, last_error } => Some(IndexerError::Stalled {
                attempts: *attempts,
                reason: last_error.clone(),
            }),
            _ => None,
        }
    }
}

struct Job {
    trigger: Arc<Notify>,
    cancel: CancellationToken,
    status: Arc<Mutex<JobStatus>>,
    task: JoinHandle<()>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns one job per pair.
#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<BTreeMap<PairKey, Job>>,
    /// Serialises `spawn` so a replacement cannot race another one.
    spawning: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the job for `engine`'s pair. A job already running for the pair
    /// is cancelled, and its in-flight cycle is awaited before the new job
    /// starts.
    pub async fn spawn(&self, engine: Arc<SyncEngine>, config: JobConfig) {
        let _spawning = self.spawning.lock().await;
        let pair = engine.pair().clone();

        let previous = lock(&self.jobs).remove(&pair);
        if let Some(previous) = previous {
            previous.cancel.cancel();
            if let Err(e) = previous.task.await {
                warn!(%pair, error = %e, "replaced job ended abnormally");
            }
            debug!(%pair, "replaced job finished");
        }

        let trigger = Arc::new(Notify::new());
        let cancel = self.shutdown.child_token();
        let status = Arc::new(Mutex::new(JobStatus::Idle { last_block: None }));
        let task = tokio::spawn(run_job(
            engine,
            config,
            trigger.clone(),
            cancel.clone(),
            status.clone(),
        ));

        lock(&self.jobs).insert(
            pair.clone(),
            Job {
                trigger,
                cancel,
                status,
                task,
            },
        );
        info!(%pair, "job spawned");
    }

    /// Run the pair's next cycle now instead of after the poll interval.
    /// Returns `false` for an unknown or cancelled pair.
    pub fn trigger(&self, pair: &PairKey) -> bool {
        match lock(&self.jobs).get(pair) {
            Some(job) if !job.cancel.is_cancelled() => {
                job.trigger.notify_one();
                true
            }
            _ => false,
        }
    }

    /// Stop scheduling cycles for `pair`. A cycle already running completes.
    pub fn cancel(&self, pair: &PairKey) -> bool {
        match lock(&self.jobs).get(pair) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn status(&self, pair: &PairKey) -> Option<JobStatus> {
        lock(&self.jobs).get(pair).map(|job| lock(&job.status).clone())
    }

    pub fn statuses(&self) -> Vec<(PairKey, JobStatus)> {
        lock(&self.jobs)
            .iter()
            .map(|(pair, job)| (pair.clone(), lock(&job.status).clone()))
            .collect()
    }

    /// Pairs whose ingestion is stalled.
    pub fn stalled(&self) -> Vec<(PairKey, JobStatus)> {
        self.statuses()
            .into_iter()
            .filter(|(_, s)| matches!(s, JobStatus::Stalled { .. }))
            .collect()
    }

    /// Cancel every job and wait for running cycles to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let jobs: Vec<Job> = std::mem::take(&mut *lock(&self.jobs)).into_values().collect();
        for job in jobs {
            if let Err(e) = job.task.await {
                warn!(error = %e, "job task ended abnormally");
            }
        }
    }
}

async fn run_job(
    engine: Arc<SyncEngine>,
    config: JobConfig,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
    status: Arc<Mutex<JobStatus>>,
) {
    let pair = engine.pair().clone();
    let mut failures = 0u32;
    let mut last_block = None;

    while !cancel.is_cancelled() {
        {
            // Stalled sticks until a cycle succeeds.
            let mut current = lock(&status);
            if !matches!(*current, JobStatus::Stalled { .. }) {
                *current = JobStatus::Running;
            }
        }

        let delay = match engine.run_cycle().await {
            Ok(outcome) => {
                failures = 0;
                if let CycleOutcome::Committed(report) = &outcome {
                    last_block = Some(report.to);
                }
                *lock(&status) = JobStatus::Idle { last_block };
                config.poll_interval
            }
            Err(e) => {
                failures += 1;
                let last_error = e.to_string();
                if !e.is_retryable() || failures >= config.max_attempts {
                    error!(%pair, attempts = failures, error = %last_error, "ingestion stalled");
                    *lock(&status) = JobStatus::Stalled {
                        attempts: failures,
                        last_error,
                    };
                    config.poll_interval
                } else {
                    let backoff = config.backoff.backoff(failures);
                    warn!(
                        %pair,
                        attempt = failures,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %last_error,
                        "cycle failed, retrying"
                    );
                    *lock(&status) = JobStatus::Retrying {
                        attempts: failures,
                        last_error,
                    };
                    backoff
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = trigger.notified() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    *lock(&status) = JobStatus::Cancelled;
    info!(%pair, "job cancelled");
}
