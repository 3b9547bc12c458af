//! Background job registry
//!
//! In-process mapping from job id to job record, used by the bulk
//! embedding builds. All operations go through the registry so a
//! record is never torn: updates run as closures under the write lock.
//! A periodic sweep evicts records older than the TTL.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use casekb_core::{Error, Result};

/// Job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed,
}

/// Outcome of one processed file/batch within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    pub name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One background work unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Total units of work
    pub total: usize,
    /// Units completed so far
    pub progress: usize,
    pub file_results: Vec<FileResult>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Registry of in-process jobs
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Job>>,
    ttl: Duration,
}

impl JobRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a new in-progress job and return a snapshot of it.
    pub fn create(&self, total: usize) -> Job {
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::InProgress,
            total,
            progress: 0,
            file_results: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        };
        self.jobs.write().insert(job.id.clone(), job.clone());
        tracing::info!(job_id = %job.id, total, "Created job");
        job
    }

    /// Mutate a job under the write lock. Last writer wins per field;
    /// readers never observe a half-applied update.
    pub fn update(&self, id: &str, apply: impl FnOnce(&mut Job)) -> Result<()> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;
        apply(job);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Job> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))
    }

    pub fn list_active(&self) -> Vec<Job> {
        self.jobs
            .read()
            .values()
            .filter(|j| j.status == JobStatus::InProgress)
            .cloned()
            .collect()
    }

    /// Evict records older than the TTL. Returns the eviction count.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut jobs = self.jobs.write();
        let expired: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| job.age(now) > self.ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            jobs.remove(id);
            tracing::info!(job_id = %id, "Evicted expired job");
        }
        expired.len()
    }

    /// Spawn the periodic sweep.
    ///
    /// Returns a shutdown sender; flipping it to `true` stops the task.
    pub fn start_sweep_task(self: &Arc<Self>, interval: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = registry.sweep();
                        if evicted > 0 {
                            tracing::info!(evicted, "Job sweep complete");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        // A dropped sender also stops the task
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Job sweep task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
