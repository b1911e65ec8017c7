// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Propagation job queue.
//!
//! At-least-once, in-process delivery of version propagation jobs with a
//! small bounded retry-with-backoff policy. Only transient
//! infrastructure failures are retried; a business or integrity failure
//! goes straight to the failed-job table. Failed jobs stay inspectable
//! and can be replayed manually; replay is safe because propagation
//! itself is idempotent under its version re-check.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::version_propagation::VersionPropagationService;
use crate::domain::errors::EngineError;
use crate::domain::identity::UserId;
use crate::domain::template::TemplateId;

/// Retry policy for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// First backoff; doubles per attempt.
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 250,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms << attempt.saturating_sub(1).min(8))
    }
}

/// Payload of one propagation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationJob {
    pub template_id: TemplateId,
    pub new_version: u32,
    pub updated_by: UserId,
}

/// A job that exhausted its retries, kept for inspection and replay.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub job: PropagationJob,
    pub attempts: u32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

/// Handle to the queue: enqueue, inspect failures, replay.
pub struct PropagationQueue {
    tx: mpsc::UnboundedSender<PropagationJob>,
    failed: Arc<DashMap<Uuid, FailedJob>>,
    shutdown_token: tokio_util::sync::CancellationToken,
}

impl PropagationQueue {
    /// Start the worker and return the queue handle plus its join handle.
    pub fn start(
        service: Arc<VersionPropagationService>,
        policy: RetryPolicy,
    ) -> (Arc<Self>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            tx,
            failed: Arc::new(DashMap::new()),
            shutdown_token: tokio_util::sync::CancellationToken::new(),
        });

        let worker = Worker {
            service,
            policy,
            failed: queue.failed.clone(),
            shutdown_token: queue.shutdown_token.clone(),
        };
        let handle = tokio::spawn(worker.run(rx));
        (queue, handle)
    }

    pub fn enqueue(&self, job: PropagationJob) -> anyhow::Result<()> {
        self.tx
            .send(job)
            .map_err(|_| anyhow::anyhow!("Propagation queue worker is gone"))
    }

    /// Jobs that exhausted their retries.
    pub fn failed_jobs(&self) -> Vec<(Uuid, FailedJob)> {
        self.failed
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Re-enqueue a failed job. Returns false for an unknown id.
    pub fn replay(&self, id: Uuid) -> bool {
        match self.failed.remove(&id) {
            Some((_, failed)) => self.enqueue(failed.job).is_ok(),
            None => false,
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> tokio_util::sync::CancellationToken {
        self.shutdown_token.clone()
    }
}

struct Worker {
    service: Arc<VersionPropagationService>,
    policy: RetryPolicy,
    failed: Arc<DashMap<Uuid, FailedJob>>,
    shutdown_token: tokio_util::sync::CancellationToken,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<PropagationJob>) {
        info!(
            max_attempts = self.policy.max_attempts,
            "Propagation queue worker started"
        );
        loop {
            tokio::select! {
                job = rx.recv() => {
                    match job {
                        Some(job) => self.process(job).await,
                        None => break,
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping propagation queue worker");
                    break;
                }
            }
        }
        info!("Propagation queue worker stopped");
    }

    async fn process(&self, job: PropagationJob) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .service
                .propagate_version(job.template_id, job.new_version, job.updated_by)
                .await
            {
                Ok(_) => return,
                // transient infrastructure failure: bounded backoff
                Err(EngineError::Repository(e)) if attempt < self.policy.max_attempts => {
                    warn!(
                        template_id = %job.template_id,
                        new_version = job.new_version,
                        attempt,
                        error = %e,
                        "Propagation attempt failed, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff(attempt)).await;
                }
                Err(e) => {
                    self.park(job, attempt, e);
                    return;
                }
            }
        }
    }

    fn park(&self, job: PropagationJob, attempts: u32, error: EngineError) {
        warn!(
            template_id = %job.template_id,
            new_version = job.new_version,
            attempts,
            error = %error,
            "Propagation job failed, parked for manual replay"
        );
        self.failed.insert(
            Uuid::new_v4(),
            FailedJob {
                job,
                attempts,
                last_error: error.to_string(),
                failed_at: Utc::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::performer_resolver::PerformerResolver;
    use crate::domain::locks::InstanceLocks;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::memory::{
        InMemoryDirectory, InMemoryGuestAccess, InMemoryTemplateRepository,
        InMemoryWorkflowRepository,
    };

    fn service() -> Arc<VersionPropagationService> {
        let resolver = Arc::new(PerformerResolver::new(
            Arc::new(InMemoryDirectory::new()),
            Arc::new(InMemoryGuestAccess::new()),
        ));
        Arc::new(VersionPropagationService::new(
            Arc::new(InMemoryTemplateRepository::new()),
            Arc::new(InMemoryWorkflowRepository::new()),
            resolver,
            Arc::new(EventBus::with_default_capacity()),
            Arc::new(InstanceLocks::new()),
        ))
    }

    #[tokio::test]
    async fn integrity_failure_parks_without_retries() {
        // no snapshot stored: MissingSnapshot, an integrity error
        let (queue, handle) = PropagationQueue::start(service(), RetryPolicy::default());
        queue
            .enqueue(PropagationJob {
                template_id: TemplateId::new(),
                new_version: 2,
                updated_by: UserId::new(),
            })
            .unwrap();

        // give the worker a moment
        for _ in 0..50 {
            if !queue.failed_jobs().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let failed = queue.failed_jobs();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].1.attempts, 1);

        queue.shutdown_token().cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn replay_reenqueues_a_parked_job() {
        let (queue, handle) = PropagationQueue::start(service(), RetryPolicy::default());
        queue
            .enqueue(PropagationJob {
                template_id: TemplateId::new(),
                new_version: 2,
                updated_by: UserId::new(),
            })
            .unwrap();

        for _ in 0..50 {
            if !queue.failed_jobs().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let failed = queue.failed_jobs();
        assert_eq!(failed.len(), 1);

        assert!(queue.replay(failed[0].0));
        assert!(!queue.replay(failed[0].0));

        queue.shutdown_token().cancel();
        handle.await.unwrap();
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_base_ms: 100,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }
}
