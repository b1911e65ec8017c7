// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Delay Scheduler - Background task resuming expired delays
//!
//! Periodically finds workflows whose timed pause has expired and hands
//! them back to the state machine. The tick itself is guarded by an
//! advisory TTL lock so overlapping invocations from concurrently running
//! scheduler processes never double-resume the same workflow; the TTL
//! expires the guard automatically if a worker crashes mid-tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::application::workflow_engine::WorkflowEngine;
use crate::domain::errors::{EngineError, TransitionError};
use crate::domain::locks::Locker;
use crate::domain::repository::{Directory, WorkflowRepository};

/// Lock key guarding the tick across scheduler processes.
const TICK_LOCK_KEY: &str = "delay-scheduler:tick";

/// Configuration for the delay scheduler
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DelaySchedulerConfig {
    /// How often to run the tick (in seconds)
    pub interval_seconds: u64,

    /// TTL of the advisory tick lock (in seconds); bounds the damage of
    /// a worker crashing mid-tick
    pub tick_lock_ttl_seconds: u64,

    /// Whether the scheduler is enabled
    pub enabled: bool,
}

impl Default for DelaySchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            tick_lock_ttl_seconds: 30,
            enabled: true,
        }
    }
}

/// Delay Scheduler - Background task
pub struct DelayScheduler {
    engine: Arc<WorkflowEngine>,
    workflows: Arc<dyn WorkflowRepository>,
    directory: Arc<dyn Directory>,
    locker: Arc<dyn Locker>,
    config: DelaySchedulerConfig,
    shutdown_token: tokio_util::sync::CancellationToken,
}

impl DelayScheduler {
    pub fn new(
        engine: Arc<WorkflowEngine>,
        workflows: Arc<dyn WorkflowRepository>,
        directory: Arc<dyn Directory>,
        locker: Arc<dyn Locker>,
        config: DelaySchedulerConfig,
    ) -> Self {
        Self {
            engine,
            workflows,
            directory,
            locker,
            config,
            shutdown_token: tokio_util::sync::CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> tokio_util::sync::CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the scheduler background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the tick loop with graceful shutdown support
    async fn run(&self) {
        if !self.config.enabled {
            info!("Delay scheduler is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            "Starting delay scheduler background task"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.tick().await {
                        Ok(resumed) if resumed > 0 => {
                            info!(resumed, "Delay scheduler tick resumed workflows");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Delay scheduler tick failed: {}", e);
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping delay scheduler");
                    break;
                }
            }
        }

        info!("Delay scheduler background task stopped");
    }

    /// Execute a single tick: resume every workflow whose open delay has
    /// expired. Returns how many were resumed; a tick that lost the
    /// advisory lock resumes nothing.
    pub async fn tick(&self) -> Result<usize> {
        let ttl = Duration::from_secs(self.config.tick_lock_ttl_seconds);
        if !self.locker.try_acquire(TICK_LOCK_KEY, ttl).await {
            debug!("Another scheduler tick is running, skipping");
            return Ok(0);
        }

        let result = self.resume_due().await;
        self.locker.release(TICK_LOCK_KEY).await;
        result
    }

    async fn resume_due(&self) -> Result<usize> {
        let due = self.workflows.find_due_delayed(Utc::now()).await?;
        let mut resumed = 0;

        for workflow_id in due {
            let Some(workflow) = self.workflows.find_by_id(workflow_id).await? else {
                continue;
            };
            let Some(actor) = self.directory.system_actor(workflow.account_id).await? else {
                warn!(
                    workflow_id = %workflow_id,
                    account_id = %workflow.account_id,
                    "No system actor configured for account, delay left pending"
                );
                continue;
            };

            match self.engine.resume_workflow(workflow_id, actor).await {
                Ok(()) => resumed += 1,
                // another process won the race; nothing to do
                Err(EngineError::Transition(TransitionError::ResumeNotDelayedWorkflow)) => {
                    debug!(workflow_id = %workflow_id, "Workflow already resumed");
                }
                Err(e) => {
                    warn!(workflow_id = %workflow_id, error = %e, "Failed to resume workflow");
                }
            }
        }

        Ok(resumed)
    }
}
