// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Locking primitives.
//!
//! Two distinct disciplines:
//!
//! - [`Locker`]: an advisory, TTL-expiring named lock, injected into the
//!   delay scheduler so overlapping ticks from concurrent worker
//!   processes no-op. The TTL bounds the damage of a worker crashing
//!   mid-tick.
//! - [`InstanceLocks`]: the exclusive per-workflow lock every
//!   state-machine operation and every per-instance propagation step
//!   acquires at its start and holds for its duration. This is the only
//!   place true pessimistic locking is required.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::workflow::WorkflowId;

/// Advisory distributed lock with expiry.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Try to take the named lock for `ttl`. Returns false if it is
    /// currently held (and unexpired) by anyone, including this caller.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> bool;

    /// Release the named lock. Releasing an expired or unheld lock is a
    /// no-op.
    async fn release(&self, key: &str);
}

/// Per-workflow exclusive async locks.
///
/// Guards are owned, so they can be held across await points for the
/// whole critical section of a transition.
#[derive(Default)]
pub struct InstanceLocks {
    locks: DashMap<WorkflowId, Arc<Mutex<()>>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub async fn lock(&self, workflow_id: WorkflowId) -> OwnedMutexGuard<()> {
        let cell = self
            .locks
            .entry(workflow_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        cell.lock_owned().await
    }
}
