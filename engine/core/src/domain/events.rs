// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Lifecycle signals emitted on every state transition.
//!
//! Each event carries enough identifying data for an external
//! notification/webhook/audit dispatcher to act without re-querying the
//! engine; the engine does not know or care how many subscribers exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identity::{AccountId, UserId};
use crate::domain::workflow::{TaskId, WorkflowId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        workflow_id: WorkflowId,
        account_id: AccountId,
        actor: UserId,
        started_at: DateTime<Utc>,
    },
    WorkflowCompleted {
        workflow_id: WorkflowId,
        account_id: AccountId,
        completed_at: DateTime<Utc>,
    },
    WorkflowTerminated {
        workflow_id: WorkflowId,
        account_id: AccountId,
        terminated_at: DateTime<Utc>,
    },
    TaskActivated {
        task_id: TaskId,
        workflow_id: WorkflowId,
        performers: Vec<UserId>,
        activated_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        workflow_id: WorkflowId,
        user_id: UserId,
        completed_at: DateTime<Utc>,
    },
    TaskReturned {
        task_id: TaskId,
        workflow_id: WorkflowId,
        returned_at: DateTime<Utc>,
    },
    WorkflowDelayed {
        workflow_id: WorkflowId,
        task_id: TaskId,
        estimated_end_date: DateTime<Utc>,
        delayed_at: DateTime<Utc>,
    },
    WorkflowResumed {
        workflow_id: WorkflowId,
        task_id: TaskId,
        resumed_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// The workflow the event belongs to, for per-instance subscriptions.
    pub fn workflow_id(&self) -> WorkflowId {
        match self {
            Self::WorkflowStarted { workflow_id, .. }
            | Self::WorkflowCompleted { workflow_id, .. }
            | Self::WorkflowTerminated { workflow_id, .. }
            | Self::TaskActivated { workflow_id, .. }
            | Self::TaskCompleted { workflow_id, .. }
            | Self::TaskReturned { workflow_id, .. }
            | Self::WorkflowDelayed { workflow_id, .. }
            | Self::WorkflowResumed { workflow_id, .. } => *workflow_id,
        }
    }
}
