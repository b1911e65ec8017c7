// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Engine error taxonomy.
//!
//! Three families, with different propagation policies:
//!
//! - [`TransitionError`]: business-rule violations raised synchronously to
//!   the caller of a state-machine operation. Expected to occur; surfaced
//!   to the end user by the (out-of-scope) API layer, never retried and
//!   never logged as system faults.
//! - [`IntegrityError`]: a corrupted template or instance. Fatal, never
//!   swallowed into a false condition result, never retried; requires
//!   manual correction.
//! - [`RepositoryError`](crate::domain::repository::RepositoryError):
//!   transient infrastructure failures, retried by the job queue's bounded
//!   backoff policy where applicable.

use crate::domain::template::TemplateId;
use crate::domain::workflow::WorkflowId;

/// Invalid state-machine transition, rejected before any mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Workflow is not delayed and cannot be resumed")]
    ResumeNotDelayedWorkflow,

    #[error("Delayed workflow cannot be changed")]
    DelayedWorkflowCannotBeChanged,

    #[error("Completed workflow cannot be changed")]
    CompletedWorkflowCannotBeChanged,

    #[error("First task cannot be reverted")]
    FirstTaskCannotBeReverted,

    #[error("Cannot return to task {target}: not before current task {current}")]
    ReturnToFutureTask { target: u32, current: u32 },

    #[error("Revert is blocked by started sub-workflows")]
    BlockedBySubWorkflows,

    #[error("User is not a performer of the task")]
    UserNotPerformer,
}

/// Corrupted template or instance data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("Predicate references field '{api_name}' which does not exist in the workflow")]
    UnknownField { api_name: String },

    #[error("Predicate references task '{api_name}' which does not exist in the workflow")]
    UnknownTask { api_name: String },

    #[error("Task number {number} is out of range for the workflow")]
    TaskNumberOutOfRange { number: u32 },

    #[error("No snapshot stored for template {template_id} version {version}")]
    MissingSnapshot {
        template_id: TemplateId,
        version: u32,
    },

    #[error("Workflow {workflow_id} has no task at its current pointer")]
    MissingCurrentTask { workflow_id: WorkflowId },
}

/// Top-level error of engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Repository(#[from] crate::domain::repository::RepositoryError),
}
