// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence and collaborator contracts, one per aggregate root or
//! external concern, defined in the domain layer and implemented in
//! `crate::infrastructure`.
//!
//! | Trait | Concern | Implementations |
//! |-------|---------|----------------|
//! | `TemplateRepository` | `Template` + snapshots | `InMemoryTemplateRepository`, `PostgresTemplateRepository` |
//! | `WorkflowRepository` | `Workflow` aggregate | `InMemoryWorkflowRepository`, `PostgresWorkflowRepository` |
//! | `Directory` | users, live group membership, account actors | `InMemoryDirectory` |
//! | `GuestAccess` | single-task guest token issuance | `InMemoryGuestAccess` |
//! | `SubWorkflowGuard` | revert precondition | `NoSubWorkflows` |
//!
//! In-memory implementations are used for development and testing;
//! PostgreSQL implementations for production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::identity::{AccountId, GroupId, UserId};
use crate::domain::template::{Template, TemplateId, TemplateSnapshot};
use crate::domain::workflow::{TaskId, Workflow, WorkflowId};

/// Repository interface for Template aggregates and their immutable
/// version snapshots.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Save template (create or update)
    async fn save(&self, template: &Template) -> Result<(), RepositoryError>;

    /// Find template by ID
    async fn find_by_id(&self, id: TemplateId) -> Result<Option<Template>, RepositoryError>;

    /// Persist a version snapshot. Snapshots are immutable: saving the
    /// same (template, version) twice must keep the first document.
    async fn save_snapshot(&self, snapshot: &TemplateSnapshot) -> Result<(), RepositoryError>;

    /// Load the snapshot for a specific version
    async fn find_snapshot(
        &self,
        template_id: TemplateId,
        version: u32,
    ) -> Result<Option<TemplateSnapshot>, RepositoryError>;
}

/// Repository interface for Workflow aggregates.
///
/// A workflow row carries its whole aggregate (tasks, performers,
/// delays); `save` replaces it atomically.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Save workflow (create or update), atomically for the aggregate
    async fn save(&self, workflow: &Workflow) -> Result<(), RepositoryError>;

    /// Find workflow by ID
    async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError>;

    /// Ids of unfinished (running or delayed) instances of a template
    async fn find_unfinished_by_template(
        &self,
        template_id: TemplateId,
    ) -> Result<Vec<WorkflowId>, RepositoryError>;

    /// Ids of delayed workflows whose open delay has expired by `now`
    async fn find_due_delayed(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkflowId>, RepositoryError>;
}

/// Live account directory: users, group membership, designated actors.
///
/// Group membership is a live many-to-many relation; the resolver reads
/// it at resolution time, it is never snapshotted.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Current members of a group
    async fn group_members(&self, group_id: GroupId) -> Result<Vec<UserId>, RepositoryError>;

    /// Whether the user is a live member of the account
    async fn user_exists(&self, user_id: UserId) -> Result<bool, RepositoryError>;

    /// The account's designated actor for system-initiated transitions
    /// (scheduler resumes)
    async fn system_actor(&self, account_id: AccountId) -> Result<Option<UserId>, RepositoryError>;
}

/// Guest access issuance.
///
/// Guests are identified by email and receive a time-boxed, single-task
/// access token. Token lifecycle (expiry, revocation) lives in the
/// authentication subsystem; the engine only requests issuance when a
/// guest is first assigned.
#[async_trait]
pub trait GuestAccess: Send + Sync {
    async fn grant_task_access(&self, email: &str, task_id: TaskId)
        -> Result<(), RepositoryError>;
}

/// Pluggable precondition consulted before reverting a task.
///
/// Reports whether a downstream dependent sub-process has already started
/// irreversible work.
#[async_trait]
pub trait SubWorkflowGuard: Send + Sync {
    async fn blocks_revert(&self, workflow_id: WorkflowId, target: u32) -> bool;
}

/// Default guard: no sub-workflow concept, revert is never blocked.
pub struct NoSubWorkflows;

#[async_trait]
impl SubWorkflowGuard for NoSubWorkflows {
    async fn blocks_revert(&self, _workflow_id: WorkflowId, _target: u32) -> bool {
        false
    }
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
