// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! In-memory implementations of the domain ports, used for development
//! and testing.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::identity::{AccountId, GroupId, UserId};
use crate::domain::repository::{
    Directory, GuestAccess, RepositoryError, TemplateRepository, WorkflowRepository,
};
use crate::domain::template::{Template, TemplateId, TemplateSnapshot};
use crate::domain::workflow::{TaskId, Workflow, WorkflowId, WorkflowStatus};

#[derive(Clone, Default)]
pub struct InMemoryTemplateRepository {
    templates: Arc<Mutex<HashMap<TemplateId, Template>>>,
    snapshots: Arc<Mutex<HashMap<(TemplateId, u32), TemplateSnapshot>>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn save(&self, template: &Template) -> Result<(), RepositoryError> {
        self.templates.lock().insert(template.id, template.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: TemplateId) -> Result<Option<Template>, RepositoryError> {
        Ok(self.templates.lock().get(&id).cloned())
    }

    async fn save_snapshot(&self, snapshot: &TemplateSnapshot) -> Result<(), RepositoryError> {
        // snapshots are immutable: first write wins
        self.snapshots
            .lock()
            .entry((snapshot.template_id, snapshot.version))
            .or_insert_with(|| snapshot.clone());
        Ok(())
    }

    async fn find_snapshot(
        &self,
        template_id: TemplateId,
        version: u32,
    ) -> Result<Option<TemplateSnapshot>, RepositoryError> {
        Ok(self.snapshots.lock().get(&(template_id, version)).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: Arc<Mutex<HashMap<WorkflowId, Workflow>>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.workflows.lock().insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.lock().get(&id).cloned())
    }

    async fn find_unfinished_by_template(
        &self,
        template_id: TemplateId,
    ) -> Result<Vec<WorkflowId>, RepositoryError> {
        let workflows = self.workflows.lock();
        let mut unfinished: Vec<&Workflow> = workflows
            .values()
            .filter(|w| {
                w.template_id == template_id
                    && !w.is_deleted
                    && matches!(w.status, WorkflowStatus::Running | WorkflowStatus::Delayed)
            })
            .collect();
        unfinished.sort_by_key(|w| w.date_created);
        Ok(unfinished.iter().map(|w| w.id).collect())
    }

    async fn find_due_delayed(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkflowId>, RepositoryError> {
        let workflows = self.workflows.lock();
        let mut due: Vec<&Workflow> = workflows
            .values()
            .filter(|w| {
                w.status == WorkflowStatus::Delayed
                    && !w.is_deleted
                    && w.current()
                        .and_then(|t| t.open_delay())
                        .is_some_and(|d| d.estimated_end_date <= now)
            })
            .collect();
        due.sort_by_key(|w| w.date_created);
        Ok(due.iter().map(|w| w.id).collect())
    }
}

/// In-memory directory with mutable live group membership.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: Mutex<BTreeSet<UserId>>,
    members: Mutex<HashMap<GroupId, BTreeSet<UserId>>>,
    actors: Mutex<HashMap<AccountId, UserId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: UserId) {
        self.users.lock().insert(user_id);
    }

    pub fn add_group_member(&self, group_id: GroupId, user_id: UserId) {
        self.users.lock().insert(user_id);
        self.members.lock().entry(group_id).or_default().insert(user_id);
    }

    pub fn remove_group_member(&self, group_id: GroupId, user_id: UserId) {
        if let Some(members) = self.members.lock().get_mut(&group_id) {
            members.remove(&user_id);
        }
    }

    pub fn set_system_actor(&self, account_id: AccountId, user_id: UserId) {
        self.users.lock().insert(user_id);
        self.actors.lock().insert(account_id, user_id);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn group_members(&self, group_id: GroupId) -> Result<Vec<UserId>, RepositoryError> {
        Ok(self
            .members
            .lock()
            .get(&group_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn user_exists(&self, user_id: UserId) -> Result<bool, RepositoryError> {
        Ok(self.users.lock().contains(&user_id))
    }

    async fn system_actor(
        &self,
        account_id: AccountId,
    ) -> Result<Option<UserId>, RepositoryError> {
        Ok(self.actors.lock().get(&account_id).copied())
    }
}

/// Records guest grants instead of minting real tokens.
#[derive(Default)]
pub struct InMemoryGuestAccess {
    granted: Mutex<Vec<(String, TaskId)>>,
}

impl InMemoryGuestAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grants(&self) -> Vec<(String, TaskId)> {
        self.granted.lock().clone()
    }
}

#[async_trait]
impl GuestAccess for InMemoryGuestAccess {
    async fn grant_task_access(
        &self,
        email: &str,
        task_id: TaskId,
    ) -> Result<(), RepositoryError> {
        self.granted.lock().push((email.to_string(), task_id));
        Ok(())
    }
}
