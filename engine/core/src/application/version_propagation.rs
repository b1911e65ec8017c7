// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Version Propagation Service
//!
//! When a template is edited while instances are running on an older
//! version, walks the affected instances and reconciles their
//! not-yet-executed state (kickoff data and tasks at or above the
//! current pointer) to the new snapshot, under the per-instance lock.
//!
//! The version re-check under the lock makes the whole job idempotent:
//! a double-delivered or out-of-order propagation is a no-op, and
//! re-running after a partial failure converges to the same end state
//! instead of duplicating reconciled data. Downgrades are refused by the
//! same check.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::application::performer_resolver::PerformerResolver;
use crate::domain::errors::{EngineError, IntegrityError};
use crate::domain::events::WorkflowEvent;
use crate::domain::identity::UserId;
use crate::domain::locks::InstanceLocks;
use crate::domain::repository::{TemplateRepository, WorkflowRepository};
use crate::domain::template::{TemplateId, TemplateSnapshot};
use crate::domain::workflow::{reconcile_fields, Task, TaskStatus, Workflow};
use crate::infrastructure::event_bus::EventBus;

pub struct VersionPropagationService {
    templates: Arc<dyn TemplateRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    resolver: Arc<PerformerResolver>,
    event_bus: Arc<EventBus>,
    locks: Arc<InstanceLocks>,
}

impl VersionPropagationService {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        resolver: Arc<PerformerResolver>,
        event_bus: Arc<EventBus>,
        locks: Arc<InstanceLocks>,
    ) -> Self {
        Self {
            templates,
            workflows,
            resolver,
            event_bus,
            locks,
        }
    }

    /// Reconcile every unfinished instance of the template to
    /// `new_version`. Returns how many instances were updated.
    pub async fn propagate_version(
        &self,
        template_id: TemplateId,
        new_version: u32,
        updated_by: UserId,
    ) -> Result<usize, EngineError> {
        let snapshot = self
            .templates
            .find_snapshot(template_id, new_version)
            .await?
            .ok_or(IntegrityError::MissingSnapshot {
                template_id,
                version: new_version,
            })?;

        let instance_ids = self
            .workflows
            .find_unfinished_by_template(template_id)
            .await?;

        info!(
            template_id = %template_id,
            new_version,
            updated_by = %updated_by,
            instances = instance_ids.len(),
            "Propagating template version"
        );

        let mut updated = 0;
        for workflow_id in instance_ids {
            let _guard = self.locks.lock(workflow_id).await;

            let Some(mut workflow) = self.workflows.find_by_id(workflow_id).await? else {
                continue;
            };
            // re-check under the lock: guards double-delivered and
            // out-of-order jobs, and refuses downgrades
            if workflow.version >= new_version {
                debug!(
                    workflow_id = %workflow_id,
                    instance_version = workflow.version,
                    new_version,
                    "Instance already at or above target version, skipping"
                );
                continue;
            }
            if workflow.is_finished() || workflow.is_deleted {
                continue;
            }

            let mut events = Vec::new();
            self.reconcile(&mut workflow, &snapshot, &mut events).await?;
            workflow.version = new_version;
            self.workflows.save(&workflow).await?;
            for event in events {
                self.event_bus.publish(event);
            }
            updated += 1;
        }

        if updated > 0 {
            info!(
                template_id = %template_id,
                new_version,
                updated,
                "Template version propagated"
            );
        }
        Ok(updated)
    }

    /// Diff one instance against the snapshot, touching only state that
    /// has not yet executed.
    async fn reconcile(
        &self,
        workflow: &mut Workflow,
        snapshot: &TemplateSnapshot,
        events: &mut Vec<WorkflowEvent>,
    ) -> Result<(), EngineError> {
        let now = Utc::now();
        let current = workflow.current_task;
        let snapshot_count = snapshot.tasks.len() as u32;

        workflow.name = snapshot.name.clone();
        workflow.kickoff = reconcile_fields(&workflow.kickoff, &snapshot.kickoff);

        // drop unexecuted tasks beyond the new definition; executed
        // history is never touched
        workflow
            .tasks
            .retain(|t| t.number < current || t.number <= snapshot_count);

        for task_template in snapshot.tasks.iter().filter(|t| t.number >= current) {
            match workflow.task_mut(task_template.number) {
                Some(task) => task.refresh_definition(task_template),
                None => workflow.tasks.push(Task::from_template(task_template)),
            }
        }
        workflow.tasks.sort_by_key(|t| t.number);

        if current > snapshot_count {
            // the new definition has nothing left for this instance
            warn!(
                workflow_id = %workflow.id,
                current_task = current,
                snapshot_count,
                "Current pointer beyond new task list, completing workflow"
            );
            workflow.current_task = snapshot_count.max(1);
            workflow.finish(now);
            events.push(WorkflowEvent::WorkflowCompleted {
                workflow_id: workflow.id,
                account_id: workflow.account_id,
                completed_at: now,
            });
            return Ok(());
        }

        // the open task keeps running on the refreshed definition; its
        // assignments follow the new performer declarations
        let is_open = matches!(
            workflow.current().map(|t| t.status),
            Some(TaskStatus::Active | TaskStatus::Delayed)
        );
        if is_open {
            let raw = workflow
                .task(current)
                .map(|t| t.raw_performers.clone())
                .unwrap_or_default();
            let resolved = self.resolver.resolve(&raw, workflow).await?;
            if let Some(task) = workflow.task_mut(current) {
                self.resolver.sync_task_performers(task, &resolved).await?;
            }
        }
        Ok(())
    }
}
