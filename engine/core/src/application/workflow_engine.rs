// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Task/Workflow State Machine
//!
//! The orchestrator: advances a workflow's current task pointer, applies
//! completion/delay/resume/revert/terminate transitions, invokes the
//! condition engine to decide branch skips and the performer resolver to
//! materialize assignments, and emits lifecycle signals.
//!
//! Every operation acquires the instance's exclusive lock at its start,
//! loads the aggregate, validates the transition, mutates, persists
//! atomically, and only then publishes events. Business-rule violations
//! ([`TransitionError`]) are rejected before any mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::application::condition_engine::ConditionEngine;
use crate::application::performer_resolver::PerformerResolver;
use crate::domain::errors::{EngineError, IntegrityError, TransitionError};
use crate::domain::events::WorkflowEvent;
use crate::domain::fields::FieldValueInput;
use crate::domain::identity::UserId;
use crate::domain::locks::InstanceLocks;
use crate::domain::performer::Assignee;
use crate::domain::repository::{
    RepositoryError, SubWorkflowGuard, TemplateRepository, WorkflowRepository,
};
use crate::domain::template::TemplateId;
use crate::domain::workflow::{Delay, TaskStatus, Workflow, WorkflowId, WorkflowStatus};
use crate::infrastructure::event_bus::EventBus;

/// Workflow Engine (Application Service)
pub struct WorkflowEngine {
    templates: Arc<dyn TemplateRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    resolver: Arc<PerformerResolver>,
    event_bus: Arc<EventBus>,
    locks: Arc<InstanceLocks>,
    sub_workflows: Arc<dyn SubWorkflowGuard>,
}

impl WorkflowEngine {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        resolver: Arc<PerformerResolver>,
        event_bus: Arc<EventBus>,
        locks: Arc<InstanceLocks>,
        sub_workflows: Arc<dyn SubWorkflowGuard>,
    ) -> Self {
        Self {
            templates,
            workflows,
            resolver,
            event_bus,
            locks,
            sub_workflows,
        }
    }

    // ========================================================================
    // Workflow lifecycle
    // ========================================================================

    /// Start a new instance of a template's current definition.
    pub async fn start_workflow(
        &self,
        template_id: TemplateId,
        starter: UserId,
        kickoff: &HashMap<String, FieldValueInput>,
    ) -> Result<WorkflowId, EngineError> {
        let template = self
            .templates
            .find_by_id(template_id)
            .await?
            .filter(|t| !t.is_deleted)
            .ok_or_else(|| RepositoryError::NotFound(format!("Template {template_id}")))?;

        let snapshot = template.snapshot();
        let mut workflow = Workflow::instantiate(&snapshot, template.account_id, starter, kickoff);
        let workflow_id = workflow.id;

        info!(
            workflow_id = %workflow_id,
            template_id = %template_id,
            version = workflow.version,
            "Starting workflow"
        );

        let mut events = vec![WorkflowEvent::WorkflowStarted {
            workflow_id,
            account_id: workflow.account_id,
            actor: starter,
            started_at: Utc::now(),
        }];
        self.activate_from(&mut workflow, 1, &mut events).await?;

        self.workflows.save(&workflow).await?;
        self.publish_all(events);
        Ok(workflow_id)
    }

    /// Record a performer's completion of the workflow's active task.
    ///
    /// Under `require_completion_by_all`, the task completes only once
    /// every resolved, non-revoked performer has completed; partial
    /// completion leaves it active. On task completion the pointer
    /// advances, skipping any chain of tasks whose condition fails, and
    /// the next passing task activates, or the workflow finishes.
    pub async fn complete_task(
        &self,
        workflow_id: WorkflowId,
        user: UserId,
    ) -> Result<(), EngineError> {
        self.complete_task_by_assignee(workflow_id, Assignee::User { user_id: user })
            .await
    }

    /// Guest completion path; guests are identified by email.
    pub async fn complete_task_as_guest(
        &self,
        workflow_id: WorkflowId,
        email: &str,
    ) -> Result<(), EngineError> {
        self.complete_task_by_assignee(
            workflow_id,
            Assignee::Guest {
                email: email.to_string(),
            },
        )
        .await
    }

    async fn complete_task_by_assignee(
        &self,
        workflow_id: WorkflowId,
        assignee: Assignee,
    ) -> Result<(), EngineError> {
        let _guard = self.locks.lock(workflow_id).await;
        let mut workflow = self.load(workflow_id).await?;
        Self::ensure_running(&workflow)?;

        let now = Utc::now();
        let number = workflow.current_task;
        let mut events = Vec::new();

        let completed_task = {
            let task = workflow
                .task_mut(number)
                .ok_or(IntegrityError::MissingCurrentTask { workflow_id })?;

            let Some(performer) = task.performer_mut(&assignee) else {
                return Err(TransitionError::UserNotPerformer.into());
            };
            if !performer.is_completed {
                performer.is_completed = true;
                performer.date_completed = Some(now);
            }

            if task.require_completion_by_all && task.has_uncompleted_performers() {
                debug!(
                    workflow_id = %workflow_id,
                    task_number = number,
                    "Partial completion, task stays active"
                );
                None
            } else {
                task.complete(now);
                Some(task.id)
            }
        };

        if let Some(task_id) = completed_task {
            if let Assignee::User { user_id } = assignee {
                events.push(WorkflowEvent::TaskCompleted {
                    task_id,
                    workflow_id,
                    user_id,
                    completed_at: now,
                });
            }
            info!(
                workflow_id = %workflow_id,
                task_number = number,
                "Task completed"
            );
            self.activate_from(&mut workflow, number + 1, &mut events)
                .await?;
        }

        self.workflows.save(&workflow).await?;
        self.publish_all(events);
        Ok(())
    }

    /// Pause the active task for `duration`.
    pub async fn delay_task(
        &self,
        workflow_id: WorkflowId,
        duration: Duration,
    ) -> Result<(), EngineError> {
        let _guard = self.locks.lock(workflow_id).await;
        let mut workflow = self.load(workflow_id).await?;
        Self::ensure_running(&workflow)?;

        let now = Utc::now();
        let delay = Delay::new(duration, now);
        let estimated_end_date = delay.estimated_end_date;
        let task_id = {
            let task = workflow
                .task_mut(workflow.current_task)
                .ok_or(IntegrityError::MissingCurrentTask { workflow_id })?;
            task.status = TaskStatus::Delayed;
            task.delays.push(delay);
            task.id
        };
        workflow.status = WorkflowStatus::Delayed;

        info!(
            workflow_id = %workflow_id,
            task_id = %task_id,
            estimated_end_date = %estimated_end_date,
            "Workflow delayed"
        );

        self.workflows.save(&workflow).await?;
        self.event_bus.publish(WorkflowEvent::WorkflowDelayed {
            workflow_id,
            task_id,
            estimated_end_date,
            delayed_at: now,
        });
        Ok(())
    }

    /// Resume a delayed workflow: close the open delay, reactivate the
    /// task, restore the running status.
    pub async fn resume_workflow(
        &self,
        workflow_id: WorkflowId,
        actor: UserId,
    ) -> Result<(), EngineError> {
        let _guard = self.locks.lock(workflow_id).await;
        let mut workflow = self.load(workflow_id).await?;
        if workflow.status != WorkflowStatus::Delayed {
            return Err(TransitionError::ResumeNotDelayedWorkflow.into());
        }

        let now = Utc::now();
        let number = workflow.current_task;
        let raw = workflow
            .task(number)
            .map(|t| t.raw_performers.clone())
            .unwrap_or_default();
        let resolved = self.resolver.resolve(&raw, &workflow).await?;

        let task_id = {
            let task = workflow
                .task_mut(number)
                .ok_or(IntegrityError::MissingCurrentTask { workflow_id })?;
            if task.status != TaskStatus::Delayed {
                return Err(TransitionError::ResumeNotDelayedWorkflow.into());
            }
            task.close_open_delay(now);
            self.resolver.sync_task_performers(task, &resolved).await?;
            task.status = TaskStatus::Active;
            task.id
        };
        workflow.status = WorkflowStatus::Running;

        info!(
            workflow_id = %workflow_id,
            task_id = %task_id,
            actor = %actor,
            "Workflow resumed"
        );

        self.workflows.save(&workflow).await?;
        self.event_bus.publish(WorkflowEvent::WorkflowResumed {
            workflow_id,
            task_id,
            resumed_at: now,
        });
        Ok(())
    }

    /// Move the pointer backward to an earlier task, reopening it and
    /// resetting everything after it to pending.
    pub async fn revert_task(
        &self,
        workflow_id: WorkflowId,
        target_number: u32,
    ) -> Result<(), EngineError> {
        let _guard = self.locks.lock(workflow_id).await;
        let mut workflow = self.load(workflow_id).await?;
        Self::ensure_running(&workflow)?;

        if workflow.current_task <= 1 {
            return Err(TransitionError::FirstTaskCannotBeReverted.into());
        }
        if target_number == 0 || target_number >= workflow.current_task {
            return Err(TransitionError::ReturnToFutureTask {
                target: target_number,
                current: workflow.current_task,
            }
            .into());
        }
        if self
            .sub_workflows
            .blocks_revert(workflow_id, target_number)
            .await
        {
            return Err(TransitionError::BlockedBySubWorkflows.into());
        }

        let now = Utc::now();
        for task in workflow
            .tasks
            .iter_mut()
            .filter(|t| t.number > target_number)
        {
            task.reset_to_pending();
        }
        workflow.current_task = target_number;
        if let Some(task) = workflow.task_mut(target_number) {
            task.reopen(now);
        }

        let raw = workflow
            .task(target_number)
            .map(|t| t.raw_performers.clone())
            .unwrap_or_default();
        let resolved = self.resolver.resolve(&raw, &workflow).await?;
        let task_id = {
            let task = workflow
                .task_mut(target_number)
                .ok_or(IntegrityError::TaskNumberOutOfRange {
                    number: target_number,
                })?;
            self.resolver.sync_task_performers(task, &resolved).await?;
            task.id
        };

        info!(
            workflow_id = %workflow_id,
            target_number,
            "Workflow returned to earlier task"
        );

        self.workflows.save(&workflow).await?;
        self.event_bus.publish(WorkflowEvent::TaskReturned {
            task_id,
            workflow_id,
            returned_at: now,
        });
        Ok(())
    }

    /// Force-close a running or delayed workflow. Terminal.
    pub async fn terminate_workflow(&self, workflow_id: WorkflowId) -> Result<(), EngineError> {
        let _guard = self.locks.lock(workflow_id).await;
        let mut workflow = self.load(workflow_id).await?;
        if workflow.is_finished() {
            return Err(TransitionError::CompletedWorkflowCannotBeChanged.into());
        }

        let now = Utc::now();
        if let Some(task) = workflow.task_mut(workflow.current_task) {
            task.close_open_delay(now);
        }
        workflow.status = WorkflowStatus::Terminated;
        workflow.date_completed = Some(now);

        info!(workflow_id = %workflow_id, "Workflow terminated");

        self.workflows.save(&workflow).await?;
        self.event_bus.publish(WorkflowEvent::WorkflowTerminated {
            workflow_id,
            account_id: workflow.account_id,
            terminated_at: now,
        });
        Ok(())
    }

    // ========================================================================
    // Advancement
    // ========================================================================

    /// Walk forward from `start`, skipping every task whose condition
    /// fails, and activate the first passing task, or finish the
    /// workflow when none remain.
    pub(crate) async fn activate_from(
        &self,
        workflow: &mut Workflow,
        start: u32,
        events: &mut Vec<WorkflowEvent>,
    ) -> Result<(), EngineError> {
        let now = Utc::now();
        let mut number = start;
        loop {
            if number > workflow.task_count() {
                workflow.current_task = workflow.task_count().max(1);
                workflow.finish(now);
                info!(workflow_id = %workflow.id, "Workflow completed");
                events.push(WorkflowEvent::WorkflowCompleted {
                    workflow_id: workflow.id,
                    account_id: workflow.account_id,
                    completed_at: now,
                });
                return Ok(());
            }

            let condition = workflow
                .task(number)
                .ok_or(IntegrityError::TaskNumberOutOfRange { number })?
                .condition
                .clone();
            let passes = match &condition {
                Some(condition) => ConditionEngine::evaluate(condition, workflow)?,
                None => true,
            };
            if !passes {
                if let Some(task) = workflow.task_mut(number) {
                    task.skip();
                }
                debug!(
                    workflow_id = %workflow.id,
                    task_number = number,
                    "Condition failed, task skipped"
                );
                number += 1;
                continue;
            }

            workflow.current_task = number;
            let raw = workflow
                .task(number)
                .map(|t| t.raw_performers.clone())
                .unwrap_or_default();
            let resolved = self.resolver.resolve(&raw, workflow).await?;
            let task_id = {
                let task = workflow
                    .task_mut(number)
                    .ok_or(IntegrityError::TaskNumberOutOfRange { number })?;
                self.resolver.sync_task_performers(task, &resolved).await?;
                task.activate(now);
                task.id
            };
            info!(
                workflow_id = %workflow.id,
                task_id = %task_id,
                task_number = number,
                "Task activated"
            );
            events.push(WorkflowEvent::TaskActivated {
                task_id,
                workflow_id: workflow.id,
                performers: resolved.user_ids(),
                activated_at: now,
            });
            return Ok(());
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load(&self, workflow_id: WorkflowId) -> Result<Workflow, EngineError> {
        Ok(self
            .workflows
            .find_by_id(workflow_id)
            .await?
            .filter(|w| !w.is_deleted)
            .ok_or_else(|| RepositoryError::NotFound(format!("Workflow {workflow_id}")))?)
    }

    fn ensure_running(workflow: &Workflow) -> Result<(), TransitionError> {
        match workflow.status {
            WorkflowStatus::Running => Ok(()),
            WorkflowStatus::Delayed => Err(TransitionError::DelayedWorkflowCannotBeChanged),
            WorkflowStatus::Done | WorkflowStatus::Terminated => {
                Err(TransitionError::CompletedWorkflowCannotBeChanged)
            }
        }
    }

    fn publish_all(&self, events: Vec<WorkflowEvent>) {
        for event in events {
            self.event_bus.publish(event);
        }
    }
}
