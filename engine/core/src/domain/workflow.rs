// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Domain Model
//!
//! A workflow is one running instance of a template. It owns its tasks,
//! their resolved performers and their delays; everything cascades with
//! the instance.
//!
//! # Invariants
//!
//! - `current_task` never exceeds the instance's task count.
//! - `version` never decreases across the instance's lifetime.
//! - At most one task is Active or Delayed at a time, the task at
//!   `current_task`. Tasks below the pointer are Completed or Skipped;
//!   tasks above it are Pending.
//!
//! All mutation of workflow/task/delay state goes through the state
//! machine's transition functions in `application::workflow_engine`; the
//! helpers here are the primitive moves those functions compose.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::condition::Condition;
use crate::domain::fields::{FieldValueInput, TaskField};
use crate::domain::identity::{AccountId, UserId};
use crate::domain::performer::{Assignee, RawPerformer};
use crate::domain::template::{TaskTemplate, TemplateId, TemplateSnapshot};

/// Unique identifier for a Workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a Task of a running workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Done,
    Terminated,
    Delayed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Terminated => "terminated",
            Self::Delayed => "delayed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Active,
    Delayed,
    Completed,
    Skipped,
}

/// Resolved assignment of one assignee to one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPerformer {
    pub assignee: Assignee,
    pub is_completed: bool,
    pub date_created: DateTime<Utc>,
    pub date_completed: Option<DateTime<Utc>>,
}

impl TaskPerformer {
    pub fn new(assignee: Assignee) -> Self {
        Self {
            assignee,
            is_completed: false,
            date_created: Utc::now(),
            date_completed: None,
        }
    }

    pub fn user(&self) -> Option<UserId> {
        match self.assignee {
            Assignee::User { user_id } => Some(user_id),
            Assignee::Guest { .. } => None,
        }
    }
}

/// A timed pause on a task.
///
/// Open while `end_date` is unset; closed exactly once when the task
/// resumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delay {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// When the pause should end; the scheduler resumes the workflow once
    /// this has passed.
    pub estimated_end_date: DateTime<Utc>,
    /// Set once actually resumed, `None` while pending.
    pub end_date: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
}

impl Delay {
    pub fn new(duration: Duration, now: DateTime<Utc>) -> Self {
        Self {
            duration,
            estimated_end_date: now + chrono::Duration::seconds(duration.as_secs() as i64),
            end_date: None,
            date_created: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }
}

/// One step of a running workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub api_name: String,
    pub name: String,
    /// 1-based position within the workflow.
    pub number: u32,
    pub status: TaskStatus,
    pub require_completion_by_all: bool,
    pub raw_performers: Vec<RawPerformer>,
    pub performers: Vec<TaskPerformer>,
    pub condition: Option<Condition>,
    /// Output fields entered while working the task.
    pub fields: Vec<TaskField>,
    pub delays: Vec<Delay>,
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub due_in: Option<Duration>,
    pub due_date: Option<DateTime<Utc>>,
    pub date_started: Option<DateTime<Utc>>,
    pub date_completed: Option<DateTime<Utc>>,
}

impl Task {
    /// Materialize a pending task from its template definition.
    pub fn from_template(template: &TaskTemplate) -> Self {
        Self {
            id: TaskId::new(),
            api_name: template.api_name.clone(),
            name: template.name.clone(),
            number: template.number,
            status: TaskStatus::Pending,
            require_completion_by_all: template.require_completion_by_all,
            raw_performers: template.raw_performers.clone(),
            performers: Vec::new(),
            condition: template.condition.clone(),
            fields: template.fields.iter().map(TaskField::from_template).collect(),
            delays: Vec::new(),
            due_in: template.due_in,
            due_date: None,
            date_started: None,
            date_completed: None,
        }
    }

    /// Refresh this task's definition from a newer template version,
    /// keeping identity, execution state and entered field values.
    pub fn refresh_definition(&mut self, template: &TaskTemplate) {
        self.api_name = template.api_name.clone();
        self.name = template.name.clone();
        self.require_completion_by_all = template.require_completion_by_all;
        self.raw_performers = template.raw_performers.clone();
        self.condition = template.condition.clone();
        self.due_in = template.due_in;
        self.fields = reconcile_fields(&self.fields, &template.fields);
    }

    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Active;
        self.date_started = Some(now);
        self.date_completed = None;
        self.due_date = self
            .due_in
            .map(|d| now + chrono::Duration::seconds(d.as_secs() as i64));
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.date_completed = Some(now);
    }

    pub fn skip(&mut self) {
        self.status = TaskStatus::Skipped;
    }

    /// Reset to pending after a revert. Performers and delays are
    /// discarded; entered output values are kept.
    pub fn reset_to_pending(&mut self) {
        self.status = TaskStatus::Pending;
        self.performers.clear();
        self.delays.clear();
        self.due_date = None;
        self.date_started = None;
        self.date_completed = None;
    }

    /// Reopen as active after a revert, with completion history cleared.
    pub fn reopen(&mut self, now: DateTime<Utc>) {
        for performer in &mut self.performers {
            performer.is_completed = false;
            performer.date_completed = None;
        }
        self.delays.clear();
        self.activate(now);
    }

    pub fn open_delay(&self) -> Option<&Delay> {
        self.delays.iter().find(|d| d.is_open())
    }

    pub fn close_open_delay(&mut self, now: DateTime<Utc>) {
        if let Some(delay) = self.delays.iter_mut().find(|d| d.is_open()) {
            delay.end_date = Some(now);
        }
    }

    pub fn performer_mut(&mut self, assignee: &Assignee) -> Option<&mut TaskPerformer> {
        self.performers.iter_mut().find(|p| &p.assignee == assignee)
    }

    pub fn has_uncompleted_performers(&self) -> bool {
        self.performers.iter().any(|p| !p.is_completed)
    }

    pub fn find_field(&self, api_name: &str) -> Option<&TaskField> {
        self.fields.iter().find(|f| f.api_name == api_name)
    }
}

/// Workflow Aggregate Root
///
/// A running instance of a template, synchronized to one of its versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub account_id: AccountId,
    pub template_id: TemplateId,
    /// Template version this instance is synchronized to; only ever
    /// raised, by the version propagation service.
    pub version: u32,
    pub name: String,
    pub status: WorkflowStatus,
    /// 1-based pointer to the task currently being worked.
    pub current_task: u32,
    pub starter: UserId,
    pub kickoff: Vec<TaskField>,
    pub tasks: Vec<Task>,
    pub is_deleted: bool,
    pub date_created: DateTime<Utc>,
    pub date_completed: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Instantiate a workflow from a template snapshot.
    ///
    /// All tasks start pending with the pointer at task 1; activation of
    /// the first non-skipped task is the state machine's job.
    pub fn instantiate(
        snapshot: &TemplateSnapshot,
        account_id: AccountId,
        starter: UserId,
        kickoff_input: &HashMap<String, FieldValueInput>,
    ) -> Self {
        let kickoff = snapshot
            .kickoff
            .iter()
            .map(|template| {
                let mut field = TaskField::from_template(template);
                if let Some(input) = kickoff_input.get(&field.api_name) {
                    field.apply_input(input);
                }
                field
            })
            .collect();

        Self {
            id: WorkflowId::new(),
            account_id,
            template_id: snapshot.template_id,
            version: snapshot.version,
            name: snapshot.name.clone(),
            status: WorkflowStatus::Running,
            current_task: 1,
            starter,
            kickoff,
            tasks: snapshot.tasks.iter().map(Task::from_template).collect(),
            is_deleted: false,
            date_created: Utc::now(),
            date_completed: None,
        }
    }

    pub fn task_count(&self) -> u32 {
        self.tasks.len() as u32
    }

    pub fn task(&self, number: u32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.number == number)
    }

    pub fn task_mut(&mut self, number: u32) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.number == number)
    }

    pub fn current(&self) -> Option<&Task> {
        self.task(self.current_task)
    }

    pub fn task_by_api_name(&self, api_name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.api_name == api_name)
    }

    /// Locate a live field by api name, searching the kickoff scope first
    /// and then every task's output scope in task order.
    pub fn find_field(&self, api_name: &str) -> Option<&TaskField> {
        self.kickoff
            .iter()
            .find(|f| f.api_name == api_name)
            .or_else(|| self.tasks.iter().find_map(|t| t.find_field(api_name)))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, WorkflowStatus::Done | WorkflowStatus::Terminated)
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.status = WorkflowStatus::Done;
        self.date_completed = Some(now);
    }
}

/// Reconcile live field rows against a (possibly newer) list of field
/// declarations: declarations keep their authored order, surviving fields
/// keep their entered values and selections, removed fields are dropped.
///
/// Pure and idempotent: running it twice against the same declarations
/// yields the same rows.
pub fn reconcile_fields(
    existing: &[TaskField],
    declared: &[crate::domain::template::FieldTemplate],
) -> Vec<TaskField> {
    declared
        .iter()
        .map(|template| {
            let mut field = TaskField::from_template(template);
            if let Some(previous) = existing.iter().find(|f| f.api_name == template.api_name) {
                field.value = previous.value.clone();
                for selection in &mut field.selections {
                    selection.is_selected = previous
                        .selections
                        .iter()
                        .any(|s| s.api_name == selection.api_name && s.is_selected);
                }
            }
            field
        })
        .collect()
}
