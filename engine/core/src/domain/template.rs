// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Template aggregate and its immutable version snapshots.
//!
//! A template is the authored definition of a multi-task process. Its
//! structural children (tasks, fields, conditions) are frozen into a
//! [`TemplateSnapshot`] whenever the active definition changes; snapshots
//! are the source of truth for propagating edits into running instances.
//!
//! # Invariants
//!
//! - `version` only ever increases.
//! - Task numbers are contiguous and 1-based.
//! - A snapshot, once taken, is never modified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::condition::Condition;
use crate::domain::fields::FieldType;
use crate::domain::identity::AccountId;
use crate::domain::performer::RawPerformer;

/// Unique identifier for a Template definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub Uuid);

impl TemplateId {
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

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One selectable option declared on a choice field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionTemplate {
    pub api_name: String,
    pub value: String,
}

/// Declaration of a kickoff or task output field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTemplate {
    pub api_name: String,
    pub kind: FieldType,
    pub name: String,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub selections: Vec<SelectionTemplate>,
}

/// Definition of one step of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub api_name: String,
    pub name: String,
    /// 1-based position within the template.
    pub number: u32,
    #[serde(default)]
    pub require_completion_by_all: bool,
    pub raw_performers: Vec<RawPerformer>,
    /// Evaluated when the workflow is about to activate this task; a
    /// failing condition skips the task without activating it.
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub fields: Vec<FieldTemplate>,
    /// Due window counted from task activation.
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub due_in: Option<Duration>,
}

/// Template Aggregate Root
///
/// Authored, versioned definition of a multi-task process. The live
/// definition is mutable through [`Template::commit_revision`], which bumps
/// the version and returns the immutable snapshot to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub account_id: AccountId,
    pub name: String,
    /// Monotonically increasing; running instances record which version
    /// they are synchronized to.
    pub version: u32,
    pub is_active: bool,
    pub is_deleted: bool,
    pub tasks: Vec<TaskTemplate>,
    pub kickoff: Vec<FieldTemplate>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl Template {
    /// Create a new template with validation.
    pub fn new(
        account_id: AccountId,
        name: impl Into<String>,
        tasks: Vec<TaskTemplate>,
        kickoff: Vec<FieldTemplate>,
    ) -> Result<Self, TemplateError> {
        Self::validate_structure(&tasks)?;
        let now = Utc::now();
        Ok(Self {
            id: TemplateId::new(),
            account_id,
            name: name.into(),
            version: 1,
            is_active: true,
            is_deleted: false,
            tasks,
            kickoff,
            date_created: now,
            date_updated: now,
        })
    }

    fn validate_structure(tasks: &[TaskTemplate]) -> Result<(), TemplateError> {
        if tasks.is_empty() {
            return Err(TemplateError::NoTasks);
        }
        for (index, task) in tasks.iter().enumerate() {
            let expected = index as u32 + 1;
            if task.number != expected {
                return Err(TemplateError::NonContiguousTaskNumbers {
                    expected,
                    found: task.number,
                });
            }
        }
        Ok(())
    }

    /// Replace the structural definition, bump the version and return the
    /// snapshot to persist for propagation.
    pub fn commit_revision(
        &mut self,
        tasks: Vec<TaskTemplate>,
        kickoff: Vec<FieldTemplate>,
    ) -> Result<TemplateSnapshot, TemplateError> {
        Self::validate_structure(&tasks)?;
        self.tasks = tasks;
        self.kickoff = kickoff;
        self.version += 1;
        self.date_updated = Utc::now();
        Ok(self.snapshot())
    }

    /// Freeze the current definition into an immutable snapshot.
    pub fn snapshot(&self) -> TemplateSnapshot {
        TemplateSnapshot {
            template_id: self.id,
            version: self.version,
            name: self.name.clone(),
            tasks: self.tasks.clone(),
            kickoff: self.kickoff.clone(),
            captured_at: Utc::now(),
        }
    }

    pub fn task_count(&self) -> u32 {
        self.tasks.len() as u32
    }
}

/// Immutable snapshot of a template's full definition at one version.
///
/// A typed, versioned document: the propagation diff walks its ordered
/// task list and kickoff field list directly, no untyped nesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSnapshot {
    pub template_id: TemplateId,
    pub version: u32,
    pub name: String,
    pub tasks: Vec<TaskTemplate>,
    pub kickoff: Vec<FieldTemplate>,
    pub captured_at: DateTime<Utc>,
}

/// Template construction/edit errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template must have at least one task")]
    NoTasks,

    #[error("Task numbers must be contiguous and 1-based: expected {expected}, found {found}")]
    NonContiguousTaskNumbers { expected: u32, found: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(number: u32) -> TaskTemplate {
        TaskTemplate {
            api_name: format!("task-{number}"),
            name: format!("Task {number}"),
            number,
            require_completion_by_all: false,
            raw_performers: vec![RawPerformer::WorkflowStarter],
            condition: None,
            fields: vec![],
            due_in: None,
        }
    }

    #[test]
    fn rejects_empty_task_list() {
        let result = Template::new(AccountId::new(), "empty", vec![], vec![]);
        assert!(matches!(result, Err(TemplateError::NoTasks)));
    }

    #[test]
    fn rejects_gapped_task_numbers() {
        let result = Template::new(AccountId::new(), "gapped", vec![task(1), task(3)], vec![]);
        assert!(matches!(
            result,
            Err(TemplateError::NonContiguousTaskNumbers {
                expected: 2,
                found: 3
            })
        ));
    }

    #[test]
    fn commit_revision_bumps_version_monotonically() {
        let mut template =
            Template::new(AccountId::new(), "proc", vec![task(1), task(2)], vec![]).unwrap();
        assert_eq!(template.version, 1);

        let snapshot = template
            .commit_revision(vec![task(1)], vec![])
            .unwrap();
        assert_eq!(template.version, 2);
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.tasks.len(), 1);

        let snapshot = template
            .commit_revision(vec![task(1), task(2), task(3)], vec![])
            .unwrap();
        assert_eq!(snapshot.version, 3);
    }

    #[test]
    fn snapshot_is_detached_from_later_edits() {
        let mut template =
            Template::new(AccountId::new(), "proc", vec![task(1), task(2)], vec![]).unwrap();
        let snapshot = template.snapshot();
        template.commit_revision(vec![task(1)], vec![]).unwrap();
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.version, 1);
    }
}
