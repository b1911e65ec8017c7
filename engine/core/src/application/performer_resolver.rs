// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Performer Resolver
//!
//! Expands a task's raw performer declarations into the concrete set of
//! assignees and materializes them as task performer rows.
//!
//! Resolution is a plain in-process set union over data fetched through
//! the directory port: {direct users} ∪ {members of referenced groups} ∪
//! {field-referenced users} ∪ {workflow starter}, de-duplicated. Guests
//! ride a narrower path: identified by email, granted a time-boxed
//! single-task token, never expanded through groups.
//!
//! Materialization is idempotent: re-resolving an already-active task
//! adds no duplicate rows, and only removes assignees who both left the
//! resolved set and have not completed their portion: a completed
//! assignment is never silently revoked.

use std::sync::Arc;

use tracing::debug;

use crate::domain::fields::FieldType;
use crate::domain::performer::{Assignee, RawPerformer, ResolvedPerformers};
use crate::domain::repository::{Directory, GuestAccess, RepositoryError};
use crate::domain::workflow::{Task, TaskPerformer, Workflow};

pub struct PerformerResolver {
    directory: Arc<dyn Directory>,
    guest_access: Arc<dyn GuestAccess>,
}

impl PerformerResolver {
    pub fn new(directory: Arc<dyn Directory>, guest_access: Arc<dyn GuestAccess>) -> Self {
        Self {
            directory,
            guest_access,
        }
    }

    /// Expand raw declarations into the union of concrete assignees.
    pub async fn resolve(
        &self,
        raw_performers: &[RawPerformer],
        workflow: &Workflow,
    ) -> Result<ResolvedPerformers, RepositoryError> {
        let mut resolved = ResolvedPerformers::default();

        for declaration in raw_performers {
            match declaration {
                RawPerformer::User { user_id } => {
                    resolved.users.insert(*user_id);
                }
                RawPerformer::Group { group_id } => {
                    // membership is read live, not snapshotted
                    for member in self.directory.group_members(*group_id).await? {
                        resolved.users.insert(member);
                    }
                }
                RawPerformer::FieldRef { api_name } => {
                    if let Some(user_id) = self.field_referenced_user(api_name, workflow).await? {
                        resolved.users.insert(user_id);
                    }
                }
                RawPerformer::WorkflowStarter => {
                    resolved.users.insert(workflow.starter);
                }
                RawPerformer::Guest { email } => {
                    resolved.guests.insert(email.clone());
                }
            }
        }

        Ok(resolved)
    }

    /// Read the live value of a user-typed field; an empty or dangling
    /// reference contributes no performer.
    async fn field_referenced_user(
        &self,
        api_name: &str,
        workflow: &Workflow,
    ) -> Result<Option<crate::domain::identity::UserId>, RepositoryError> {
        let Some(field) = workflow.find_field(api_name) else {
            debug!(
                workflow_id = %workflow.id,
                api_name,
                "performer field reference not found, contributes nothing"
            );
            return Ok(None);
        };
        if field.kind != FieldType::User {
            return Ok(None);
        }
        let Some(raw) = field.value.as_deref().filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        let Ok(uuid) = uuid::Uuid::parse_str(raw.trim()) else {
            return Ok(None);
        };
        let user_id = crate::domain::identity::UserId::from_uuid(uuid);
        // field values are user input; only live members are assigned
        if self.directory.user_exists(user_id).await? {
            Ok(Some(user_id))
        } else {
            Ok(None)
        }
    }

    /// Materialize the resolved set as performer rows on the task.
    pub async fn sync_task_performers(
        &self,
        task: &mut Task,
        resolved: &ResolvedPerformers,
    ) -> Result<(), RepositoryError> {
        for user_id in &resolved.users {
            let assignee = Assignee::User { user_id: *user_id };
            if task.performer_mut(&assignee).is_none() {
                task.performers.push(TaskPerformer::new(assignee));
            }
        }

        for email in &resolved.guests {
            let assignee = Assignee::Guest {
                email: email.clone(),
            };
            if task.performer_mut(&assignee).is_none() {
                self.guest_access.grant_task_access(email, task.id).await?;
                task.performers.push(TaskPerformer::new(assignee));
            }
        }

        // completed assignments are never revoked
        task.performers
            .retain(|p| p.is_completed || resolved.contains(&p.assignee));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fields::FieldValueInput;
    use crate::domain::identity::{AccountId, GroupId, UserId};
    use crate::domain::template::{FieldTemplate, TaskTemplate, Template};
    use crate::infrastructure::memory::{InMemoryDirectory, InMemoryGuestAccess};
    use std::collections::HashMap;

    fn fixture() -> (Arc<InMemoryDirectory>, Arc<InMemoryGuestAccess>, PerformerResolver) {
        let directory = Arc::new(InMemoryDirectory::new());
        let guest_access = Arc::new(InMemoryGuestAccess::new());
        let resolver = PerformerResolver::new(directory.clone(), guest_access.clone());
        (directory, guest_access, resolver)
    }

    fn workflow_with_user_field(field_value: Option<UserId>) -> Workflow {
        let template = Template::new(
            AccountId::new(),
            "proc",
            vec![TaskTemplate {
                api_name: "first".to_string(),
                name: "First".to_string(),
                number: 1,
                require_completion_by_all: false,
                raw_performers: vec![],
                condition: None,
                fields: vec![],
                due_in: None,
            }],
            vec![FieldTemplate {
                api_name: "approver".to_string(),
                kind: FieldType::User,
                name: "Approver".to_string(),
                is_required: false,
                selections: vec![],
            }],
        )
        .unwrap();
        let mut input = HashMap::new();
        if let Some(user_id) = field_value {
            input.insert(
                "approver".to_string(),
                FieldValueInput::value(user_id.as_uuid().to_string()),
            );
        }
        Workflow::instantiate(&template.snapshot(), AccountId::new(), UserId::new(), &input)
    }

    fn bare_task(workflow: &Workflow) -> Task {
        workflow.task(1).unwrap().clone()
    }

    #[tokio::test]
    async fn union_is_deduplicated_across_declarations() {
        let (directory, _, resolver) = fixture();
        let group_id = GroupId::new();
        let shared = UserId::new();
        let other = UserId::new();
        directory.add_user(shared);
        directory.add_user(other);
        directory.add_group_member(group_id, shared);
        directory.add_group_member(group_id, other);

        let workflow = workflow_with_user_field(None);
        let raw = vec![
            RawPerformer::User { user_id: shared },
            RawPerformer::Group { group_id },
        ];
        let resolved = resolver.resolve(&raw, &workflow).await.unwrap();

        assert_eq!(resolved.users.len(), 2);
        assert!(resolved.users.contains(&shared));
        assert!(resolved.users.contains(&other));
    }

    #[tokio::test]
    async fn field_reference_with_no_value_contributes_nothing() {
        let (_, _, resolver) = fixture();
        let workflow = workflow_with_user_field(None);
        let raw = vec![RawPerformer::FieldRef {
            api_name: "approver".to_string(),
        }];
        let resolved = resolver.resolve(&raw, &workflow).await.unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn field_reference_resolves_live_member() {
        let (directory, _, resolver) = fixture();
        let approver = UserId::new();
        directory.add_user(approver);

        let workflow = workflow_with_user_field(Some(approver));
        let raw = vec![RawPerformer::FieldRef {
            api_name: "approver".to_string(),
        }];
        let resolved = resolver.resolve(&raw, &workflow).await.unwrap();
        assert_eq!(resolved.user_ids(), vec![approver]);
    }

    #[tokio::test]
    async fn starter_declaration_resolves_to_the_starter() {
        let (_, _, resolver) = fixture();
        let workflow = workflow_with_user_field(None);
        let resolved = resolver
            .resolve(&[RawPerformer::WorkflowStarter], &workflow)
            .await
            .unwrap();
        assert_eq!(resolved.user_ids(), vec![workflow.starter]);
    }

    #[tokio::test]
    async fn sync_is_idempotent() {
        let (directory, _, resolver) = fixture();
        let user = UserId::new();
        directory.add_user(user);

        let workflow = workflow_with_user_field(None);
        let mut task = bare_task(&workflow);
        let resolved = resolver
            .resolve(&[RawPerformer::User { user_id: user }], &workflow)
            .await
            .unwrap();

        resolver
            .sync_task_performers(&mut task, &resolved)
            .await
            .unwrap();
        resolver
            .sync_task_performers(&mut task, &resolved)
            .await
            .unwrap();

        assert_eq!(task.performers.len(), 1);
    }

    #[tokio::test]
    async fn removed_member_is_unassigned_unless_completed() {
        let (directory, _, resolver) = fixture();
        let group_id = GroupId::new();
        let leaver = UserId::new();
        let finisher = UserId::new();
        directory.add_group_member(group_id, leaver);
        directory.add_group_member(group_id, finisher);

        let workflow = workflow_with_user_field(None);
        let mut task = bare_task(&workflow);
        let raw = vec![RawPerformer::Group { group_id }];

        let resolved = resolver.resolve(&raw, &workflow).await.unwrap();
        resolver
            .sync_task_performers(&mut task, &resolved)
            .await
            .unwrap();
        assert_eq!(task.performers.len(), 2);

        // finisher completes their portion, then both leave the group
        task.performer_mut(&Assignee::User { user_id: finisher })
            .unwrap()
            .is_completed = true;
        directory.remove_group_member(group_id, leaver);
        directory.remove_group_member(group_id, finisher);

        let resolved = resolver.resolve(&raw, &workflow).await.unwrap();
        resolver
            .sync_task_performers(&mut task, &resolved)
            .await
            .unwrap();

        assert_eq!(task.performers.len(), 1);
        assert_eq!(
            task.performers[0].assignee,
            Assignee::User { user_id: finisher }
        );
    }

    #[tokio::test]
    async fn guest_gets_a_token_once() {
        let (_, guest_access, resolver) = fixture();
        let workflow = workflow_with_user_field(None);
        let mut task = bare_task(&workflow);
        let raw = vec![RawPerformer::Guest {
            email: "audit@example.com".to_string(),
        }];

        let resolved = resolver.resolve(&raw, &workflow).await.unwrap();
        resolver
            .sync_task_performers(&mut task, &resolved)
            .await
            .unwrap();
        resolver
            .sync_task_performers(&mut task, &resolved)
            .await
            .unwrap();

        assert_eq!(task.performers.len(), 1);
        assert_eq!(guest_access.grants().len(), 1);
        assert_eq!(guest_access.grants()[0].0, "audit@example.com");
    }
}
