// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Shared delete routine.
//!
//! Entities carry an explicit `is_deleted` flag and deletion cascades by
//! an explicit policy table, one policy per relation, applied here, with no
//! inherited behavior. A workflow's tasks, performers and delays live
//! inside its aggregate and disappear with it.

use std::sync::Arc;

use tracing::info;

use crate::domain::repository::{RepositoryError, TemplateRepository, WorkflowRepository};
use crate::domain::template::TemplateId;
use crate::domain::workflow::WorkflowId;

/// What deleting an owner does to a dependent relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadePolicy {
    /// Delete the dependents too.
    Cascade,
    /// Detach the dependents; they keep running against their recorded
    /// version.
    SetNull,
    /// Refuse the delete while dependents exist.
    Protect,
}

#[derive(Debug, thiserror::Error)]
pub enum DeletionError {
    #[error("Template has unfinished workflows and the relation is protected")]
    ProtectedRelation,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct DeletionService {
    templates: Arc<dyn TemplateRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    /// Policy for the template → workflows relation.
    template_workflows: CascadePolicy,
}

impl DeletionService {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        template_workflows: CascadePolicy,
    ) -> Self {
        Self {
            templates,
            workflows,
            template_workflows,
        }
    }

    /// Soft-delete a template, applying the cascade policy to its
    /// unfinished instances.
    pub async fn delete_template(&self, template_id: TemplateId) -> Result<(), DeletionError> {
        let Some(mut template) = self.templates.find_by_id(template_id).await? else {
            return Ok(());
        };

        let unfinished = self
            .workflows
            .find_unfinished_by_template(template_id)
            .await?;

        match self.template_workflows {
            CascadePolicy::Protect if !unfinished.is_empty() => {
                return Err(DeletionError::ProtectedRelation);
            }
            CascadePolicy::Cascade => {
                for workflow_id in &unfinished {
                    self.delete_workflow(*workflow_id).await?;
                }
            }
            CascadePolicy::SetNull | CascadePolicy::Protect => {}
        }

        template.is_deleted = true;
        template.is_active = false;
        self.templates.save(&template).await?;
        info!(
            template_id = %template_id,
            instances = unfinished.len(),
            policy = ?self.template_workflows,
            "Template deleted"
        );
        Ok(())
    }

    /// Soft-delete a workflow; the owned aggregate goes with it.
    pub async fn delete_workflow(&self, workflow_id: WorkflowId) -> Result<(), DeletionError> {
        let Some(mut workflow) = self.workflows.find_by_id(workflow_id).await? else {
            return Ok(());
        };
        workflow.is_deleted = true;
        self.workflows.save(&workflow).await?;
        info!(workflow_id = %workflow_id, "Workflow deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{AccountId, UserId};
    use crate::domain::performer::RawPerformer;
    use crate::domain::template::{TaskTemplate, Template};
    use crate::domain::workflow::Workflow;
    use crate::infrastructure::memory::{InMemoryTemplateRepository, InMemoryWorkflowRepository};
    use std::collections::HashMap;

    async fn seed(
        templates: &InMemoryTemplateRepository,
        workflows: &InMemoryWorkflowRepository,
    ) -> (TemplateId, WorkflowId) {
        let template = Template::new(
            AccountId::new(),
            "proc",
            vec![TaskTemplate {
                api_name: "first".to_string(),
                name: "First".to_string(),
                number: 1,
                require_completion_by_all: false,
                raw_performers: vec![RawPerformer::WorkflowStarter],
                condition: None,
                fields: vec![],
                due_in: None,
            }],
            vec![],
        )
        .unwrap();
        templates.save(&template).await.unwrap();
        let workflow = Workflow::instantiate(
            &template.snapshot(),
            template.account_id,
            UserId::new(),
            &HashMap::new(),
        );
        workflows.save(&workflow).await.unwrap();
        (template.id, workflow.id)
    }

    #[tokio::test]
    async fn protect_refuses_while_instances_run() {
        let templates = Arc::new(InMemoryTemplateRepository::new());
        let workflows = Arc::new(InMemoryWorkflowRepository::new());
        let (template_id, _) = seed(&templates, &workflows).await;

        let service = DeletionService::new(
            templates.clone(),
            workflows.clone(),
            CascadePolicy::Protect,
        );
        assert!(matches!(
            service.delete_template(template_id).await,
            Err(DeletionError::ProtectedRelation)
        ));
        assert!(!templates
            .find_by_id(template_id)
            .await
            .unwrap()
            .unwrap()
            .is_deleted);
    }

    #[tokio::test]
    async fn cascade_deletes_instances_with_the_template() {
        let templates = Arc::new(InMemoryTemplateRepository::new());
        let workflows = Arc::new(InMemoryWorkflowRepository::new());
        let (template_id, workflow_id) = seed(&templates, &workflows).await;

        let service = DeletionService::new(
            templates.clone(),
            workflows.clone(),
            CascadePolicy::Cascade,
        );
        service.delete_template(template_id).await.unwrap();

        assert!(templates
            .find_by_id(template_id)
            .await
            .unwrap()
            .unwrap()
            .is_deleted);
        assert!(workflows
            .find_by_id(workflow_id)
            .await
            .unwrap()
            .unwrap()
            .is_deleted);
    }

    #[tokio::test]
    async fn set_null_detaches_instances() {
        let templates = Arc::new(InMemoryTemplateRepository::new());
        let workflows = Arc::new(InMemoryWorkflowRepository::new());
        let (template_id, workflow_id) = seed(&templates, &workflows).await;

        let service = DeletionService::new(
            templates.clone(),
            workflows.clone(),
            CascadePolicy::SetNull,
        );
        service.delete_template(template_id).await.unwrap();

        assert!(templates
            .find_by_id(template_id)
            .await
            .unwrap()
            .unwrap()
            .is_deleted);
        assert!(!workflows
            .find_by_id(workflow_id)
            .await
            .unwrap()
            .unwrap()
            .is_deleted);
    }
}
