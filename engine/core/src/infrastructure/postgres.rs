// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! PostgreSQL-backed repositories.
//!
//! Aggregates are stored as a JSONB document alongside the scalar
//! columns the engine queries on. Expected schema:
//!
//! ```sql
//! CREATE TABLE templates (
//!     id UUID PRIMARY KEY,
//!     account_id UUID NOT NULL,
//!     version INT NOT NULL,
//!     is_active BOOLEAN NOT NULL,
//!     is_deleted BOOLEAN NOT NULL,
//!     domain_json JSONB NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE template_versions (
//!     template_id UUID NOT NULL,
//!     version INT NOT NULL,
//!     snapshot_json JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     PRIMARY KEY (template_id, version)
//! );
//!
//! CREATE TABLE workflows (
//!     id UUID PRIMARY KEY,
//!     account_id UUID NOT NULL,
//!     template_id UUID NOT NULL,
//!     version INT NOT NULL,
//!     status TEXT NOT NULL,
//!     current_task INT NOT NULL,
//!     delay_estimated_end TIMESTAMPTZ,
//!     is_deleted BOOLEAN NOT NULL,
//!     domain_json JSONB NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::repository::{RepositoryError, TemplateRepository, WorkflowRepository};
use crate::domain::template::{Template, TemplateId, TemplateSnapshot};
use crate::domain::workflow::{Workflow, WorkflowId};

pub struct PostgresTemplateRepository {
    pool: PgPool,
}

impl PostgresTemplateRepository {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for PostgresTemplateRepository {
    async fn save(&self, template: &Template) -> Result<(), RepositoryError> {
        let domain_json = serde_json::to_value(template)?;
        sqlx::query(
            r#"
            INSERT INTO templates (id, account_id, version, is_active, is_deleted, domain_json, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (id) DO UPDATE SET
                version = EXCLUDED.version,
                is_active = EXCLUDED.is_active,
                is_deleted = EXCLUDED.is_deleted,
                domain_json = EXCLUDED.domain_json,
                updated_at = NOW()
            "#,
        )
        .bind(template.id.0)
        .bind(template.account_id.0)
        .bind(template.version as i32)
        .bind(template.is_active)
        .bind(template.is_deleted)
        .bind(&domain_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: TemplateId) -> Result<Option<Template>, RepositoryError> {
        let row = sqlx::query("SELECT domain_json FROM templates WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let json: serde_json::Value = row.try_get("domain_json")?;
                Ok(Some(serde_json::from_value(json)?))
            }
            None => Ok(None),
        }
    }

    async fn save_snapshot(&self, snapshot: &TemplateSnapshot) -> Result<(), RepositoryError> {
        let snapshot_json = serde_json::to_value(snapshot)?;
        // snapshots are immutable: first write wins
        sqlx::query(
            r#"
            INSERT INTO template_versions (template_id, version, snapshot_json, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (template_id, version) DO NOTHING
            "#,
        )
        .bind(snapshot.template_id.0)
        .bind(snapshot.version as i32)
        .bind(&snapshot_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_snapshot(
        &self,
        template_id: TemplateId,
        version: u32,
    ) -> Result<Option<TemplateSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT snapshot_json FROM template_versions WHERE template_id = $1 AND version = $2",
        )
        .bind(template_id.0)
        .bind(version as i32)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let json: serde_json::Value = row.try_get("snapshot_json")?;
                Ok(Some(serde_json::from_value(json)?))
            }
            None => Ok(None),
        }
    }
}

pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn save(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let domain_json = serde_json::to_value(workflow)?;
        let delay_estimated_end: Option<DateTime<Utc>> = workflow
            .current()
            .and_then(|t| t.open_delay())
            .map(|d| d.estimated_end_date);

        sqlx::query(
            r#"
            INSERT INTO workflows
                (id, account_id, template_id, version, status, current_task,
                 delay_estimated_end, is_deleted, domain_json, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (id) DO UPDATE SET
                version = EXCLUDED.version,
                status = EXCLUDED.status,
                current_task = EXCLUDED.current_task,
                delay_estimated_end = EXCLUDED.delay_estimated_end,
                is_deleted = EXCLUDED.is_deleted,
                domain_json = EXCLUDED.domain_json,
                updated_at = NOW()
            "#,
        )
        .bind(workflow.id.0)
        .bind(workflow.account_id.0)
        .bind(workflow.template_id.0)
        .bind(workflow.version as i32)
        .bind(workflow.status.as_str())
        .bind(workflow.current_task as i32)
        .bind(delay_estimated_end)
        .bind(workflow.is_deleted)
        .bind(&domain_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT domain_json FROM workflows WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let json: serde_json::Value = row.try_get("domain_json")?;
                Ok(Some(serde_json::from_value(json)?))
            }
            None => Ok(None),
        }
    }

    async fn find_unfinished_by_template(
        &self,
        template_id: TemplateId,
    ) -> Result<Vec<WorkflowId>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM workflows
            WHERE template_id = $1
              AND status IN ('running', 'delayed')
              AND is_deleted = FALSE
            ORDER BY updated_at
            "#,
        )
        .bind(template_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<uuid::Uuid, _>("id")
                    .map(WorkflowId::from_uuid)
                    .map_err(RepositoryError::from)
            })
            .collect()
    }

    async fn find_due_delayed(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkflowId>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM workflows
            WHERE status = 'delayed'
              AND delay_estimated_end IS NOT NULL
              AND delay_estimated_end <= $1
              AND is_deleted = FALSE
            ORDER BY delay_estimated_end
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<uuid::Uuid, _>("id")
                    .map(WorkflowId::from_uuid)
                    .map_err(RepositoryError::from)
            })
            .collect()
    }
}
