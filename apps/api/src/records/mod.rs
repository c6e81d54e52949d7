//! Persistence for processing records.
//!
//! Every write is a plain `UPDATE ... WHERE id = $1`; concurrent writers simply overwrite each
//! other. Intake owns a record until it is queued, the worker afterwards.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::analysis::{status, AnalysisOutcome, AnalysisRow, AnalysisSnapshot};

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Inserts a new record with status `saving`.
    async fn create(&self, id: Uuid, name: &str, job_description: &str) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<AnalysisSnapshot>>;

    async fn set_status(&self, id: Uuid, status: &str) -> Result<()>;

    async fn set_enhanced_job_description(&self, id: Uuid, text: &str) -> Result<()>;

    /// Writes the scoring result and marks the record `completed`.
    async fn complete(&self, id: Uuid, outcome: &AnalysisOutcome) -> Result<()>;

    /// Marks the record `error` with a message for the client.
    async fn fail(&self, id: Uuid, message: &str) -> Result<()>;
}

pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn create(&self, id: Uuid, name: &str, job_description: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resume_analyses (id, name, status, job_description)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(status::SAVING)
        .bind(job_description)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert record {id}"))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AnalysisSnapshot>> {
        let row = sqlx::query_as::<_, AnalysisRow>("SELECT * FROM resume_analyses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load record {id}"))?;
        Ok(row.map(AnalysisSnapshot::from))
    }

    async fn set_status(&self, id: Uuid, status: &str) -> Result<()> {
        sqlx::query("UPDATE resume_analyses SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to set status '{status}' on record {id}"))?;
        Ok(())
    }

    async fn set_enhanced_job_description(&self, id: Uuid, text: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE resume_analyses
            SET enhanced_job_description = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(text)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store enhanced job description on record {id}"))?;
        Ok(())
    }

    async fn complete(&self, id: Uuid, outcome: &AnalysisOutcome) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE resume_analyses
            SET status = $2, analysis = $3, result = $4, error = $5, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status::COMPLETED)
        .bind(Json(&outcome.analysis))
        .bind(&outcome.result)
        .bind(outcome.error.as_deref())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store analysis on record {id}"))?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE resume_analyses SET status = $2, error = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(status::ERROR)
        .bind(message)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to mark record {id} as failed"))?;
        Ok(())
    }
}
