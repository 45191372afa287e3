//! PostgreSQL-backed queue primitives over `communication_jobs`.
//!
//! All primitives are transactional: the claim is one
//! select-lock-update-commit statement, every other write is a single
//! statement. No transaction is ever held across a provider call.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::job::{Job, JobStatus, NewJob};

/// Result type for enqueue operations that handles idempotency.
#[derive(Debug, Clone)]
pub enum EnqueueResult {
    /// Job was enqueued, returns new job ID
    Created(i64),
    /// A non-terminal job already exists for the same
    /// (tenant, job_type, source_reference), returns the existing job ID
    Duplicate(i64),
}

impl EnqueueResult {
    /// Get the job ID regardless of whether it was created or duplicate
    pub fn job_id(&self) -> i64 {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    /// Returns true if this was a newly created job
    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// Trait for the central queue primitives.
///
/// Implementations provide durable at-least-once storage of communication
/// jobs. The postgres implementation is [`PgJobStore`]; tests substitute an
/// in-memory store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically claim up to `limit` due pending jobs, transitioning them
    /// to `processing`.
    ///
    /// Two workers polling simultaneously never receive the same row; the
    /// implementation must skip rows locked by other claimants. FIFO by
    /// `created_at`, then `id`.
    async fn claim_pending(&self, limit: i64) -> Result<Vec<Job>>;

    /// Terminal success. `note` records a skip reason (e.g. customer opted
    /// out) when the handler completed without sending.
    async fn mark_complete(&self, job_id: i64, note: Option<&str>) -> Result<()>;

    /// Return a `processing` job to the queue, used for both retry and
    /// quiet-hour deferral (the caller supplies the status and the
    /// retry_count to record).
    async fn reschedule(
        &self,
        job_id: i64,
        retry_count: i32,
        process_after: DateTime<Utc>,
        last_error: &str,
        status: JobStatus,
    ) -> Result<()>;

    /// Terminal failure. Callers pass `FailedFallbackEmail` when a fallback
    /// companion job was created.
    async fn mark_failed(&self, job_id: i64, last_error: &str, status: JobStatus) -> Result<()>;

    /// Insert a new job.
    ///
    /// When the job carries a `source_reference` and a non-terminal row
    /// already exists for (tenant, job_type, source_reference), the insert
    /// is short-circuited and `Duplicate` is returned.
    async fn insert_job(&self, job: NewJob) -> Result<EnqueueResult>;

    /// Cancel a pending job. Returns whether a row was affected.
    async fn cancel_pending(&self, job_id: i64) -> Result<bool>;
}

const JOB_COLUMNS: &str = "id, tenant_id, job_type, payload, status, retry_count, max_retries, \
                           last_error, process_after, source_reference, created_at, updated_at, \
                           completed_at";

/// PostgreSQL-backed implementation of [`JobStore`].
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_active_by_reference(&self, job: &NewJob, reference: &str) -> Result<Option<i64>> {
        let existing = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id
            FROM communication_jobs
            WHERE tenant_id = $1
              AND job_type = $2
              AND source_reference = $3
              AND status IN ('pending', 'processing', 'complete')
            LIMIT 1
            "#,
        )
        .bind(&job.tenant_id)
        .bind(job.job_type)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(existing)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn claim_pending(&self, limit: i64) -> Result<Vec<Job>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let jobs = sqlx::query_as::<_, Job>(&format!(
            r#"
            WITH due AS (
                SELECT id
                FROM communication_jobs
                WHERE status = 'pending'
                  AND process_after <= NOW()
                ORDER BY created_at, id
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE communication_jobs
            SET status = 'processing',
                updated_at = NOW()
            WHERE id IN (SELECT id FROM due)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn mark_complete(&self, job_id: i64, note: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE communication_jobs
            SET status = 'complete',
                completed_at = NOW(),
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(note)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reschedule(
        &self,
        job_id: i64,
        retry_count: i32,
        process_after: DateTime<Utc>,
        last_error: &str,
        status: JobStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE communication_jobs
            SET status = $2,
                retry_count = $3,
                process_after = $4,
                last_error = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(retry_count)
        .bind(process_after)
        .bind(last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, job_id: i64, last_error: &str, status: JobStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE communication_jobs
            SET status = $2,
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_job(&self, job: NewJob) -> Result<EnqueueResult> {
        // Pre-check keeps the common duplicate path cheap; the partial
        // unique index is the race-safe backstop.
        if let Some(reference) = &job.source_reference {
            if let Some(id) = self.find_active_by_reference(&job, reference).await? {
                return Ok(EnqueueResult::Duplicate(id));
            }
        }

        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO communication_jobs
                (tenant_id, job_type, payload, max_retries, process_after, source_reference)
            VALUES ($1, $2, $3, $4, COALESCE($5, NOW()), $6)
            RETURNING id
            "#,
        )
        .bind(&job.tenant_id)
        .bind(job.job_type)
        .bind(&job.payload)
        .bind(job.max_retries)
        .bind(job.process_after)
        .bind(&job.source_reference)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(id) => Ok(EnqueueResult::Created(id)),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                // Lost the race to a concurrent insert with the same
                // reference; surface the winner.
                if let Some(reference) = &job.source_reference {
                    if let Some(id) = self.find_active_by_reference(&job, reference).await? {
                        return Ok(EnqueueResult::Duplicate(id));
                    }
                }
                anyhow::bail!(
                    "insert of job ({}, {}) conflicted but no active row found",
                    job.tenant_id,
                    job.job_type
                )
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel_pending(&self, job_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE communication_jobs
            SET status = 'cancelled',
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_result_helpers() {
        let created = EnqueueResult::Created(7);
        assert!(created.is_created());
        assert_eq!(created.job_id(), 7);

        let duplicate = EnqueueResult::Duplicate(9);
        assert!(!duplicate.is_created());
        assert_eq!(duplicate.job_id(), 9);
    }
}
