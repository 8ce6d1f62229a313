use async_trait::async_trait;
use automesh_core::models::{Job, JobStatus};
use automesh_core::traits::JobRepository;
use automesh_core::{ClusterError, ClusterResult};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};
use tracing::debug;

/// PostgreSQL 任务仓储实现
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> ClusterResult<Job> {
        Ok(Job {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            status: row.try_get("status")?,
            controller_node: row.try_get("controller_node")?,
            execution_node: row.try_get("execution_node")?,
            work_unit_id: row.try_get("work_unit_id")?,
            dispatch_guid: row.try_get("dispatch_guid")?,
            emitted_events: row.try_get("emitted_events")?,
            event_queries_processed: row.try_get("event_queries_processed")?,
            created: row.try_get("created")?,
            started: row.try_get("started")?,
            finished: row.try_get("finished")?,
            job_explanation: row.try_get("job_explanation")?,
            result_traceback: row.try_get("result_traceback")?,
        })
    }

    fn status_strings(statuses: &[JobStatus]) -> Vec<String> {
        statuses.iter().map(|s| s.as_str().to_string()).collect()
    }
}

const JOB_COLUMNS: &str = "id, kind, status, controller_node, execution_node, work_unit_id, \
     dispatch_guid, emitted_events, event_queries_processed, created, started, finished, \
     job_explanation, result_traceback";

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn list_by_controller(
        &self,
        controller_node: &str,
        statuses: &[JobStatus],
    ) -> ClusterResult<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE controller_node = $1 AND status = ANY($2) ORDER BY id"
        ))
        .bind(controller_node)
        .bind(Self::status_strings(statuses))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn list_by_execution_node(
        &self,
        execution_node: &str,
        statuses: &[JobStatus],
    ) -> ClusterResult<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE execution_node = $1 AND status = ANY($2) ORDER BY id"
        ))
        .bind(execution_node)
        .bind(Self::status_strings(statuses))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn list_holding_work_units(&self, unit_ids: &[String]) -> ClusterResult<Vec<Job>> {
        if unit_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE work_unit_id = ANY($1) ORDER BY id"
        ))
        .bind(unit_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn mark_terminal(
        &self,
        job_id: i64,
        expected_statuses: &[JobStatus],
        status: JobStatus,
        job_explanation: &str,
        result_traceback: &str,
        finished: DateTime<Utc>,
    ) -> ClusterResult<()> {
        // 解释与回溯文本追加合并：已包含相同内容时不重复写入
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $3, finished = $4,
                job_explanation = CASE
                    WHEN $5 = '' OR position($5 in job_explanation) > 0 THEN job_explanation
                    WHEN job_explanation = '' THEN $5
                    ELSE job_explanation || E'\n' || $5
                END,
                result_traceback = CASE
                    WHEN $6 = '' OR position($6 in result_traceback) > 0 THEN result_traceback
                    WHEN result_traceback = '' THEN $6
                    ELSE result_traceback || E'\n' || $6
                END
            WHERE id = $1 AND status = ANY($2)
            "#,
        )
        .bind(job_id)
        .bind(Self::status_strings(expected_statuses))
        .bind(status)
        .bind(finished)
        .bind(job_explanation)
        .bind(result_traceback)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ClusterError::UpdateConflict);
        }
        debug!("任务 {} 已写入终态: {}", job_id, status.as_str());
        Ok(())
    }

    async fn save_run_fields(
        &self,
        job_id: i64,
        fields: &Map<String, Value>,
    ) -> ClusterResult<()> {
        // 运行产出整体合并进JSONB列，保留其他写入方已存的键
        let result = sqlx::query(
            "UPDATE jobs SET run_fields = COALESCE(run_fields, '{}'::jsonb) || $2 WHERE id = $1",
        )
        .bind(job_id)
        .bind(Value::Object(fields.clone()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ClusterError::JobNotFound { id: job_id });
        }
        Ok(())
    }
}
