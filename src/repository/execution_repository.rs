use crate::error::{AppError, Result};
use crate::models::{Execution, ExecutionStatus};
use crate::repository::DbPool;
use chrono::Utc;
use std::collections::BTreeMap;

const EXECUTION_COLUMNS: &str =
    "id, script_id, user_id, params, status, output, error, started_at, ended_at";

#[derive(Clone)]
pub struct ExecutionRepository {
    pool: DbPool,
}

impl ExecutionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Records a launch. The row starts out `Running` with `started_at` set.
    pub async fn create(
        &self,
        script_id: &str,
        user_id: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Execution> {
        let params = serde_json::to_string(params).map_err(|e| {
            AppError::InvalidRequest(format!("Failed to serialize parameters: {}", e))
        })?;

        let execution = Execution {
            id: uuid::Uuid::new_v4().to_string(),
            script_id: script_id.to_string(),
            user_id: user_id.to_string(),
            params,
            status: ExecutionStatus::Running,
            output: None,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO executions (id, script_id, user_id, params, status, started_at, ended_at)
            VALUES (?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.script_id)
        .bind(&execution.user_id)
        .bind(&execution.params)
        .bind(execution.status as i32)
        .bind(execution.started_at)
        .execute(&self.pool)
        .await?;

        Ok(execution)
    }

    /// Writes the terminal outcome. Only the first call for a given row takes
    /// effect; later calls return `Ok(false)` and leave the row untouched.
    /// `ended_at` is only ever set together with a terminal status.
    pub async fn finalize(
        &self,
        id: &str,
        status: ExecutionStatus,
        output: Option<&str>,
        error: Option<&str>,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(AppError::InvalidRequest(format!(
                "Cannot finalize execution with non-terminal status {}",
                status.as_str()
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = ?, output = ?, error = ?, ended_at = ?
            WHERE id = ? AND ended_at IS NULL
            "#,
        )
        .bind(status as i32)
        .bind(output)
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get(&self, id: &str) -> Result<Execution> {
        let execution = sqlx::query_as::<_, Execution>(&format!(
            "SELECT {} FROM executions WHERE id = ?",
            EXECUTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::ExecutionNotFound(id.to_string()))?;

        Ok(execution)
    }

    pub async fn list_by_script(&self, script_id: &str) -> Result<Vec<Execution>> {
        let executions = sqlx::query_as::<_, Execution>(&format!(
            "SELECT {} FROM executions WHERE script_id = ? ORDER BY started_at DESC",
            EXECUTION_COLUMNS
        ))
        .bind(script_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(executions)
    }

    pub async fn list_all(&self) -> Result<Vec<Execution>> {
        let executions = sqlx::query_as::<_, Execution>(&format!(
            "SELECT {} FROM executions ORDER BY started_at DESC",
            EXECUTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(executions)
    }
}
