use crate::error::{AppError, Result};
use crate::models::{Script, ScriptParameter};
use crate::repository::DbPool;
use chrono::Utc;

const SCRIPT_COLUMNS: &str = "id, name, slug, description, body, active, admin_required, \
     parameters, created_at, updated_at";

/// Fields supplied when registering a script in the catalog.
#[derive(Debug, Clone)]
pub struct NewScript {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub body: String,
    pub admin_required: bool,
    pub parameters: Vec<ScriptParameter>,
}

#[derive(Clone)]
pub struct ScriptRepository {
    pool: DbPool,
}

impl ScriptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_active(&self) -> Result<Vec<Script>> {
        let scripts = sqlx::query_as::<_, Script>(&format!(
            "SELECT {} FROM scripts WHERE active = 1 ORDER BY name ASC",
            SCRIPT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(scripts)
    }

    pub async fn get(&self, id: &str) -> Result<Script> {
        let script = sqlx::query_as::<_, Script>(&format!(
            "SELECT {} FROM scripts WHERE id = ?",
            SCRIPT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::ScriptNotFound(id.to_string()))?;

        Ok(script)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Script> {
        let script = sqlx::query_as::<_, Script>(&format!(
            "SELECT {} FROM scripts WHERE slug = ?",
            SCRIPT_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::ScriptNotFound(slug.to_string()))?;

        Ok(script)
    }

    pub async fn create(&self, new_script: NewScript) -> Result<Script> {
        if self.get_by_slug(&new_script.slug).await.is_ok() {
            return Err(AppError::ScriptAlreadyExists(new_script.slug));
        }
        self.insert(new_script).await
    }

    /// Inserts without the friendly pre-check. A concurrent registration of
    /// the same slug still surfaces as `ScriptAlreadyExists` through the
    /// UNIQUE constraint.
    async fn insert(&self, new_script: NewScript) -> Result<Script> {
        let parameters = if new_script.parameters.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&new_script.parameters).map_err(|e| {
                AppError::InvalidRequest(format!("Failed to serialize parameters: {}", e))
            })?)
        };

        let now = Utc::now();
        let script = Script {
            id: uuid::Uuid::new_v4().to_string(),
            name: new_script.name,
            slug: new_script.slug,
            description: new_script.description,
            body: new_script.body,
            active: true,
            admin_required: new_script.admin_required,
            parameters,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO scripts (id, name, slug, description, body, active, admin_required, parameters, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&script.id)
        .bind(&script.name)
        .bind(&script.slug)
        .bind(&script.description)
        .bind(&script.body)
        .bind(script.active)
        .bind(script.admin_required)
        .bind(&script.parameters)
        .bind(script.created_at)
        .bind(script.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::ScriptAlreadyExists(script.slug.clone())
            }
            other => AppError::Database(other),
        })?;

        Ok(script)
    }

    pub async fn update_active(&self, id: &str, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE scripts SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ScriptNotFound(id.to_string()));
        }

        Ok(())
    }
}
