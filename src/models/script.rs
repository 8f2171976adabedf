use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Script {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub body: String,
    pub active: bool,
    pub admin_required: bool,
    pub parameters: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Script {
    /// Declared parameters, in declaration order.
    pub fn declared_parameters(&self) -> Result<Vec<ScriptParameter>> {
        let Some(raw) = &self.parameters else {
            return Ok(Vec::new());
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(trimmed)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid script parameters: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScriptParamType {
    Text,
    Number,
    Boolean,
    String,
    Multiline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ScriptParamType,
    #[serde(default)]
    pub required: bool,
    pub default: Option<String>,
}
