use crate::error::{AppError, Result};
use crate::executor::strip_ansi;
use crate::models::Execution;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct ExecuteScriptRequest {
    pub params: Option<BTreeMap<String, Value>>,
}

impl ExecuteScriptRequest {
    /// Parameters travel as strings whatever their declared type. Scalars are
    /// rendered as text, nulls are dropped, nested values are rejected.
    pub fn into_params(self) -> Result<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        for (name, value) in self.params.unwrap_or_default() {
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(AppError::InvalidRequest(format!(
                        "Parameter '{}' must be a scalar value",
                        name
                    )));
                }
            };
            params.insert(name, text);
        }
        Ok(params)
    }
}

#[derive(Debug, Serialize)]
pub struct ExecutionResponse {
    pub id: String,
    pub script_id: String,
    pub user_id: String,
    pub params: Value,
    pub status: String,
    pub output: Option<String>,
    pub output_display: Option<String>,
    pub error: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl From<Execution> for ExecutionResponse {
    fn from(execution: Execution) -> Self {
        let params = serde_json::from_str(&execution.params).unwrap_or(Value::Null);
        let output_display = execution
            .output
            .as_deref()
            .map(|output| strip_ansi(output).into_owned());
        Self {
            id: execution.id,
            script_id: execution.script_id,
            user_id: execution.user_id,
            params,
            status: execution.status.as_str().to_string(),
            output: execution.output,
            output_display,
            error: execution.error,
            started_at: execution.started_at.to_rfc3339(),
            ended_at: execution.ended_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExecutionsListResponse {
    pub data: Vec<ExecutionResponse>,
}
