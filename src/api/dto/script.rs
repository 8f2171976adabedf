use crate::error::AppError;
use crate::models::{Script, ScriptParameter};
use crate::repository::NewScript;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RegisterScriptRequest {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub body: String,
    #[serde(default)]
    pub admin_required: bool,
    #[serde(default)]
    pub parameters: Vec<ScriptParameter>,
}

impl From<RegisterScriptRequest> for NewScript {
    fn from(req: RegisterScriptRequest) -> Self {
        Self {
            name: req.name,
            slug: req.slug,
            description: req.description,
            body: req.body,
            admin_required: req.admin_required,
            parameters: req.parameters,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScriptResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub active: bool,
    pub admin_required: bool,
    pub parameters: Vec<ScriptParameter>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<Script> for ScriptResponse {
    type Error = AppError;

    fn try_from(script: Script) -> Result<Self, Self::Error> {
        let parameters = script.declared_parameters()?;
        Ok(Self {
            id: script.id,
            name: script.name,
            slug: script.slug,
            description: script.description,
            active: script.active,
            admin_required: script.admin_required,
            parameters,
            created_at: script.created_at.to_rfc3339(),
            updated_at: script.updated_at.to_rfc3339(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ScriptsListResponse {
    pub data: Vec<ScriptResponse>,
}
