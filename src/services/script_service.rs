use crate::error::{AppError, Result};
use crate::executor::is_parameter_name;
use crate::models::Script;
use crate::repository::{NewScript, ScriptRepository};
use std::collections::HashSet;

#[derive(Clone)]
pub struct ScriptService {
    repo: ScriptRepository,
}

impl ScriptService {
    pub fn new(repo: ScriptRepository) -> Self {
        Self { repo }
    }

    pub async fn list_scripts(&self) -> Result<Vec<Script>> {
        self.repo.list_active().await
    }

    pub async fn get_script(&self, id: &str) -> Result<Script> {
        self.repo.get(id).await
    }

    pub async fn register_script(&self, new_script: NewScript) -> Result<Script> {
        Self::validate(&new_script)?;
        self.repo.create(new_script).await
    }

    pub async fn enable_script(&self, id: &str) -> Result<()> {
        self.repo.update_active(id, true).await
    }

    pub async fn disable_script(&self, id: &str) -> Result<()> {
        self.repo.update_active(id, false).await
    }

    fn validate(new_script: &NewScript) -> Result<()> {
        if new_script.name.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Script name cannot be empty".to_string(),
            ));
        }
        if !is_valid_slug(&new_script.slug) {
            return Err(AppError::InvalidRequest(format!(
                "Invalid slug '{}': use lowercase letters, digits and '-'",
                new_script.slug
            )));
        }
        if new_script.body.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Script body cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for param in &new_script.parameters {
            if !is_parameter_name(&param.name) {
                return Err(AppError::InvalidRequest(format!(
                    "Invalid parameter name '{}'",
                    param.name
                )));
            }
            if !seen.insert(param.name.to_ascii_lowercase()) {
                return Err(AppError::InvalidRequest(format!(
                    "Duplicate parameter name: {}",
                    param.name
                )));
            }
        }
        Ok(())
    }
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScriptParamType, ScriptParameter};
    use crate::repository::memory_pool;

    fn new_script(slug: &str, params: &[&str]) -> NewScript {
        NewScript {
            name: "Audit licenses".to_string(),
            slug: slug.to_string(),
            description: String::new(),
            body: "Get-MgSubscribedSku".to_string(),
            admin_required: false,
            parameters: params
                .iter()
                .map(|name| ScriptParameter {
                    name: name.to_string(),
                    param_type: ScriptParamType::Text,
                    required: false,
                    default: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn registers_and_toggles_scripts() {
        let service = ScriptService::new(ScriptRepository::new(memory_pool().await));
        let script = service
            .register_script(new_script("audit-licenses", &["Tenant"]))
            .await
            .expect("register");

        assert_eq!(service.list_scripts().await.expect("list").len(), 1);
        service.disable_script(&script.id).await.expect("disable");
        assert!(service.list_scripts().await.expect("list").is_empty());
        assert!(!service.get_script(&script.id).await.expect("get").active);
        service.enable_script(&script.id).await.expect("enable");
        assert!(service.get_script(&script.id).await.expect("get").active);
    }

    #[tokio::test]
    async fn rejects_bad_slugs_and_parameter_names() {
        let service = ScriptService::new(ScriptRepository::new(memory_pool().await));

        for slug in ["", "Has Caps", "-leading"] {
            let err = service.register_script(new_script(slug, &[])).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidRequest(_)), "slug {:?}", slug);
        }

        let err = service
            .register_script(new_script("ok", &["1bad"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let err = service
            .register_script(new_script("ok", &["Tenant", "tenant"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(msg) if msg.contains("Duplicate")));
    }
}
