use crate::error::{AppError, Result};
use crate::executor::{ExecutionEvent, ExecutionPipeline, compose_script};
use crate::models::{Caller, Execution, Script};
use crate::repository::{ExecutionRepository, ScriptRepository};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct ExecutionService {
    exec_repo: ExecutionRepository,
    script_repo: ScriptRepository,
    pipeline: ExecutionPipeline,
}

impl ExecutionService {
    pub fn new(
        exec_repo: ExecutionRepository,
        script_repo: ScriptRepository,
        pipeline: ExecutionPipeline,
    ) -> Self {
        Self {
            exec_repo,
            script_repo,
            pipeline,
        }
    }

    /// Authorizes the caller, records the execution and launches it in the
    /// background. Authorization failures return before any record exists.
    ///
    /// The returned receiver yields `execution_id` first and `done` last. The
    /// run is detached from the receiver: dropping it does not stop the
    /// interpreter.
    pub async fn start_execution(
        &self,
        caller: &Caller,
        script_id: &str,
        params: BTreeMap<String, String>,
    ) -> Result<mpsc::UnboundedReceiver<ExecutionEvent>> {
        let script = self.script_repo.get(script_id).await?;
        authorize(caller, &script)?;

        let execution = self
            .exec_repo
            .create(&script.id, &caller.user_id, &params)
            .await?;
        tracing::info!(
            execution_id = %execution.id,
            script_id = %script.id,
            user_id = %caller.user_id,
            "Launching script '{}'",
            script.slug
        );

        let script_text =
            compose_script(self.pipeline.interpreter().dialect, &script.body, &params);

        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is still in hand, so this cannot fail.
        let _ = tx.send(ExecutionEvent::ExecutionId(execution.id.clone()));

        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            pipeline.run(execution.id, script_text, tx).await;
        });

        Ok(rx)
    }

    pub async fn get_execution(&self, id: &str) -> Result<Execution> {
        self.exec_repo.get(id).await
    }

    pub async fn list_executions(&self, script_id: Option<String>) -> Result<Vec<Execution>> {
        if let Some(sid) = script_id {
            self.exec_repo.list_by_script(&sid).await
        } else {
            self.exec_repo.list_all().await
        }
    }
}

/// Execution gate applied after the script has been resolved.
pub fn authorize(caller: &Caller, script: &Script) -> Result<()> {
    if !script.active {
        return Err(AppError::ScriptInactive(script.id.clone()));
    }
    if !caller.role.can_execute() {
        return Err(AppError::Forbidden(
            "Your role does not allow running scripts".to_string(),
        ));
    }
    if script.admin_required && !caller.role.is_admin() {
        return Err(AppError::Forbidden(format!(
            "Script '{}' requires the admin role",
            script.name
        )));
    }
    Ok(())
}
