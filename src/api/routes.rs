use super::handlers::{execution, health, script};
use super::middleware::cors::add_cors;
use crate::services::{ExecutionService, ScriptService};
use axum::{
    Router,
    routing::{get, post, put},
};

#[derive(Clone)]
pub struct AppState {
    pub script_service: ScriptService,
    pub execution_service: ExecutionService,
}

pub fn create_router(script_service: ScriptService, execution_service: ExecutionService) -> Router {
    let state = AppState {
        script_service,
        execution_service,
    };

    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Script catalog
        .route("/api/scripts", get(script::list_scripts))
        .route("/api/scripts", post(script::register_script))
        .route("/api/scripts/{id}", get(script::get_script))
        .route("/api/scripts/{id}/enable", put(script::enable_script))
        .route("/api/scripts/{id}/disable", put(script::disable_script))
        // Execution
        .route("/api/scripts/{id}/execute", post(execution::execute_script))
        .route("/api/executions", get(execution::list_executions))
        .route("/api/executions/{id}", get(execution::get_execution))
        .with_state(state);

    add_cors(api_routes)
}
