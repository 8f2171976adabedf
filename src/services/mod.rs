mod execution_service;
mod script_service;

pub use execution_service::ExecutionService;
pub use script_service::ScriptService;
