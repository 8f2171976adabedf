pub mod execution;
pub mod role;
pub mod script;

pub use execution::{Execution, ExecutionStatus};
pub use role::{Caller, Role};
pub use script::{Script, ScriptParamType, ScriptParameter};
