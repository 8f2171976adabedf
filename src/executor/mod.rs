mod arbiter;
mod binder;
mod events;
mod launcher;
mod multiplexer;
mod pipeline;

pub use arbiter::NO_OUTPUT_SENTINEL;
pub use binder::{ScriptDialect, compose_script, is_parameter_name};
pub use events::{ExecutionEvent, strip_ansi};
pub use launcher::Interpreter;
pub use pipeline::ExecutionPipeline;
