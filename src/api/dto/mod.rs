pub mod execution;
pub mod script;
