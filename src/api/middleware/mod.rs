pub mod caller;
pub mod cors;
