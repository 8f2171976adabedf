mod connection;
mod execution_repository;
mod script_repository;

pub use connection::establish_connection;
#[cfg(test)]
pub use connection::memory_pool;
pub use execution_repository::ExecutionRepository;
pub use script_repository::{NewScript, ScriptRepository};

pub type DbPool = sqlx::SqlitePool;
