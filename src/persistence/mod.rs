//! Persistence layer modules.

pub mod agent_run_repo;
pub mod db;
pub mod lock_repo;
pub mod schema;
pub mod session_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
