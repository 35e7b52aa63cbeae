//! Domain models persisted by the session store and lock manager.

pub mod agent_run;
pub mod lock;
pub mod session;
pub mod step;
