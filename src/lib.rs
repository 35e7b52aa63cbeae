#![forbid(unsafe_code)]

pub mod agent;
pub mod clarifications;
pub mod config;
pub mod errors;
pub mod lock;
pub mod models;
pub mod persistence;
pub mod workflow;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
