pub mod audit;
pub mod config;
pub mod database;
pub mod error;
pub mod security;

pub use audit::{AuditEvent, AuditEventType, AuditLogger};
pub use config::Config;
pub use database::DatabasePool;
pub use error::{Error, ErrorKind, Result};

// Re-export commonly used types from dependencies
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
