//! # Audit Trail
//!
//! Write-only security audit log. Every authentication event (attempt,
//! success, failure, refresh, register, lockout) produces a row; the
//! application layer never updates or deletes entries.

mod event;
mod logger;

pub use event::{AuditEvent, AuditEventType, AuditRecord};
pub use logger::AuditLogger;
