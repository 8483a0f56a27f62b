use crate::audit::{AuditEvent, AuditRecord};
use crate::error::Result;
use sqlx::PgPool;
use tracing::warn;

/// Writes audit events to the `audit_log` table.
///
/// Audit persistence is deliberately non-fatal for callers on the hot
/// authentication path: a failed insert is logged and swallowed by
/// [`AuditLogger::log`], so an audit-store hiccup cannot lock operators out.
#[derive(Clone)]
pub struct AuditLogger {
    pool: PgPool,
}

impl AuditLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log(&self, event: AuditEvent) {
        if let Err(e) = self.try_log(&event).await {
            warn!(
                action = %event.action,
                error = %e,
                "Failed to persist audit event"
            );
        }
    }

    pub async fn try_log(&self, event: &AuditEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (user_id, username, action, event_type, description, client_ip, success, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.user_id)
        .bind(&event.username)
        .bind(&event.action)
        .bind(event.event_type.as_str())
        .bind(&event.description)
        .bind(&event.client_ip)
        .bind(event.success)
        .bind(&event.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent audit rows, newest first. Read-only; rows are never
    /// updated or deleted through the application.
    pub async fn recent(&self, limit: i64, offset: i64) -> Result<Vec<AuditRecord>> {
        let records = sqlx::query_as::<_, AuditRecord>(
            "SELECT * FROM audit_log ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
