use super::model::{
    CreateIncidentRequest, Incident, IncidentWithService, NewTimelineEvent, TimelineEvent,
    CorrelationRecord, INCIDENT_SEVERITIES, INCIDENT_STATUSES,
};
use crate::correlation::{CorrelationStore, Finding};
use async_trait::async_trait;
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;
use vigil_core::{Error, Result};

/// Default statement deadline.
const QUERY_DEADLINE_SECS: u64 = 30;
/// Tighter deadline for list endpoints.
const LIST_DEADLINE_SECS: u64 = 15;

const INCIDENT_JOIN: &str = r#"
    SELECT i.id, i.title, i.description, i.severity, i.status, i.service_id,
           s.name AS service_name, i.assigned_to, i.started_at, i.acknowledged_at,
           i.resolved_at, i.mttr_seconds, i.mtta_seconds, i.root_cause,
           i.created_at, i.updated_at
    FROM incidents i
    LEFT JOIN services s ON s.id = i.service_id
"#;

#[derive(Clone)]
pub struct IncidentRepository {
    pool: PgPool,
}

impl IncidentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        request: &CreateIncidentRequest,
        service_id: Uuid,
    ) -> Result<Incident> {
        validate_severity(&request.severity)?;

        let incident = deadline(
            QUERY_DEADLINE_SECS,
            sqlx::query_as::<_, Incident>(
                r#"
                INSERT INTO incidents (title, description, severity, service_id)
                VALUES ($1, $2, $3, $4)
                RETURNING *
                "#,
            )
            .bind(request.title.trim())
            .bind(&request.description)
            .bind(&request.severity)
            .bind(service_id)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(incident)
    }

    pub async fn get_with_service(&self, id: Uuid) -> Result<Option<IncidentWithService>> {
        let incident = deadline(
            QUERY_DEADLINE_SECS,
            sqlx::query_as::<_, IncidentWithService>(&format!("{INCIDENT_JOIN} WHERE i.id = $1"))
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(incident)
    }

    pub async fn list(
        &self,
        limit: i64,
        offset: i64,
        status: Option<&str>,
        severity: Option<&str>,
    ) -> Result<Vec<IncidentWithService>> {
        if let Some(status) = status {
            validate_status(status)?;
        }
        if let Some(severity) = severity {
            validate_severity(severity)?;
        }

        let incidents = deadline(
            LIST_DEADLINE_SECS,
            sqlx::query_as::<_, IncidentWithService>(&format!(
                r#"{INCIDENT_JOIN}
                WHERE ($3::text IS NULL OR i.status = $3)
                  AND ($4::text IS NULL OR i.severity = $4)
                ORDER BY i.started_at DESC
                LIMIT $1 OFFSET $2
                "#
            ))
            .bind(limit)
            .bind(offset)
            .bind(status)
            .bind(severity)
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(incidents)
    }

    /// Partial update. The store-level trigger derives `resolved_at`,
    /// `mttr_seconds`, and `mtta_seconds` on the transition into `resolved`;
    /// this query only stamps `acknowledged_at` the first time the incident
    /// leaves `active`.
    pub async fn update(
        &self,
        id: Uuid,
        request: &super::model::UpdateIncidentRequest,
    ) -> Result<Option<Incident>> {
        if let Some(status) = &request.status {
            validate_status(status)?;
        }
        if let Some(severity) = &request.severity {
            validate_severity(severity)?;
        }

        let incident = deadline(
            QUERY_DEADLINE_SECS,
            sqlx::query_as::<_, Incident>(
                r#"
                UPDATE incidents SET
                    status = COALESCE($2, status),
                    severity = COALESCE($3, severity),
                    assigned_to = COALESCE($4, assigned_to),
                    root_cause = COALESCE($5, root_cause),
                    acknowledged_at = CASE
                        WHEN acknowledged_at IS NULL
                             AND $2 IN ('investigating', 'analyzing')
                        THEN NOW()
                        ELSE acknowledged_at
                    END
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(&request.status)
            .bind(&request.severity)
            .bind(request.assigned_to)
            .bind(&request.root_cause)
            .fetch_optional(&self.pool),
        )
        .await?;
        Ok(incident)
    }

    pub async fn timeline(&self, incident_id: Uuid) -> Result<Vec<TimelineEvent>> {
        let events = deadline(
            LIST_DEADLINE_SECS,
            sqlx::query_as::<_, TimelineEvent>(
                r#"
                SELECT * FROM timeline_events
                WHERE incident_id = $1
                ORDER BY created_at DESC, id DESC
                "#,
            )
            .bind(incident_id)
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(events)
    }

    pub async fn add_timeline_event(
        &self,
        incident_id: Uuid,
        event: &NewTimelineEvent,
    ) -> Result<TimelineEvent> {
        let event = deadline(
            QUERY_DEADLINE_SECS,
            sqlx::query_as::<_, TimelineEvent>(
                r#"
                INSERT INTO timeline_events
                    (incident_id, event_type, source, title, description, severity, metadata, created_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(incident_id)
            .bind(&event.event_type)
            .bind(&event.source)
            .bind(&event.title)
            .bind(&event.description)
            .bind(&event.severity)
            .bind(&event.metadata)
            .bind(&event.created_by)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(event)
    }

    /// Ranked correlations: confidence first, recency second.
    pub async fn correlations(&self, incident_id: Uuid) -> Result<Vec<CorrelationRecord>> {
        let correlations = deadline(
            LIST_DEADLINE_SECS,
            sqlx::query_as::<_, CorrelationRecord>(
                r#"
                SELECT * FROM correlations
                WHERE incident_id = $1
                ORDER BY confidence_score DESC, created_at DESC
                "#,
            )
            .bind(incident_id)
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(correlations)
    }
}

#[async_trait]
impl CorrelationStore for IncidentRepository {
    /// Replace-then-insert in one transaction so readers never observe the
    /// empty intermediate state.
    async fn replace_correlations(&self, incident_id: Uuid, findings: &[Finding]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM correlations WHERE incident_id = $1")
            .bind(incident_id)
            .execute(&mut *tx)
            .await?;

        for finding in findings {
            sqlx::query(
                r#"
                INSERT INTO correlations
                    (incident_id, type, source_type, source_id, confidence_score, details)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(incident_id)
            .bind(finding.correlation_type.as_str())
            .bind(finding.source_type.as_str())
            .bind(&finding.source_id)
            .bind(finding.confidence_score)
            .bind(&finding.details)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn append_timeline(&self, incident_id: Uuid, events: &[NewTimelineEvent]) -> Result<()> {
        for event in events {
            self.add_timeline_event(incident_id, event).await?;
        }
        Ok(())
    }
}

fn validate_status(status: &str) -> Result<()> {
    if INCIDENT_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid status: {status}")))
    }
}

fn validate_severity(severity: &str) -> Result<()> {
    if INCIDENT_SEVERITIES.contains(&severity) {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid severity: {severity}")))
    }
}

async fn deadline<T, E>(
    secs: u64,
    future: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    Error: From<E>,
{
    match tokio::time::timeout(Duration::from_secs(secs), future).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::internal("Query deadline exceeded")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_severity_validation() {
        assert!(validate_status("active").is_ok());
        assert!(validate_status("resolved").is_ok());
        assert!(validate_status("closed").is_err());
        assert!(validate_severity("critical").is_ok());
        assert!(validate_severity("catastrophic").is_err());
    }
}
