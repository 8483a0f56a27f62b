use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

pub const INCIDENT_STATUSES: [&str; 4] = ["active", "investigating", "analyzing", "resolved"];
pub const INCIDENT_SEVERITIES: [&str; 4] = ["low", "medium", "high", "critical"];

/// Incident severity, ordered so that comparisons pick the worse of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Incident {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub status: String,
    pub service_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub mttr_seconds: Option<i64>,
    pub mtta_seconds: Option<i64>,
    pub root_cause: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Incident joined with its service name for read endpoints.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct IncidentWithService {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub status: String,
    pub service_id: Option<Uuid>,
    pub service_name: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub mttr_seconds: Option<i64>,
    pub mtta_seconds: Option<i64>,
    pub root_cause: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CorrelationRecord {
    pub id: Uuid,
    pub incident_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub correlation_type: String,
    pub source_type: String,
    pub source_id: String,
    pub confidence_score: f64,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub event_type: String,
    pub source: String,
    pub title: String,
    pub description: String,
    pub severity: Option<String>,
    pub metadata: serde_json::Value,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A timeline entry about to be appended; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewTimelineEvent {
    pub event_type: String,
    pub source: String,
    pub title: String,
    pub description: String,
    pub severity: Option<String>,
    pub metadata: serde_json::Value,
    pub created_by: Option<String>,
}

impl NewTimelineEvent {
    pub fn new(event_type: &str, source: &str, title: impl Into<String>) -> Self {
        Self {
            event_type: event_type.to_string(),
            source: source.to_string(),
            title: title.into(),
            description: String::new(),
            severity: None,
            metadata: serde_json::json!({}),
            created_by: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_severity(mut self, severity: &str) -> Self {
        self.severity = Some(severity.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_created_by(mut self, created_by: &str) -> Self {
        self.created_by = Some(created_by.to_string());
        self
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateIncidentRequest {
    #[validate(length(min = 1, max = 256, message = "title must be 1-256 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    /// Referenced service; auto-created when unknown.
    #[validate(length(min = 1, message = "service is required"))]
    pub service: String,
    /// Orchestrator namespace; falls back to the configured default.
    #[serde(default)]
    pub namespace: Option<String>,
}

fn default_severity() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateIncidentRequest {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub root_cause: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 4096, message = "comment must be 1-4096 characters"))]
    pub comment: String,
}
