use crate::incident::Severity;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Input to a correlation pass.
#[derive(Debug, Clone)]
pub struct CorrelationRequest {
    pub incident_id: Uuid,
    pub service: String,
    pub namespace: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationType {
    Metric,
    LogPattern,
    LogError,
    Infrastructure,
    Status,
}

impl CorrelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationType::Metric => "metric",
            CorrelationType::LogPattern => "log_pattern",
            CorrelationType::LogError => "log_error",
            CorrelationType::Infrastructure => "infrastructure",
            CorrelationType::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Metrics,
    Logs,
    Kubernetes,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Metrics => "metrics",
            SourceType::Logs => "logs",
            SourceType::Kubernetes => "kubernetes",
        }
    }
}

/// One scored piece of evidence; maps onto a `correlations` row.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub correlation_type: CorrelationType,
    pub source_type: SourceType,
    pub source_id: String,
    pub confidence_score: f64,
    pub details: serde_json::Value,
}

/// How a cause candidate participates in root-cause ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CauseClass {
    InfrastructurePrimary,
    LogPatternPrimary,
    Plain,
}

#[derive(Debug, Clone)]
pub(crate) struct CauseCandidate {
    pub text: String,
    pub class: CauseClass,
    /// Set for log-pattern candidates so the post-join boost can promote the
    /// matching one.
    pub pattern_key: Option<String>,
}

/// Mutable aggregate the four producers write into. Producers own disjoint
/// fields conceptually; the whole struct sits behind one `RwLock` because
/// findings and causes may be appended concurrently.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub findings: Vec<Finding>,
    pub causes: Vec<CauseCandidate>,
    pub warnings: Vec<String>,
    pub pods_total: usize,
    pub pods_not_running: usize,
    pub error_rate: Option<f64>,
    pub pattern_counts: HashMap<String, u64>,
}

/// The in-memory result of a correlation pass, returned to the caller after
/// persistence.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentContext {
    pub incident_id: Uuid,
    pub service: String,
    pub namespace: String,
    pub started_at: DateTime<Utc>,
    pub correlations: Vec<Finding>,
    /// Ranked causes; a `PRIMARY:`-prefixed entry, when present, is first.
    pub root_causes: Vec<String>,
    /// Adapter-level degradations observed during the pass.
    pub warnings: Vec<String>,
    pub severity: Severity,
}
