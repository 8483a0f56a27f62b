use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

pub const STATUS_HEALTHY: &str = "healthy";
pub const STATUS_WARNING: &str = "warning";
pub const STATUS_CRITICAL: &str = "critical";
pub const STATUS_DISABLED: &str = "disabled";

/// The token in an SLO query replaced by the rolling window.
pub const WINDOW_TOKEN: &str = "${WINDOW}";

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Slo {
    pub id: Uuid,
    pub service_id: Uuid,
    pub name: String,
    pub description: String,
    pub target_percentage: f64,
    pub window_days: i32,
    pub sli_type: String,
    pub query: String,
    pub current_percentage: Option<f64>,
    pub error_budget_remaining: Option<f64>,
    pub status: String,
    pub last_calculated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slo {
    pub fn is_enabled(&self) -> bool {
        self.status != STATUS_DISABLED
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSloRequest {
    pub service_id: Uuid,
    #[validate(length(min = 1, max = 128, message = "name must be 1-128 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(exclusive_min = 0.0, max = 100.0, message = "target must be in (0, 100]"))]
    pub target_percentage: f64,
    #[validate(range(min = 1, message = "window_days must be at least 1"))]
    pub window_days: i32,
    #[serde(default = "default_sli_type")]
    pub sli_type: String,
    #[validate(length(min = 1, message = "query is required"))]
    pub query: String,
}

fn default_sli_type() -> String {
    "availability".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSloRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub target_percentage: Option<f64>,
    pub window_days: Option<i32>,
    pub sli_type: Option<String>,
    pub query: Option<String>,
    /// Only `disabled` and `healthy` may be set by hand; the evaluator owns
    /// the other states.
    pub status: Option<String>,
}

/// Outcome of one evaluation, persisted onto the SLO row.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SloCalculation {
    pub current_percentage: f64,
    pub error_budget_remaining: f64,
}
