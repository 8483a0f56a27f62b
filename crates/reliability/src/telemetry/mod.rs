//! # Telemetry Backend Adapters
//!
//! Thin query clients for the metrics, log, and orchestrator backends. Every
//! adapter is nullable: consumers hold `Option<Arc<dyn …>>` and an absent
//! adapter (`None`) is a first-class state, distinct from a backend that is
//! configured but failing. Adapters report the difference through
//! [`AdapterError`]: `Unavailable` for connect-level failures, `QueryFailed`
//! when the backend answered but rejected or botched the query.

mod logs;
mod metrics;
mod orchestrator;

pub use logs::{LogBackend, LogEntry, LokiLogsClient};
pub use metrics::{MetricsBackend, PromMetricsClient, PromResult, PromSeries};
pub use orchestrator::{
    DeploymentInfo, KubeOrchestratorClient, OrchestratorBackend, OrchestratorEvent, PodInfo,
    PodIssue,
};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use vigil_core::config::TelemetryConfig;

/// Per-request deadline for backend queries.
const ADAPTER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum AdapterError {
    /// The backend could not be reached at all.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The backend is up but the query failed.
    #[error("query failed: {0}")]
    QueryFailed(String),
}

impl AdapterError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            AdapterError::Unavailable(err.to_string())
        } else {
            AdapterError::QueryFailed(err.to_string())
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Health of one adapter as reported by `GET /health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Up,
    Down,
    Absent,
}

/// The set of (possibly absent) telemetry backends shared by the correlation
/// engine, the SLO evaluator, and the health endpoint.
#[derive(Clone, Default)]
pub struct Telemetry {
    pub metrics: Option<Arc<dyn MetricsBackend>>,
    pub logs: Option<Arc<dyn LogBackend>>,
    pub orchestrator: Option<Arc<dyn OrchestratorBackend>>,
}

impl Telemetry {
    /// Builds clients for each configured base URL; an unset URL leaves that
    /// adapter absent.
    pub fn from_config(config: &TelemetryConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(ADAPTER_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            metrics: config
                .metrics_url
                .as_ref()
                .map(|url| Arc::new(PromMetricsClient::new(url, http.clone())) as _),
            logs: config
                .logs_url
                .as_ref()
                .map(|url| Arc::new(LokiLogsClient::new(url, http.clone())) as _),
            orchestrator: config.orchestrator_url.as_ref().map(|url| {
                Arc::new(KubeOrchestratorClient::new(
                    url,
                    config.orchestrator_token.clone(),
                    http,
                )) as _
            }),
        }
    }

    pub async fn metrics_health(&self) -> AdapterHealth {
        match &self.metrics {
            None => AdapterHealth::Absent,
            Some(backend) => match backend.health().await {
                Ok(()) => AdapterHealth::Up,
                Err(_) => AdapterHealth::Down,
            },
        }
    }

    pub async fn logs_health(&self) -> AdapterHealth {
        match &self.logs {
            None => AdapterHealth::Absent,
            Some(backend) => match backend.health().await {
                Ok(()) => AdapterHealth::Up,
                Err(_) => AdapterHealth::Down,
            },
        }
    }

    pub async fn orchestrator_health(&self) -> AdapterHealth {
        match &self.orchestrator {
            None => AdapterHealth::Absent,
            Some(backend) => match backend.health().await {
                Ok(()) => AdapterHealth::Up,
                Err(_) => AdapterHealth::Down,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_urls_leave_adapters_absent() {
        let telemetry = Telemetry::from_config(&TelemetryConfig {
            metrics_url: None,
            logs_url: Some("http://loki:3100".into()),
            orchestrator_url: None,
            orchestrator_token: None,
            default_namespace: "default".into(),
        });

        assert!(telemetry.metrics.is_none());
        assert!(telemetry.logs.is_some());
        assert!(telemetry.orchestrator.is_none());
    }
}
