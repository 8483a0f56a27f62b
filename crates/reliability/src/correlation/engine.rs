//! # Correlation Engine
//!
//! Given an incident, fans out to the telemetry backends concurrently, scores
//! what comes back, derives a primary root cause, and persists the ranked
//! correlations plus timeline entries. Adapter failures degrade to warnings;
//! only a persistence failure propagates to the caller.
//!
//! A process-wide counting semaphore caps concurrent passes at ten to bound
//! CPU and memory under incident storms; the eleventh invocation waits.

use super::context::{
    CauseCandidate, CauseClass, CorrelationRequest, CorrelationType, Finding, IncidentContext,
    SharedState, SourceType,
};
use crate::incident::{NewTimelineEvent, Severity};
use crate::telemetry::Telemetry;
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use uuid::Uuid;
use vigil_core::{Error, Result};

/// Width of the correlation worker pool.
pub const MAX_CONCURRENT_CORRELATIONS: usize = 10;

/// How far before `started_at` the pass looks for logs and events.
const LOOKBACK_MINUTES: i64 = 30;

const CONFIDENCE_POD_NOT_RUNNING: f64 = 0.95;
const CONFIDENCE_POD_RESTARTS: f64 = 0.90;
const CONFIDENCE_WARNING_EVENT: f64 = 0.95;
const CONFIDENCE_DEPLOYMENT_DEGRADED: f64 = 0.85;
const CONFIDENCE_ERROR_RATE: f64 = 0.80;
const CONFIDENCE_LATENCY: f64 = 0.70;
const CONFIDENCE_CPU: f64 = 0.75;
const CONFIDENCE_MEMORY: f64 = 0.70;
const CONFIDENCE_PATTERN_BOOST: f64 = 0.90;
const CONFIDENCE_LOG_PATTERN: f64 = 0.60;

const RESTART_THRESHOLD: i64 = 5;
const ERROR_RATE_THRESHOLD: f64 = 1.0;
const ERROR_RATE_BOOST_THRESHOLD: f64 = 5.0;
const LATENCY_THRESHOLD_MS: f64 = 1000.0;
const CPU_THRESHOLD_PCT: f64 = 80.0;
const MEMORY_THRESHOLD_MB: f64 = 1024.0;
const PATTERN_THRESHOLD: u64 = 5;
const PATTERN_BOOST_THRESHOLD: u64 = 10;
const ERROR_LOG_LIMIT: u32 = 100;

/// Persistence seam for the engine. The production implementation replaces
/// the incident's correlation rows and inserts inside one transaction.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    async fn replace_correlations(&self, incident_id: Uuid, findings: &[Finding]) -> Result<()>;
    async fn append_timeline(&self, incident_id: Uuid, events: &[NewTimelineEvent]) -> Result<()>;
}

#[derive(Clone)]
pub struct CorrelationEngine {
    telemetry: Telemetry,
    store: Arc<dyn CorrelationStore>,
    gate: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl CorrelationEngine {
    pub fn new(
        telemetry: Telemetry,
        store: Arc<dyn CorrelationStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            telemetry,
            store,
            gate: Arc::new(Semaphore::new(MAX_CONCURRENT_CORRELATIONS)),
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    /// Spawns a correlation pass in the background. Returns `false` once
    /// shutdown has begun and new passes are rejected.
    pub fn spawn(&self, request: CorrelationRequest) -> bool {
        if self.shutdown.is_cancelled() {
            warn!(incident_id = %request.incident_id, "Rejecting correlation: shutting down");
            return false;
        }

        let engine = self.clone();
        self.tracker.spawn(async move {
            let incident_id = request.incident_id;
            match engine.correlate(request).await {
                Ok(context) => info!(
                    %incident_id,
                    correlations = context.correlations.len(),
                    severity = context.severity.as_str(),
                    "Correlation pass completed"
                ),
                Err(e) => error!(%incident_id, error = %e, "Correlation pass failed"),
            }
        });
        true
    }

    /// Runs one full pass: fan out, score, rank, persist. Holds a pool
    /// permit for the whole invocation.
    pub async fn correlate(&self, request: CorrelationRequest) -> Result<IncidentContext> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| Error::internal("Correlation pool is closed"))?;

        let context = self.build_context(&request).await;
        self.persist(&context).await?;
        Ok(context)
    }

    /// Queries the backends and assembles the ranked in-memory context
    /// without touching the store.
    pub async fn build_context(&self, request: &CorrelationRequest) -> IncidentContext {
        let state = RwLock::new(SharedState::default());

        tokio::join!(
            self.collect_orchestrator(request, &state),
            self.collect_metrics(request, &state),
            self.collect_logs(request, &state),
            self.synthesize_root_cause(request, &state),
        );

        finalize(request, state.into_inner())
    }

    /// Waits for in-flight background passes, up to `grace`.
    pub async fn drain(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!("Correlation tasks did not drain within the grace period");
        }
    }

    async fn collect_orchestrator(&self, request: &CorrelationRequest, state: &RwLock<SharedState>) {
        let Some(orchestrator) = self.telemetry.orchestrator.clone() else {
            let mut s = state.write().await;
            s.warnings.push("orchestrator adapter not available".to_string());
            s.findings.push(Finding {
                correlation_type: CorrelationType::Status,
                source_type: SourceType::Kubernetes,
                source_id: "kubernetes".to_string(),
                confidence_score: 1.0,
                details: serde_json::json!({ "status": "not available" }),
            });
            return;
        };

        let since = request.started_at - ChronoDuration::minutes(LOOKBACK_MINUTES);

        // Pods are scored before events so that pod-level primaries win the
        // first-match ordering.
        match orchestrator.pods(&request.namespace, &request.service).await {
            Ok(pods) => {
                let mut s = state.write().await;
                s.pods_total = pods.len();
                for pod in &pods {
                    if !pod.is_running() {
                        s.pods_not_running += 1;
                        s.findings.push(Finding {
                            correlation_type: CorrelationType::Infrastructure,
                            source_type: SourceType::Kubernetes,
                            source_id: pod.name.clone(),
                            confidence_score: CONFIDENCE_POD_NOT_RUNNING,
                            details: serde_json::json!({
                                "pod": pod.name,
                                "status": pod.status,
                                "restarts": pod.restarts,
                                "summary": format!("pod {} is {}", pod.name, pod.status),
                            }),
                        });
                        s.causes.push(CauseCandidate {
                            text: format!("pod {} is {}", pod.name, pod.status),
                            class: CauseClass::InfrastructurePrimary,
                            pattern_key: None,
                        });
                    } else if pod.restarts > RESTART_THRESHOLD {
                        s.findings.push(Finding {
                            correlation_type: CorrelationType::Infrastructure,
                            source_type: SourceType::Kubernetes,
                            source_id: pod.name.clone(),
                            confidence_score: CONFIDENCE_POD_RESTARTS,
                            details: serde_json::json!({
                                "pod": pod.name,
                                "status": pod.status,
                                "restarts": pod.restarts,
                                "summary": format!("pod {} restarted {} times", pod.name, pod.restarts),
                            }),
                        });
                        s.causes.push(CauseCandidate {
                            text: format!("pod {} restarted {} times", pod.name, pod.restarts),
                            class: CauseClass::InfrastructurePrimary,
                            pattern_key: None,
                        });
                    }
                }
            }
            Err(e) => {
                state
                    .write()
                    .await
                    .warnings
                    .push(format!("orchestrator pods query failed: {e}"));
            }
        }

        match orchestrator
            .events(&request.namespace, &request.service, since)
            .await
        {
            Ok(events) => {
                let mut s = state.write().await;
                for event in &events {
                    let reason = event.reason.to_lowercase();
                    if reason.contains("oom") || reason.contains("backoff") {
                        s.findings.push(Finding {
                            correlation_type: CorrelationType::Infrastructure,
                            source_type: SourceType::Kubernetes,
                            source_id: event.object.clone(),
                            confidence_score: CONFIDENCE_WARNING_EVENT,
                            details: serde_json::json!({
                                "reason": event.reason,
                                "message": event.message,
                                "object": event.object,
                                "summary": format!("{} on {}: {}", event.reason, event.object, event.message),
                            }),
                        });
                        s.causes.push(CauseCandidate {
                            text: format!("{} on {}: {}", event.reason, event.object, event.message),
                            class: CauseClass::InfrastructurePrimary,
                            pattern_key: None,
                        });
                    }
                }
            }
            Err(e) => {
                state
                    .write()
                    .await
                    .warnings
                    .push(format!("orchestrator events query failed: {e}"));
            }
        }

        match orchestrator
            .deployments(&request.namespace, &request.service)
            .await
        {
            Ok(deployments) => {
                let mut s = state.write().await;
                for deployment in &deployments {
                    if deployment.ready_replicas < deployment.desired_replicas {
                        s.findings.push(Finding {
                            correlation_type: CorrelationType::Infrastructure,
                            source_type: SourceType::Kubernetes,
                            source_id: deployment.name.clone(),
                            confidence_score: CONFIDENCE_DEPLOYMENT_DEGRADED,
                            details: serde_json::json!({
                                "deployment": deployment.name,
                                "desired_replicas": deployment.desired_replicas,
                                "ready_replicas": deployment.ready_replicas,
                                "summary": format!(
                                    "deployment {} has {}/{} replicas ready",
                                    deployment.name, deployment.ready_replicas, deployment.desired_replicas
                                ),
                            }),
                        });
                        s.causes.push(CauseCandidate {
                            text: format!(
                                "deployment {} has {}/{} replicas ready",
                                deployment.name, deployment.ready_replicas, deployment.desired_replicas
                            ),
                            class: CauseClass::Plain,
                            pattern_key: None,
                        });
                    }
                }
            }
            Err(e) => {
                state
                    .write()
                    .await
                    .warnings
                    .push(format!("orchestrator deployments query failed: {e}"));
            }
        }
    }

    async fn collect_metrics(&self, request: &CorrelationRequest, state: &RwLock<SharedState>) {
        let Some(metrics) = self.telemetry.metrics.clone() else {
            state
                .write()
                .await
                .warnings
                .push("metrics adapter not available".to_string());
            return;
        };

        let now = chrono::Utc::now();
        let service = &request.service;

        let checks: [(&str, String, f64, f64); 4] = [
            (
                "error_rate",
                format!(
                    r#"100 * sum(rate(http_requests_total{{service="{service}",status=~"5.."}}[5m])) / sum(rate(http_requests_total{{service="{service}"}}[5m]))"#
                ),
                ERROR_RATE_THRESHOLD,
                CONFIDENCE_ERROR_RATE,
            ),
            (
                "p95_latency_ms",
                format!(
                    r#"1000 * histogram_quantile(0.95, sum(rate(http_request_duration_seconds_bucket{{service="{service}"}}[5m])) by (le))"#
                ),
                LATENCY_THRESHOLD_MS,
                CONFIDENCE_LATENCY,
            ),
            (
                "cpu_usage_pct",
                format!(
                    r#"100 * max(rate(container_cpu_usage_seconds_total{{pod=~"{service}.*"}}[5m]))"#
                ),
                CPU_THRESHOLD_PCT,
                CONFIDENCE_CPU,
            ),
            (
                "memory_usage_mb",
                format!(
                    r#"max(container_memory_working_set_bytes{{pod=~"{service}.*"}}) / 1024 / 1024"#
                ),
                MEMORY_THRESHOLD_MB,
                CONFIDENCE_MEMORY,
            ),
        ];

        for (key, query, threshold, confidence) in checks {
            let value = match metrics.query(&query, now).await {
                Ok(result) => result.first_scalar(),
                Err(e) => {
                    state
                        .write()
                        .await
                        .warnings
                        .push(format!("metrics query {key} failed: {e}"));
                    continue;
                }
            };
            let Some(value) = value else { continue };

            let mut s = state.write().await;
            if key == "error_rate" {
                s.error_rate = Some(value);
            }
            if value > threshold {
                let summary = match key {
                    "error_rate" => format!("error rate at {value:.2}%"),
                    "p95_latency_ms" => format!("p95 latency at {value:.0} ms"),
                    "cpu_usage_pct" => format!("CPU usage at {value:.1}%"),
                    _ => format!("memory usage at {value:.0} MB"),
                };
                s.findings.push(Finding {
                    correlation_type: CorrelationType::Metric,
                    source_type: SourceType::Metrics,
                    source_id: key.to_string(),
                    confidence_score: confidence,
                    details: serde_json::json!({
                        "metric": key,
                        "value": value,
                        "threshold": threshold,
                        "summary": summary.clone(),
                    }),
                });
                s.causes.push(CauseCandidate {
                    text: summary,
                    class: CauseClass::Plain,
                    pattern_key: None,
                });
            }
        }
    }

    async fn collect_logs(&self, request: &CorrelationRequest, state: &RwLock<SharedState>) {
        let Some(logs) = self.telemetry.logs.clone() else {
            state
                .write()
                .await
                .warnings
                .push("log adapter not available".to_string());
            return;
        };

        let since = request.started_at - ChronoDuration::minutes(LOOKBACK_MINUTES);

        match logs.detect_patterns(&request.service, since).await {
            Ok(patterns) => {
                let mut s = state.write().await;
                for (pattern, count) in &patterns {
                    if *count > PATTERN_THRESHOLD {
                        s.findings.push(Finding {
                            correlation_type: CorrelationType::LogPattern,
                            source_type: SourceType::Logs,
                            source_id: pattern.clone(),
                            confidence_score: CONFIDENCE_LOG_PATTERN,
                            details: serde_json::json!({
                                "pattern": pattern,
                                "count": count,
                                "summary": format!("recurring log pattern ({count}x): {pattern}"),
                            }),
                        });
                        s.causes.push(CauseCandidate {
                            text: format!("recurring log pattern ({count}x): {pattern}"),
                            class: CauseClass::Plain,
                            pattern_key: Some(pattern.clone()),
                        });
                    }
                }
                s.pattern_counts = patterns;
            }
            Err(e) => {
                state
                    .write()
                    .await
                    .warnings
                    .push(format!("log pattern detection failed: {e}"));
            }
        }

        match logs
            .error_logs(&request.service, since, ERROR_LOG_LIMIT)
            .await
        {
            Ok(entries) if !entries.is_empty() => {
                let count = entries.len() as u64;
                let samples: Vec<&str> = entries.iter().take(5).map(|e| e.line.as_str()).collect();
                let mut s = state.write().await;
                s.findings.push(Finding {
                    correlation_type: CorrelationType::LogError,
                    source_type: SourceType::Logs,
                    source_id: "error_logs".to_string(),
                    confidence_score: error_log_confidence(count),
                    details: serde_json::json!({
                        "count": count,
                        "samples": samples,
                        "summary": format!("{count} error log lines observed"),
                    }),
                });
                s.causes.push(CauseCandidate {
                    text: format!("{count} error log lines observed"),
                    class: CauseClass::Plain,
                    pattern_key: None,
                });
            }
            Ok(_) => {}
            Err(e) => {
                state
                    .write()
                    .await
                    .warnings
                    .push(format!("error log query failed: {e}"));
            }
        }
    }

    async fn synthesize_root_cause(&self, request: &CorrelationRequest, state: &RwLock<SharedState>) {
        let Some(logs) = self.telemetry.logs.clone() else {
            return;
        };

        let since = request.started_at - ChronoDuration::minutes(LOOKBACK_MINUTES);
        match logs.find_root_cause(&request.service, since).await {
            Ok(Some(cause)) => {
                state.write().await.causes.push(CauseCandidate {
                    text: format!("log analysis: {cause}"),
                    class: CauseClass::Plain,
                    pattern_key: None,
                });
            }
            Ok(None) => {}
            Err(e) => {
                state
                    .write()
                    .await
                    .warnings
                    .push(format!("root cause synthesis failed: {e}"));
            }
        }
    }

    /// Replace-then-insert inside one transaction, then append timeline
    /// entries. The only failure path that reaches the caller.
    async fn persist(&self, context: &IncidentContext) -> Result<()> {
        self.store
            .replace_correlations(context.incident_id, &context.correlations)
            .await?;

        let events = timeline_events(context);
        if !events.is_empty() {
            self.store
                .append_timeline(context.incident_id, &events)
                .await?;
        }
        Ok(())
    }
}

/// Aggregate confidence for the error-log finding, scaled by volume.
fn error_log_confidence(count: u64) -> f64 {
    (0.3 + count as f64 * 0.01).min(0.7)
}

fn severity_from_pods(not_running: usize, total: usize) -> Severity {
    if total == 0 {
        return Severity::Low;
    }
    let fraction = not_running as f64 / total as f64;
    if fraction > 0.5 {
        Severity::Critical
    } else if fraction > 0.25 {
        Severity::High
    } else if fraction > 0.1 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Post-join pass: applies the log-pattern boost, ranks findings, selects the
/// primary cause, and infers severity.
fn finalize(request: &CorrelationRequest, mut state: SharedState) -> IncidentContext {
    // Boost: a hot error rate combined with a hot pattern upgrades that
    // pattern to primary strength.
    if state.error_rate.unwrap_or(0.0) > ERROR_RATE_BOOST_THRESHOLD {
        for finding in state
            .findings
            .iter_mut()
            .filter(|f| f.correlation_type == CorrelationType::LogPattern)
        {
            let count = finding
                .details
                .get("count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            if count > PATTERN_BOOST_THRESHOLD {
                finding.confidence_score = CONFIDENCE_PATTERN_BOOST;
            }
        }
        for cause in state.causes.iter_mut() {
            if let Some(key) = &cause.pattern_key {
                if state.pattern_counts.get(key).copied().unwrap_or(0) > PATTERN_BOOST_THRESHOLD {
                    cause.class = CauseClass::LogPatternPrimary;
                }
            }
        }
    }

    // Rank: confidence descending; the sort is stable so equal confidences
    // keep insertion order.
    state
        .findings
        .sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(Ordering::Equal)
        });

    // Primary selection: first infrastructure primary wins; a log-pattern
    // primary is the fallback.
    let primary_idx = state
        .causes
        .iter()
        .position(|c| c.class == CauseClass::InfrastructurePrimary)
        .or_else(|| {
            state
                .causes
                .iter()
                .position(|c| c.class == CauseClass::LogPatternPrimary)
        });

    let mut root_causes = Vec::with_capacity(state.causes.len());
    if let Some(idx) = primary_idx {
        root_causes.push(format!("PRIMARY: {}", state.causes[idx].text));
    }
    for (i, cause) in state.causes.iter().enumerate() {
        if Some(i) != primary_idx {
            root_causes.push(cause.text.clone());
        }
    }

    let pod_severity = severity_from_pods(state.pods_not_running, state.pods_total);
    let severity = match primary_idx.map(|i| state.causes[i].class) {
        Some(CauseClass::LogPatternPrimary) => pod_severity.max(Severity::High),
        _ => pod_severity,
    };

    IncidentContext {
        incident_id: request.incident_id,
        service: request.service.clone(),
        namespace: request.namespace.clone(),
        started_at: request.started_at,
        correlations: state.findings,
        root_causes,
        warnings: state.warnings,
        severity,
    }
}

/// Timeline entries derived from the findings. Status annotations are not
/// timeline-worthy; everything else maps onto its event type.
fn timeline_events(context: &IncidentContext) -> Vec<NewTimelineEvent> {
    context
        .correlations
        .iter()
        .filter_map(|finding| {
            let event_type = match finding.correlation_type {
                CorrelationType::Infrastructure => {
                    if finding.details.get("reason").is_some() {
                        "kubernetes_event"
                    } else {
                        "pod_crash"
                    }
                }
                CorrelationType::Metric => "metric_anomaly",
                CorrelationType::LogPattern => "log_spike",
                CorrelationType::LogError => "log_error",
                CorrelationType::Status => return None,
            };
            let title = finding
                .details
                .get("summary")
                .and_then(|v| v.as_str())
                .unwrap_or(finding.source_id.as_str())
                .to_string();
            Some(
                NewTimelineEvent::new(event_type, "correlation", title)
                    .with_severity(context.severity.as_str())
                    .with_metadata(finding.details.clone()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{
        AdapterError, AdapterResult, DeploymentInfo, LogBackend, LogEntry, MetricsBackend,
        OrchestratorBackend, OrchestratorEvent, PodInfo, PodIssue, PromResult, PromSeries,
    };
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn request() -> CorrelationRequest {
        CorrelationRequest {
            incident_id: Uuid::new_v4(),
            service: "api".to_string(),
            namespace: "production".to_string(),
            started_at: Utc::now(),
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        replaced: Mutex<Vec<(Uuid, usize)>>,
        timeline: Mutex<Vec<(Uuid, usize)>>,
    }

    #[async_trait]
    impl CorrelationStore for RecordingStore {
        async fn replace_correlations(
            &self,
            incident_id: Uuid,
            findings: &[Finding],
        ) -> Result<()> {
            self.replaced.lock().unwrap().push((incident_id, findings.len()));
            Ok(())
        }

        async fn append_timeline(
            &self,
            incident_id: Uuid,
            events: &[NewTimelineEvent],
        ) -> Result<()> {
            self.timeline.lock().unwrap().push((incident_id, events.len()));
            Ok(())
        }
    }

    /// Metrics backend answering every query with a fixed scalar.
    struct ScalarMetrics(f64);

    #[async_trait]
    impl MetricsBackend for ScalarMetrics {
        async fn query(&self, _query: &str, _at: DateTime<Utc>) -> AdapterResult<PromResult> {
            Ok(PromResult {
                result_type: "vector".into(),
                result: vec![PromSeries {
                    metric: HashMap::new(),
                    value: Some((0.0, self.0.to_string())),
                    values: vec![],
                }],
            })
        }

        async fn query_range(
            &self,
            _query: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _step_secs: u64,
        ) -> AdapterResult<PromResult> {
            self.query("", Utc::now()).await
        }

        async fn health(&self) -> AdapterResult<()> {
            Ok(())
        }
    }

    /// Metrics backend answering only the error-rate query; everything else
    /// comes back empty.
    struct ErrorRateOnly(f64);

    #[async_trait]
    impl MetricsBackend for ErrorRateOnly {
        async fn query(&self, query: &str, _at: DateTime<Utc>) -> AdapterResult<PromResult> {
            if query.contains("status=~\"5..\"") {
                Ok(PromResult {
                    result_type: "vector".into(),
                    result: vec![PromSeries {
                        metric: HashMap::new(),
                        value: Some((0.0, self.0.to_string())),
                        values: vec![],
                    }],
                })
            } else {
                Ok(PromResult::default())
            }
        }

        async fn query_range(
            &self,
            _query: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _step_secs: u64,
        ) -> AdapterResult<PromResult> {
            Ok(PromResult::default())
        }

        async fn health(&self) -> AdapterResult<()> {
            Ok(())
        }
    }

    struct StaticLogs {
        patterns: HashMap<String, u64>,
        entries: Vec<LogEntry>,
        root_cause: Option<String>,
    }

    #[async_trait]
    impl LogBackend for StaticLogs {
        async fn error_logs(
            &self,
            _service: &str,
            _since: DateTime<Utc>,
            _limit: u32,
        ) -> AdapterResult<Vec<LogEntry>> {
            Ok(self.entries.clone())
        }

        async fn detect_patterns(
            &self,
            _service: &str,
            _since: DateTime<Utc>,
        ) -> AdapterResult<HashMap<String, u64>> {
            Ok(self.patterns.clone())
        }

        async fn find_root_cause(
            &self,
            _service: &str,
            _since: DateTime<Utc>,
        ) -> AdapterResult<Option<String>> {
            Ok(self.root_cause.clone())
        }

        async fn health(&self) -> AdapterResult<()> {
            Ok(())
        }
    }

    struct StaticOrchestrator {
        pods: Vec<PodInfo>,
        deployments: Vec<DeploymentInfo>,
        events: Vec<OrchestratorEvent>,
    }

    #[async_trait]
    impl OrchestratorBackend for StaticOrchestrator {
        async fn pods(&self, _namespace: &str, _service: &str) -> AdapterResult<Vec<PodInfo>> {
            Ok(self.pods.clone())
        }

        async fn deployments(
            &self,
            _namespace: &str,
            _service: &str,
        ) -> AdapterResult<Vec<DeploymentInfo>> {
            Ok(self.deployments.clone())
        }

        async fn events(
            &self,
            _namespace: &str,
            _service: &str,
            _since: DateTime<Utc>,
        ) -> AdapterResult<Vec<OrchestratorEvent>> {
            Ok(self.events.clone())
        }

        async fn detect_pod_issues(
            &self,
            _namespace: &str,
            _service: &str,
        ) -> AdapterResult<Vec<PodIssue>> {
            Ok(vec![])
        }

        async fn health(&self) -> AdapterResult<()> {
            Ok(())
        }
    }

    /// Orchestrator that blocks until notified; used to hold pool permits.
    struct BlockingOrchestrator(Arc<tokio::sync::Notify>);

    #[async_trait]
    impl OrchestratorBackend for BlockingOrchestrator {
        async fn pods(&self, _namespace: &str, _service: &str) -> AdapterResult<Vec<PodInfo>> {
            self.0.notified().await;
            Ok(vec![])
        }

        async fn deployments(
            &self,
            _namespace: &str,
            _service: &str,
        ) -> AdapterResult<Vec<DeploymentInfo>> {
            Ok(vec![])
        }

        async fn events(
            &self,
            _namespace: &str,
            _service: &str,
            _since: DateTime<Utc>,
        ) -> AdapterResult<Vec<OrchestratorEvent>> {
            Ok(vec![])
        }

        async fn detect_pod_issues(
            &self,
            _namespace: &str,
            _service: &str,
        ) -> AdapterResult<Vec<PodIssue>> {
            Ok(vec![])
        }

        async fn health(&self) -> AdapterResult<()> {
            Err(AdapterError::Unavailable("blocked".into()))
        }
    }

    fn engine_with(telemetry: Telemetry) -> (CorrelationEngine, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore::default());
        let engine = CorrelationEngine::new(
            telemetry,
            store.clone(),
            CancellationToken::new(),
        );
        (engine, store)
    }

    #[tokio::test]
    async fn absent_orchestrator_yields_single_status_annotation() {
        let telemetry = Telemetry {
            metrics: Some(Arc::new(ScalarMetrics(0.0))),
            logs: Some(Arc::new(StaticLogs {
                patterns: HashMap::new(),
                entries: vec![],
                root_cause: None,
            })),
            orchestrator: None,
        };
        let (engine, store) = engine_with(telemetry);

        let context = engine.correlate(request()).await.unwrap();

        assert_eq!(context.correlations.len(), 1);
        let finding = &context.correlations[0];
        assert_eq!(finding.correlation_type, CorrelationType::Status);
        assert_eq!(finding.source_type, SourceType::Kubernetes);
        assert_eq!(finding.confidence_score, 1.0);
        assert_eq!(
            finding.details.get("status").and_then(|v| v.as_str()),
            Some("not available")
        );
        assert!(context
            .warnings
            .iter()
            .any(|w| w.contains("orchestrator")));
        // One replace call reached the store; status annotations produce no
        // timeline entries.
        assert_eq!(store.replaced.lock().unwrap().len(), 1);
        assert!(store.timeline.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn crashing_pod_dominates_root_causes() {
        let telemetry = Telemetry {
            metrics: Some(Arc::new(ErrorRateOnly(2.0))),
            logs: None,
            orchestrator: Some(Arc::new(StaticOrchestrator {
                pods: vec![PodInfo {
                    name: "api-6f7d9c-x2x".into(),
                    status: "CrashLoopBackOff".into(),
                    restarts: 9,
                    ready: false,
                }],
                deployments: vec![],
                events: vec![],
            })),
        };
        let (engine, _) = engine_with(telemetry);

        let context = engine.correlate(request()).await.unwrap();

        assert!(context.root_causes[0].starts_with("PRIMARY:"));
        assert!(context.root_causes[0].contains("api-6f7d9c-x2x"));
        assert_eq!(context.severity, Severity::Critical);
        assert!(context.correlations.len() >= 2);

        let infra = context
            .correlations
            .iter()
            .find(|f| f.correlation_type == CorrelationType::Infrastructure)
            .unwrap();
        assert_eq!(infra.confidence_score, 0.95);

        // Ranked: the infrastructure finding outranks the metric one.
        assert_eq!(context.correlations[0].correlation_type, CorrelationType::Infrastructure);
    }

    #[tokio::test]
    async fn hot_error_rate_boosts_hot_pattern_to_primary() {
        let mut patterns = HashMap::new();
        patterns.insert("db timeout on shard #".to_string(), 14u64);
        patterns.insert("slow request #ms".to_string(), 6u64);

        let telemetry = Telemetry {
            metrics: Some(Arc::new(ErrorRateOnly(7.5))),
            logs: Some(Arc::new(StaticLogs {
                patterns,
                entries: vec![],
                root_cause: None,
            })),
            orchestrator: Some(Arc::new(StaticOrchestrator {
                pods: vec![],
                deployments: vec![],
                events: vec![],
            })),
        };
        let (engine, _) = engine_with(telemetry);

        let context = engine.correlate(request()).await.unwrap();

        let boosted = context
            .correlations
            .iter()
            .find(|f| f.source_id == "db timeout on shard #")
            .unwrap();
        assert_eq!(boosted.confidence_score, 0.90);

        let unboosted = context
            .correlations
            .iter()
            .find(|f| f.source_id == "slow request #ms")
            .unwrap();
        assert_eq!(unboosted.confidence_score, 0.60);

        assert!(context.root_causes[0].starts_with("PRIMARY:"));
        assert!(context.root_causes[0].contains("db timeout"));
        // Log-pattern primary defaults severity to high.
        assert_eq!(context.severity, Severity::High);
    }

    #[tokio::test]
    async fn infrastructure_primary_beats_log_pattern_primary() {
        let mut patterns = HashMap::new();
        patterns.insert("connection refused".to_string(), 20u64);

        let telemetry = Telemetry {
            metrics: Some(Arc::new(ErrorRateOnly(9.0))),
            logs: Some(Arc::new(StaticLogs {
                patterns,
                entries: vec![],
                root_cause: None,
            })),
            orchestrator: Some(Arc::new(StaticOrchestrator {
                pods: vec![
                    PodInfo {
                        name: "api-1".into(),
                        status: "Pending".into(),
                        restarts: 0,
                        ready: false,
                    },
                    PodInfo {
                        name: "api-2".into(),
                        status: "Running".into(),
                        restarts: 0,
                        ready: true,
                    },
                ],
                deployments: vec![],
                events: vec![],
            })),
        };
        let (engine, _) = engine_with(telemetry);

        let context = engine.correlate(request()).await.unwrap();

        assert!(context.root_causes[0].starts_with("PRIMARY: pod api-1"));
        // 1 of 2 pods down: fraction 0.5 is not > 0.5, so high.
        assert_eq!(context.severity, Severity::High);
    }

    #[tokio::test]
    async fn warning_events_promote_oom_and_backoff() {
        let telemetry = Telemetry {
            metrics: None,
            logs: None,
            orchestrator: Some(Arc::new(StaticOrchestrator {
                pods: vec![],
                deployments: vec![DeploymentInfo {
                    name: "api".into(),
                    desired_replicas: 3,
                    ready_replicas: 1,
                }],
                events: vec![OrchestratorEvent {
                    reason: "OOMKilling".into(),
                    message: "container exceeded memory limit".into(),
                    event_type: "Warning".into(),
                    object: "api-7b".into(),
                    last_seen: Some(Utc::now()),
                }],
            })),
        };
        let (engine, _) = engine_with(telemetry);

        let context = engine.correlate(request()).await.unwrap();

        let event_finding = context
            .correlations
            .iter()
            .find(|f| f.details.get("reason").is_some())
            .unwrap();
        assert_eq!(event_finding.confidence_score, 0.95);

        let deployment_finding = context
            .correlations
            .iter()
            .find(|f| f.details.get("deployment").is_some())
            .unwrap();
        assert_eq!(deployment_finding.confidence_score, 0.85);

        assert!(context.root_causes[0].starts_with("PRIMARY: OOMKilling"));
    }

    #[tokio::test]
    async fn rerunning_correlation_produces_identical_findings() {
        let telemetry = Telemetry {
            metrics: Some(Arc::new(ErrorRateOnly(2.0))),
            logs: None,
            orchestrator: Some(Arc::new(StaticOrchestrator {
                pods: vec![PodInfo {
                    name: "api-1".into(),
                    status: "CrashLoopBackOff".into(),
                    restarts: 7,
                    ready: false,
                }],
                deployments: vec![],
                events: vec![],
            })),
        };
        let (engine, store) = engine_with(telemetry);

        let req = request();
        let first = engine.correlate(req.clone()).await.unwrap();
        let second = engine.correlate(req).await.unwrap();

        assert_eq!(
            serde_json::to_value(&first.correlations).unwrap(),
            serde_json::to_value(&second.correlations).unwrap()
        );
        assert_eq!(first.root_causes, second.root_causes);
        assert_eq!(store.replaced.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn eleventh_concurrent_pass_waits_for_a_permit() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let telemetry = Telemetry {
            metrics: None,
            logs: None,
            orchestrator: Some(Arc::new(BlockingOrchestrator(gate.clone()))),
        };
        let (engine, store) = engine_with(telemetry);

        let mut handles = Vec::new();
        for _ in 0..MAX_CONCURRENT_CORRELATIONS {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.correlate(request()).await
            }));
        }

        // Let the ten passes reach the blocking adapter call.
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The eleventh cannot start while all permits are held.
        let eleventh = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.correlate(request()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!eleventh.is_finished());
        assert_eq!(store.replaced.lock().unwrap().len(), 0);

        // Release everyone; all eleven complete.
        for _ in 0..=MAX_CONCURRENT_CORRELATIONS {
            gate.notify_one();
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        eleventh.await.unwrap().unwrap();
        assert_eq!(store.replaced.lock().unwrap().len(), 11);
    }

    #[tokio::test]
    async fn spawn_rejects_after_shutdown() {
        let token = CancellationToken::new();
        let engine = CorrelationEngine::new(
            Telemetry::default(),
            Arc::new(RecordingStore::default()),
            token.clone(),
        );

        assert!(engine.spawn(request()));
        token.cancel();
        assert!(!engine.spawn(request()));
        engine.drain(Duration::from_secs(1)).await;
    }

    #[test]
    fn severity_fractions() {
        assert_eq!(severity_from_pods(0, 0), Severity::Low);
        assert_eq!(severity_from_pods(0, 10), Severity::Low);
        assert_eq!(severity_from_pods(1, 10), Severity::Low);
        assert_eq!(severity_from_pods(2, 10), Severity::Medium);
        assert_eq!(severity_from_pods(3, 10), Severity::High);
        assert_eq!(severity_from_pods(6, 10), Severity::Critical);
        assert_eq!(severity_from_pods(1, 1), Severity::Critical);
    }

    #[test]
    fn error_log_confidence_saturates() {
        assert!((error_log_confidence(1) - 0.31).abs() < 1e-9);
        assert!((error_log_confidence(10) - 0.40).abs() < 1e-9);
        assert_eq!(error_log_confidence(100), 0.7);
        assert_eq!(error_log_confidence(100_000), 0.7);
    }
}
