//! # SLO Evaluator
//!
//! Periodic background worker. Every tick it loads each enabled SLO,
//! substitutes the rolling window into its query, executes the query against
//! the metrics backend, computes error-budget remaining, classifies health,
//! and persists the result. A failed evaluation logs and leaves the prior
//! values untouched.
//!
//! The worker is supervised by a cancellation token injected from the HTTP
//! surface; on cancellation it finishes its current tick and exits.

use super::model::{Slo, SloCalculation, STATUS_CRITICAL, STATUS_HEALTHY, STATUS_WARNING, WINDOW_TOKEN};
use super::repository::SloRepository;
use crate::telemetry::MetricsBackend;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_core::{Error, Result};

pub struct SloEvaluator {
    repository: SloRepository,
    metrics: Option<Arc<dyn MetricsBackend>>,
    interval: Duration,
}

impl SloEvaluator {
    pub fn new(
        repository: SloRepository,
        metrics: Option<Arc<dyn MetricsBackend>>,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            metrics,
            interval,
        }
    }

    /// Runs until the token is cancelled. Cancellation is observed between
    /// ticks; a tick in progress always completes.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "SLO evaluator started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("SLO evaluator stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.evaluate_all().await;
                }
            }
        }
    }

    /// Evaluates every enabled SLO sequentially. Individual failures are
    /// logged and do not stop the tick.
    pub async fn evaluate_all(&self) {
        let slos = match self.repository.list_enabled().await {
            Ok(slos) => slos,
            Err(e) => {
                warn!(error = %e, "Failed to load SLOs for evaluation");
                return;
            }
        };

        debug!(count = slos.len(), "Evaluating SLOs");
        for slo in slos {
            let id = slo.id;
            let name = slo.name.clone();
            if let Err(e) = self.evaluate_one(&slo).await {
                warn!(slo = %name, slo_id = %id, error = %e, "SLO evaluation failed");
            }
        }
    }

    /// Evaluates a single SLO and persists the outcome.
    pub async fn evaluate_one(&self, slo: &Slo) -> Result<SloCalculation> {
        let metrics = self
            .metrics
            .as_ref()
            .ok_or_else(|| Error::upstream("Metrics backend is not configured"))?;

        let query = substitute_window(&slo.query, slo.window_days);
        let result = metrics
            .query(&query, Utc::now())
            .await
            .map_err(|e| Error::upstream(format!("SLO query failed: {e}")))?;

        let current = result
            .first_scalar()
            .ok_or_else(|| Error::upstream("empty_result: SLO query returned no data"))?;

        let budget = compute_error_budget(slo.target_percentage, current);
        let calculation = SloCalculation {
            current_percentage: current,
            error_budget_remaining: budget,
        };

        let status = classify_budget(budget);
        self.repository
            .record_calculation(slo.id, calculation, status)
            .await?;

        debug!(
            slo = %slo.name,
            current_percentage = current,
            error_budget_remaining = budget,
            status,
            "SLO evaluated"
        );
        Ok(calculation)
    }
}

/// Replaces every `${WINDOW}` occurrence with `"{window_days}d"`.
pub fn substitute_window(query: &str, window_days: i32) -> String {
    query.replace(WINDOW_TOKEN, &format!("{window_days}d"))
}

/// Error-budget remaining as a percentage of the allowed error fraction.
///
/// With `allowed = 100 - target` and `observed = 100 - current`, the budget
/// remaining is `(allowed - observed) / allowed * 100`. A 100% target has no
/// defined budget and yields 0. The value goes negative on overspend and is
/// never clamped — consumers rely on the sign.
pub fn compute_error_budget(target_percentage: f64, current_percentage: f64) -> f64 {
    let allowed = 100.0 - target_percentage;
    if allowed <= 0.0 {
        return 0.0;
    }
    let observed = 100.0 - current_percentage;
    (allowed - observed) / allowed * 100.0
}

pub fn classify_budget(budget_remaining: f64) -> &'static str {
    if budget_remaining < 25.0 {
        STATUS_CRITICAL
    } else if budget_remaining < 50.0 {
        STATUS_WARNING
    } else {
        STATUS_HEALTHY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_substitution_hits_every_occurrence() {
        let query = "sum(rate(good[${WINDOW}])) / sum(rate(total[${WINDOW}])) * 100";
        assert_eq!(
            substitute_window(query, 30),
            "sum(rate(good[30d])) / sum(rate(total[30d])) * 100"
        );
        assert!(!substitute_window(query, 30).contains(WINDOW_TOKEN));
    }

    #[test]
    fn overspent_budget_goes_negative() {
        // Target 99.9 with a measured 99.5: allowed 0.1, observed 0.5.
        let budget = compute_error_budget(99.9, 99.5);
        assert!((budget - (-400.0)).abs() < 1e-9);
        assert_eq!(classify_budget(budget), STATUS_CRITICAL);
    }

    #[test]
    fn at_target_budget_is_exactly_zero() {
        let budget = compute_error_budget(99.9, 99.9);
        assert!(budget.abs() < 1e-9);
        assert_eq!(classify_budget(budget), STATUS_CRITICAL);
    }

    #[test]
    fn untouched_budget_is_full() {
        let budget = compute_error_budget(99.0, 100.0);
        assert!((budget - 100.0).abs() < 1e-9);
        assert_eq!(classify_budget(budget), STATUS_HEALTHY);
    }

    #[test]
    fn hundred_percent_target_has_no_budget() {
        assert_eq!(compute_error_budget(100.0, 99.0), 0.0);
        assert_eq!(compute_error_budget(100.0, 100.0), 0.0);
        assert_eq!(compute_error_budget(100.0, 0.0), 0.0);
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify_budget(24.999), STATUS_CRITICAL);
        assert_eq!(classify_budget(25.0), STATUS_WARNING);
        assert_eq!(classify_budget(49.999), STATUS_WARNING);
        assert_eq!(classify_budget(50.0), STATUS_HEALTHY);
        assert_eq!(classify_budget(-400.0), STATUS_CRITICAL);
    }

    #[test]
    fn half_spent_budget() {
        // Target 99, current 99.5: allowed 1.0, observed 0.5.
        let budget = compute_error_budget(99.0, 99.5);
        assert!((budget - 50.0).abs() < 1e-9);
        assert_eq!(classify_budget(budget), STATUS_HEALTHY);
    }
}
