//! PromQL-compatible metrics backend client.

use super::{AdapterError, AdapterResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Instant query evaluated at `at`.
    async fn query(&self, query: &str, at: DateTime<Utc>) -> AdapterResult<PromResult>;

    /// Range query with `step_secs` resolution.
    async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step_secs: u64,
    ) -> AdapterResult<PromResult>;

    async fn health(&self) -> AdapterResult<()>;
}

/// The standard PromQL HTTP response body.
#[derive(Debug, Clone, Deserialize)]
pub struct PromResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<PromResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromResult {
    #[serde(rename = "resultType", default)]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<PromSeries>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromSeries {
    #[serde(default)]
    pub metric: HashMap<String, String>,
    /// Instant-query sample: `(unix_seconds, value_as_string)`.
    #[serde(default)]
    pub value: Option<(f64, String)>,
    /// Range-query samples.
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

impl PromResult {
    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    /// The scalar carried by the first series: its instant value, or the last
    /// sample of a range result. Values arrive as strings and are parsed.
    pub fn first_scalar(&self) -> Option<f64> {
        let series = self.result.first()?;
        let raw = match &series.value {
            Some((_, v)) => v,
            None => &series.values.last()?.1,
        };
        raw.parse::<f64>().ok()
    }
}

pub struct PromMetricsClient {
    base_url: String,
    http: reqwest::Client,
}

impl PromMetricsClient {
    pub fn new(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    async fn execute(&self, path: &str, params: &[(&str, String)]) -> AdapterResult<PromResult> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(params)
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(AdapterError::QueryFailed(format!(
                "metrics backend returned {}",
                response.status()
            )));
        }

        let body: PromResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::QueryFailed(e.to_string()))?;

        if body.status != "success" {
            return Err(AdapterError::QueryFailed(
                body.error.unwrap_or_else(|| "query was not successful".into()),
            ));
        }

        Ok(body.data.unwrap_or_default())
    }
}

#[async_trait]
impl MetricsBackend for PromMetricsClient {
    async fn query(&self, query: &str, at: DateTime<Utc>) -> AdapterResult<PromResult> {
        self.execute(
            "/api/v1/query",
            &[
                ("query", query.to_string()),
                ("time", at.timestamp().to_string()),
            ],
        )
        .await
    }

    async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step_secs: u64,
    ) -> AdapterResult<PromResult> {
        self.execute(
            "/api/v1/query_range",
            &[
                ("query", query.to_string()),
                ("start", start.timestamp().to_string()),
                ("end", end.timestamp().to_string()),
                ("step", format!("{step_secs}s")),
            ],
        )
        .await
    }

    async fn health(&self) -> AdapterResult<()> {
        let response = self
            .http
            .get(format!("{}/-/healthy", self.base_url))
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AdapterError::QueryFailed(format!(
                "health probe returned {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_instant_vector_response() {
        let raw = r#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"service": "api"}, "value": [1735862400, "99.5"]}
                ]
            }
        }"#;
        let response: PromResponse = serde_json::from_str(raw).unwrap();
        let data = response.data.unwrap();
        assert_eq!(data.result_type, "vector");
        assert_eq!(data.first_scalar(), Some(99.5));
    }

    #[test]
    fn parses_range_matrix_response() {
        let raw = r#"{
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [
                    {"metric": {}, "values": [[1735862100, "1.0"], [1735862400, "2.5"]]}
                ]
            }
        }"#;
        let response: PromResponse = serde_json::from_str(raw).unwrap();
        // Last sample of the first series wins.
        assert_eq!(response.data.unwrap().first_scalar(), Some(2.5));
    }

    #[test]
    fn empty_result_has_no_scalar() {
        let result = PromResult::default();
        assert!(result.is_empty());
        assert_eq!(result.first_scalar(), None);
    }

    #[test]
    fn non_numeric_value_has_no_scalar() {
        let result = PromResult {
            result_type: "vector".into(),
            result: vec![PromSeries {
                metric: HashMap::new(),
                value: Some((0.0, "NaN-ish-garbage".into())),
                values: vec![],
            }],
        };
        assert_eq!(result.first_scalar(), None);
    }
}
