//! LogQL-compatible log backend client.
//!
//! The backend encodes stream timestamps as decimal strings of integer
//! nanoseconds since the epoch. They are parsed as such — never as a textual
//! datetime.

use super::{AdapterError, AdapterResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

const ERROR_MATCHER: &str = "(?i)(error|exception|fatal|panic)";

#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Recent error-class log lines for a service.
    async fn error_logs(
        &self,
        service: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> AdapterResult<Vec<LogEntry>>;

    /// Normalized error patterns and how often each occurred.
    async fn detect_patterns(
        &self,
        service: &str,
        since: DateTime<Utc>,
    ) -> AdapterResult<HashMap<String, u64>>;

    /// Best-effort single-line root-cause summary from the log stream.
    async fn find_root_cause(
        &self,
        service: &str,
        since: DateTime<Utc>,
    ) -> AdapterResult<Option<String>>;

    async fn health(&self) -> AdapterResult<()>;
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

/// Parses a decimal nanoseconds-since-epoch string.
pub fn parse_nano_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let nanos: i64 = raw.parse().ok()?;
    DateTime::from_timestamp(nanos.div_euclid(1_000_000_000), nanos.rem_euclid(1_000_000_000) as u32)
}

/// Collapses a log line into a stable pattern key: digit runs become `#` so
/// ids, counters, and latencies do not fragment the counts.
pub fn normalize_pattern(line: &str) -> String {
    let mut pattern = String::with_capacity(line.len().min(120));
    let mut in_digits = false;
    for c in line.chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                pattern.push('#');
                in_digits = true;
            }
        } else {
            in_digits = false;
            pattern.push(c);
        }
        if pattern.len() >= 120 {
            break;
        }
    }
    pattern.trim().to_string()
}

#[derive(Debug, Deserialize)]
struct LokiResponse {
    status: String,
    #[serde(default)]
    data: LokiData,
}

#[derive(Debug, Default, Deserialize)]
struct LokiData {
    #[serde(default)]
    result: Vec<LokiStream>,
}

#[derive(Debug, Deserialize)]
struct LokiStream {
    /// Pairs of `[nanosecond-string, line]`.
    #[serde(default)]
    values: Vec<(String, String)>,
}

pub struct LokiLogsClient {
    base_url: String,
    http: reqwest::Client,
}

impl LokiLogsClient {
    pub fn new(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    async fn query_error_stream(
        &self,
        service: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> AdapterResult<Vec<LogEntry>> {
        let query = format!(r#"{{service="{service}"}} |~ "{ERROR_MATCHER}""#);
        let start_nanos = since.timestamp_nanos_opt().unwrap_or(0);
        let end_nanos = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);

        let response = self
            .http
            .get(format!("{}/loki/api/v1/query_range", self.base_url))
            .query(&[
                ("query", query),
                ("start", start_nanos.to_string()),
                ("end", end_nanos.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(AdapterError::QueryFailed(format!(
                "log backend returned {}",
                response.status()
            )));
        }

        let body: LokiResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::QueryFailed(e.to_string()))?;

        if body.status != "success" {
            return Err(AdapterError::QueryFailed("query was not successful".into()));
        }

        let mut entries = Vec::new();
        for stream in body.data.result {
            for (ts, line) in stream.values {
                let Some(timestamp) = parse_nano_timestamp(&ts) else {
                    return Err(AdapterError::QueryFailed(format!(
                        "unparseable nanosecond timestamp: {ts}"
                    )));
                };
                entries.push(LogEntry { timestamp, line });
            }
        }
        entries.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        Ok(entries)
    }
}

#[async_trait]
impl LogBackend for LokiLogsClient {
    async fn error_logs(
        &self,
        service: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> AdapterResult<Vec<LogEntry>> {
        self.query_error_stream(service, since, limit).await
    }

    async fn detect_patterns(
        &self,
        service: &str,
        since: DateTime<Utc>,
    ) -> AdapterResult<HashMap<String, u64>> {
        let entries = self.query_error_stream(service, since, 1000).await?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in &entries {
            *counts.entry(normalize_pattern(&entry.line)).or_default() += 1;
        }
        Ok(counts)
    }

    async fn find_root_cause(
        &self,
        service: &str,
        since: DateTime<Utc>,
    ) -> AdapterResult<Option<String>> {
        let entries = self.query_error_stream(service, since, 1000).await?;
        if entries.is_empty() {
            return Ok(None);
        }

        // A fatal-class line beats frequency; otherwise the most common
        // pattern stands in as the probable cause.
        for keyword in ["fatal", "panic", "out of memory"] {
            if let Some(entry) = entries
                .iter()
                .find(|e| e.line.to_lowercase().contains(keyword))
            {
                return Ok(Some(entry.line.clone()));
            }
        }

        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in &entries {
            *counts.entry(normalize_pattern(&entry.line)).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .max_by_key(|(_, n)| *n)
            .map(|(pattern, n)| format!("{pattern} ({n} occurrences)")))
    }

    async fn health(&self) -> AdapterResult<()> {
        let response = self
            .http
            .get(format!("{}/ready", self.base_url))
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
    fn parses_unix_nano_strings() {
        // 2025-01-02T20:00:00Z in nanoseconds.
        let parsed = parse_nano_timestamp("1735862400000000000").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-01-02T20:00:00+00:00");
    }

    #[test]
    fn rejects_textual_datetimes() {
        assert!(parse_nano_timestamp("2025-01-02T20:00:00Z").is_none());
        assert!(parse_nano_timestamp("").is_none());
        assert!(parse_nano_timestamp("12.5").is_none());
    }

    #[test]
    fn sub_second_precision_survives() {
        let parsed = parse_nano_timestamp("1735862400123456789").unwrap();
        assert_eq!(parsed.timestamp(), 1_735_862_400);
        assert_eq!(parsed.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn normalization_collapses_digit_runs() {
        assert_eq!(
            normalize_pattern("error: request 8241 failed in 350ms"),
            "error: request # failed in #ms"
        );
        assert_eq!(
            normalize_pattern("connection refused to 10.0.4.17:5432"),
            "connection refused to #.#.#.#:#"
        );
    }

    #[test]
    fn normalization_deduplicates_variants() {
        let a = normalize_pattern("timeout after 30s on shard 4");
        let b = normalize_pattern("timeout after 45s on shard 12");
        assert_eq!(a, b);
    }

    #[test]
    fn loki_stream_shape_parses() {
        let raw = r#"{
            "status": "success",
            "data": {
                "resultType": "streams",
                "result": [
                    {
                        "stream": {"service": "api"},
                        "values": [["1735862400000000000", "error: boom"]]
                    }
                ]
            }
        }"#;
        let body: LokiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(body.data.result.len(), 1);
        assert_eq!(body.data.result[0].values[0].1, "error: boom");
    }
}
