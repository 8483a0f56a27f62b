//! Container-orchestrator API client (Kubernetes-style REST surface).

use super::{AdapterError, AdapterResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[async_trait]
pub trait OrchestratorBackend: Send + Sync {
    async fn pods(&self, namespace: &str, service: &str) -> AdapterResult<Vec<PodInfo>>;

    async fn deployments(
        &self,
        namespace: &str,
        service: &str,
    ) -> AdapterResult<Vec<DeploymentInfo>>;

    /// Warning events touching the service since `since`.
    async fn events(
        &self,
        namespace: &str,
        service: &str,
        since: DateTime<Utc>,
    ) -> AdapterResult<Vec<OrchestratorEvent>>;

    async fn detect_pod_issues(
        &self,
        namespace: &str,
        service: &str,
    ) -> AdapterResult<Vec<PodIssue>>;

    async fn health(&self) -> AdapterResult<()>;
}

#[derive(Debug, Clone)]
pub struct PodInfo {
    pub name: String,
    /// Effective status: a waiting reason such as `CrashLoopBackOff` when one
    /// exists, otherwise the pod phase.
    pub status: String,
    pub restarts: i64,
    pub ready: bool,
}

impl PodInfo {
    pub fn is_running(&self) -> bool {
        self.status == "Running"
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentInfo {
    pub name: String,
    pub desired_replicas: i64,
    pub ready_replicas: i64,
}

#[derive(Debug, Clone)]
pub struct OrchestratorEvent {
    pub reason: String,
    pub message: String,
    pub event_type: String,
    pub object: String,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct PodIssue {
    pub pod: String,
    pub issue: String,
}

// Minimal wire shapes for the orchestrator list endpoints.

#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PodObject {
    metadata: ObjectMeta,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
    #[serde(rename = "containerStatuses", default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    #[serde(rename = "restartCount", default)]
    restart_count: i64,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: ContainerState,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerState {
    #[serde(default)]
    waiting: Option<WaitingState>,
}

#[derive(Debug, Deserialize)]
struct WaitingState {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeploymentObject {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: DeploymentSpec,
    #[serde(default)]
    status: DeploymentStatus,
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentSpec {
    #[serde(default)]
    replicas: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentStatus {
    #[serde(rename = "readyReplicas", default)]
    ready_replicas: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EventObject {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(rename = "involvedObject", default)]
    involved_object: ObjectMeta,
    #[serde(rename = "lastTimestamp", default)]
    last_timestamp: Option<String>,
}

fn pod_from_object(pod: PodObject) -> PodInfo {
    let waiting_reason = pod
        .status
        .container_statuses
        .iter()
        .find_map(|c| c.state.waiting.as_ref().and_then(|w| w.reason.clone()));

    let status = waiting_reason
        .or(pod.status.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    let restarts = pod
        .status
        .container_statuses
        .iter()
        .map(|c| c.restart_count)
        .sum();

    let ready = !pod.status.container_statuses.is_empty()
        && pod.status.container_statuses.iter().all(|c| c.ready);

    PodInfo {
        name: pod.metadata.name,
        status,
        restarts,
        ready,
    }
}

pub struct KubeOrchestratorClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl KubeOrchestratorClient {
    pub fn new(base_url: &str, token: Option<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> AdapterResult<T> {
        let mut request = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(params);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(AdapterError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(AdapterError::QueryFailed(format!(
                "orchestrator returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AdapterError::QueryFailed(e.to_string()))
    }
}

#[async_trait]
impl OrchestratorBackend for KubeOrchestratorClient {
    async fn pods(&self, namespace: &str, service: &str) -> AdapterResult<Vec<PodInfo>> {
        let list: ObjectList<PodObject> = self
            .get_json(
                &format!("/api/v1/namespaces/{namespace}/pods"),
                &[("labelSelector", format!("app={service}"))],
            )
            .await?;
        Ok(list.items.into_iter().map(pod_from_object).collect())
    }

    async fn deployments(
        &self,
        namespace: &str,
        service: &str,
    ) -> AdapterResult<Vec<DeploymentInfo>> {
        let list: ObjectList<DeploymentObject> = self
            .get_json(
                &format!("/apis/apps/v1/namespaces/{namespace}/deployments"),
                &[("labelSelector", format!("app={service}"))],
            )
            .await?;
        Ok(list
            .items
            .into_iter()
            .map(|d| DeploymentInfo {
                name: d.metadata.name,
                desired_replicas: d.spec.replicas.unwrap_or(1),
                ready_replicas: d.status.ready_replicas.unwrap_or(0),
            })
            .collect())
    }

    async fn events(
        &self,
        namespace: &str,
        service: &str,
        since: DateTime<Utc>,
    ) -> AdapterResult<Vec<OrchestratorEvent>> {
        let list: ObjectList<EventObject> = self
            .get_json(
                &format!("/api/v1/namespaces/{namespace}/events"),
                &[("fieldSelector", "type=Warning".to_string())],
            )
            .await?;

        Ok(list
            .items
            .into_iter()
            .filter(|e| e.involved_object.name.contains(service))
            .map(|e| OrchestratorEvent {
                reason: e.reason.unwrap_or_default(),
                message: e.message.unwrap_or_default(),
                event_type: e.event_type.unwrap_or_default(),
                object: e.involved_object.name,
                last_seen: e
                    .last_timestamp
                    .as_deref()
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc)),
            })
            .filter(|e| e.last_seen.map(|t| t >= since).unwrap_or(true))
            .collect())
    }

    async fn detect_pod_issues(
        &self,
        namespace: &str,
        service: &str,
    ) -> AdapterResult<Vec<PodIssue>> {
        let pods = self.pods(namespace, service).await?;
        let mut issues = Vec::new();
        for pod in &pods {
            if !pod.is_running() {
                issues.push(PodIssue {
                    pod: pod.name.clone(),
                    issue: format!("pod is {}", pod.status),
                });
            }
            if pod.restarts > 5 {
                issues.push(PodIssue {
                    pod: pod.name.clone(),
                    issue: format!("{} restarts", pod.restarts),
                });
            }
        }
        Ok(issues)
    }

    async fn health(&self) -> AdapterResult<()> {
        let mut request = self.http.get(format!("{}/healthz", self.base_url));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(AdapterError::from_reqwest)?;

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
