//! HTTP client for the collector endpoints.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Device, MetricsRecord, TopologyReport};
use crate::reporter::{ApiError, CollectorApi};

const STATUS_ONLINE: &str = "online";

/// Who this collector is, as announced to the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorIdentity {
    pub id: String,
    pub name: String,
    pub version: String,
}

impl CollectorIdentity {
    /// Identity carrying this crate's version.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Registration<'a> {
    id: &'a str,
    name: &'a str,
    version: &'a str,
    status: &'static str,
    started_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct Heartbeat<'a> {
    id: &'a str,
    status: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsBatch<'a> {
    collector_id: &'a str,
    timestamp: DateTime<Utc>,
    metrics: &'a [MetricsRecord],
}

#[derive(Deserialize)]
struct DevicesEnvelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Vec<Device>,
}

/// [`CollectorApi`] over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpCollectorApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    identity: CollectorIdentity,
    started_at: DateTime<Utc>,
}

impl HttpCollectorApi {
    /// Build a client for `endpoint`. An empty `token` disables bearer auth.
    pub fn new(
        endpoint: &str,
        token: &str,
        timeout: Duration,
        identity: CollectorIdentity,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("netvis-collector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            token: (!token.is_empty()).then(|| token.to_string()),
            identity,
            started_at: Utc::now(),
        })
    }

    pub fn identity(&self) -> &CollectorIdentity {
        &self.identity
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), ApiError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await?;
        check_status(response).await.map(drop)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.as_u16() < 400 {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Failed to read error response body");
        String::new()
    });
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait::async_trait]
impl CollectorApi for HttpCollectorApi {
    async fn register(&self) -> Result<(), ApiError> {
        let body = Registration {
            id: &self.identity.id,
            name: &self.identity.name,
            version: &self.identity.version,
            status: STATUS_ONLINE,
            started_at: self.started_at,
        };
        self.post_json("/collector/register", &body).await?;
        tracing::info!(collector_id = %self.identity.id, "Collector registered");
        Ok(())
    }

    async fn heartbeat(&self) -> Result<(), ApiError> {
        let body = Heartbeat {
            id: &self.identity.id,
            status: STATUS_ONLINE,
            timestamp: Utc::now(),
        };
        self.post_json("/collector/heartbeat", &body).await?;
        tracing::debug!("Heartbeat sent");
        Ok(())
    }

    async fn report_metrics(&self, metrics: &[MetricsRecord]) -> Result<(), ApiError> {
        let body = MetricsBatch {
            collector_id: &self.identity.id,
            timestamp: Utc::now(),
            metrics,
        };
        self.post_json("/collector/metrics", &body).await?;
        tracing::info!(count = metrics.len(), "Metrics reported");
        Ok(())
    }

    async fn report_topology(&self, report: &TopologyReport) -> Result<(), ApiError> {
        self.post_json("/collector/topology", report).await?;
        tracing::debug!(
            device_id = %report.device_id,
            count = report.neighbors.len(),
            "Topology reported"
        );
        Ok(())
    }

    async fn fetch_devices(&self) -> Result<Vec<Device>, ApiError> {
        let response = self
            .request(reqwest::Method::GET, "/collector/devices")
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let envelope: DevicesEnvelope =
            serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))?;
        if envelope.code != 0 {
            return Err(ApiError::Rejected {
                code: envelope.code,
                message: envelope.message,
            });
        }
        Ok(envelope.data)
    }
}
