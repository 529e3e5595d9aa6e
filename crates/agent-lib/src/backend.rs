//! Metrics backend client
//!
//! Issues single instant queries against a Prometheus-compatible HTTP API.
//! Every failure is folded into an absent [`MetricSample`]; callers never see
//! an error from this boundary.

use crate::error::QueryError;
use crate::models::{MetricKind, MetricSample};
use crate::observability::CollectorMetrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Source of scalar metric samples
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Run one query, anchored at `at` (epoch seconds) when given
    async fn query(&self, expression: &str, at: Option<i64>) -> MetricSample;
}

/// Query templates for the seven sampled metrics.
///
/// `{pod}` is replaced by the pod name when a query is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricQueries {
    pub memory_usage: String,
    pub network_latency: String,
    pub packet_loss: String,
    pub cpu_load: String,
    pub api_latency: String,
    pub request_errors: String,
    pub disk_io: String,
}

impl Default for MetricQueries {
    fn default() -> Self {
        Self {
            memory_usage: r#"avg_over_time(container_memory_usage_bytes{pod="{pod}"}[1m])"#.into(),
            network_latency:
                r#"histogram_quantile(0.99, rate(http_request_duration_seconds_bucket{pod="{pod}"}[1m]))"#
                    .into(),
            packet_loss: r#"increase(node_network_receive_drop_total{pod="{pod}"}[1m])"#.into(),
            cpu_load: r#"rate(container_cpu_usage_seconds_total{pod="{pod}"}[1m])"#.into(),
            api_latency: "increase(prometheus_http_request_duration_seconds_count[1m])".into(),
            request_errors: r#"increase(prometheus_http_requests_total{pod="prometheus-monitoring-kube-prometheus-prometheus-0", code=~"5.."}[1m])"#.into(),
            disk_io: r#"increase(node_disk_io_time_seconds_total{pod="{pod}"}[1m])"#.into(),
        }
    }
}

impl MetricQueries {
    fn template(&self, kind: MetricKind) -> &str {
        match kind {
            MetricKind::MemoryUsage => &self.memory_usage,
            MetricKind::NetworkLatency => &self.network_latency,
            MetricKind::PacketLoss => &self.packet_loss,
            MetricKind::CpuLoad => &self.cpu_load,
            MetricKind::ApiLatency => &self.api_latency,
            MetricKind::RequestErrors => &self.request_errors,
            MetricKind::DiskIo => &self.disk_io,
        }
    }

    /// Render the query for `kind` scoped to `pod`
    pub fn expression(&self, kind: MetricKind, pod: &str) -> String {
        self.template(kind).replace("{pod}", pod)
    }
}

/// Prometheus HTTP API client
pub struct PrometheusClient {
    client: Client,
    query_url: Url,
    metrics: CollectorMetrics,
}

impl PrometheusClient {
    /// Create a client for the backend at `base_url` (e.g. `http://localhost:9090`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base = Url::parse(base_url).context("Invalid metrics backend URL")?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let query_url = base
            .join("api/v1/query")
            .context("Invalid metrics backend URL")?;

        Ok(Self {
            client,
            query_url,
            metrics: CollectorMetrics::new(),
        })
    }

    /// Endpoint queries are sent to
    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    async fn try_query(&self, expression: &str, at: Option<i64>) -> Result<Option<f64>, QueryError> {
        let mut params = vec![("query", expression.to_string())];
        if let Some(at) = at {
            params.push(("time", at.to_string()));
        }

        let response = self
            .client
            .get(self.query_url.clone())
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::Status(status));
        }

        let body: QueryResponse = response.json().await?;
        if body.status != "success" {
            return Err(QueryError::Backend {
                error_type: body.error_type.unwrap_or_else(|| body.status.clone()),
                error: body.error.unwrap_or_default(),
            });
        }

        match body.data {
            Some(data) => data.first_value(),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn query(&self, expression: &str, at: Option<i64>) -> MetricSample {
        match self.try_query(expression, at).await {
            Ok(Some(value)) => MetricSample::present(expression, at, value),
            Ok(None) => {
                self.metrics.inc_absent_samples();
                debug!(query = %expression, at = ?at, "Empty result set");
                MetricSample::absent(expression, at)
            }
            Err(e) => {
                self.metrics.inc_absent_samples();
                debug!(query = %expression, at = ?at, error = %e, "Metric query failed");
                MetricSample::absent(expression, at)
            }
        }
    }
}

/// Instant query response envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<VectorSample>),
    Scalar((f64, String)),
    String((f64, String)),
    Matrix(serde::de::IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    value: (f64, String),
}

impl QueryData {
    fn first_value(self) -> Result<Option<f64>, QueryError> {
        let raw = match self {
            QueryData::Vector(samples) => match samples.into_iter().next() {
                Some(sample) => sample.value.1,
                None => return Ok(None),
            },
            QueryData::Scalar((_, value)) | QueryData::String((_, value)) => value,
            QueryData::Matrix(_) => return Ok(None),
        };

        raw.parse::<f64>()
            .map(Some)
            .map_err(|_| QueryError::InvalidValue(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn vector_body(value: &str) -> String {
        format!(
            r#"{{"status":"success","data":{{"resultType":"vector","result":[{{"metric":{{"pod":"createpod-1"}},"value":[1700000000.5,"{}"]}}]}}}}"#,
            value
        )
    }

    #[test]
    fn test_default_queries_render_pod() {
        let queries = MetricQueries::default();
        assert_eq!(
            queries.expression(MetricKind::MemoryUsage, "createpod-1"),
            r#"avg_over_time(container_memory_usage_bytes{pod="createpod-1"}[1m])"#
        );
        // Not pod-scoped
        assert_eq!(
            queries.expression(MetricKind::ApiLatency, "createpod-1"),
            "increase(prometheus_http_request_duration_seconds_count[1m])"
        );
    }

    #[test]
    fn test_query_url_keeps_base_path() {
        let client =
            PrometheusClient::new("http://prom.local:9090/prometheus", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            client.query_url().as_str(),
            "http://prom.local:9090/prometheus/api/v1/query"
        );

        let client = PrometheusClient::new("http://localhost:9090", Duration::from_secs(1)).unwrap();
        assert_eq!(client.query_url().as_str(), "http://localhost:9090/api/v1/query");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(PrometheusClient::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_query_returns_first_vector_value() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::UrlEncoded("query".into(), "up".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(vector_body("0.42"))
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let sample = client.query("up", None).await;

        mock.assert_async().await;
        assert_eq!(sample.value, Some(0.42));
        assert_eq!(sample.at, None);
        assert_eq!(sample.query, "up");
    }

    #[tokio::test]
    async fn test_query_anchored_at_instant() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "up".into()),
                Matcher::UrlEncoded("time".into(), "1700000000".into()),
            ]))
            .with_status(200)
            .with_body(vector_body("7"))
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let sample = client.query("up", Some(1_700_000_000)).await;

        mock.assert_async().await;
        assert_eq!(sample.value, Some(7.0));
        assert_eq!(sample.at, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_empty_result_is_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#)
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let sample = client.query("up", None).await;

        assert!(sample.is_absent());
    }

    #[tokio::test]
    async fn test_server_error_is_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert!(client.query("up", None).await.is_absent());
    }

    #[tokio::test]
    async fn test_backend_error_status_is_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert!(client.query("up{", None).await.is_absent());
    }

    #[tokio::test]
    async fn test_malformed_body_is_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>not prometheus</html>")
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert!(client.query("up", None).await.is_absent());
    }

    #[tokio::test]
    async fn test_transport_error_is_absent() {
        // Nothing listens on port 1
        let client = PrometheusClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        assert!(client.query("up", None).await.is_absent());
    }

    #[test]
    fn test_scalar_and_matrix_results() {
        let data: QueryData =
            serde_json::from_str(r#"{"resultType":"scalar","result":[1700000000,"2.5"]}"#).unwrap();
        assert_eq!(data.first_value().unwrap(), Some(2.5));

        let data: QueryData =
            serde_json::from_str(r#"{"resultType":"matrix","result":[{"values":[]}]}"#).unwrap();
        assert_eq!(data.first_value().unwrap(), None);
    }

    #[test]
    fn test_non_numeric_value_is_error() {
        let data: QueryData = serde_json::from_str(
            r#"{"resultType":"vector","result":[{"metric":{},"value":[1,"abc"]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            data.first_value(),
            Err(QueryError::InvalidValue(v)) if v == "abc"
        ));
    }
}
