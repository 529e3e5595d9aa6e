//! Agent configuration

use anyhow::{bail, Context, Result};
use podwatch_lib::backend::MetricQueries;
use podwatch_lib::collector::DEFAULT_POD_PREFIX;
use serde::Deserialize;
use std::path::Path;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name from Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for triggers, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base URL of the Prometheus-compatible metrics backend
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// CSV log the collector appends to
    #[serde(default = "default_output_path")]
    pub output_path: String,

    /// Only pods named `<prefix>` or `<prefix>-*` are observed
    #[serde(default = "default_pod_prefix")]
    pub pod_prefix: String,

    /// Namespace passed to kubectl; the context default when unset
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default = "default_kubectl_path")]
    pub kubectl_path: String,

    /// Collection period in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Run one cycle at startup and keep collecting periodically
    #[serde(default = "default_autostart")]
    pub autostart: bool,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Metric query templates; `{pod}` is replaced by the pod name
    #[serde(default)]
    pub queries: MetricQueries,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    3000
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_output_path() -> String {
    "k8s_metrics.csv".to_string()
}

fn default_pod_prefix() -> String {
    DEFAULT_POD_PREFIX.to_string()
}

fn default_kubectl_path() -> String {
    "kubectl".to_string()
}

fn default_collection_interval() -> u64 {
    60
}

fn default_autostart() -> bool {
    true
}

fn default_command_timeout() -> u64 {
    30
}

fn default_query_timeout() -> u64 {
    10
}

impl AgentConfig {
    /// Load configuration from the config file named by `PODWATCH_CONFIG`
    /// (default `podwatch.toml`, optional) and `PODWATCH_*` environment variables
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("PODWATCH_CONFIG").unwrap_or_else(|_| "podwatch.toml".to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("PODWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: AgentConfig = config
            .try_deserialize()
            .context("Invalid agent configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.collection_interval_secs == 0 {
            bail!("collection_interval_secs must be greater than zero");
        }
        if self.command_timeout_secs == 0 || self.query_timeout_secs == 0 {
            bail!("timeouts must be greater than zero");
        }
        if self.pod_prefix.is_empty() {
            bail!("pod_prefix must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.api_port, 3000);
        assert_eq!(config.prometheus_url, "http://localhost:9090");
        assert_eq!(config.output_path, "k8s_metrics.csv");
        assert_eq!(config.pod_prefix, "createpod");
        assert_eq!(config.collection_interval_secs, 60);
        assert!(config.autostart);
        assert!(config.namespace.is_none());
    }

    #[test]
    fn test_file_overrides() {
        let file = toml_file(
            r#"
api_port = 8088
output_path = "/var/lib/podwatch/log.csv"
namespace = "load"
autostart = false

[queries]
cpu_load = 'cpu{pod="{pod}"}'
"#,
        );
        let config = AgentConfig::load_from(file.path()).unwrap();

        assert_eq!(config.api_port, 8088);
        assert_eq!(config.output_path, "/var/lib/podwatch/log.csv");
        assert_eq!(config.namespace.as_deref(), Some("load"));
        assert!(!config.autostart);
        assert_eq!(config.queries.cpu_load, r#"cpu{pod="{pod}"}"#);
        // Unset templates keep their defaults
        assert_eq!(
            config.queries.memory_usage,
            MetricQueries::default().memory_usage
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let file = toml_file("collection_interval_secs = 0\n");
        assert!(AgentConfig::load_from(file.path()).is_err());
    }
}
