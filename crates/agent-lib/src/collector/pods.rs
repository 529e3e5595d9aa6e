//! Workload pod listing

use super::command::Kubectl;
use tracing::debug;

/// Default workload naming prefix
pub const DEFAULT_POD_PREFIX: &str = "createpod";

/// Lists the pods eligible for collection.
///
/// A pod is eligible when its name is the prefix itself or the prefix
/// followed by `-` (`createpod-7` matches `createpod`, `createpodx-1` does
/// not). Prefixes may contain `-` themselves.
#[derive(Clone)]
pub struct PodLister {
    kubectl: Kubectl,
    prefix: String,
}

impl PodLister {
    pub fn new(kubectl: Kubectl, prefix: impl Into<String>) -> Self {
        Self {
            kubectl,
            prefix: prefix.into(),
        }
    }

    pub fn matches(&self, pod: &str) -> bool {
        pod.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('-'))
    }

    /// Eligible pod names in listing order; empty when the listing fails
    pub async fn list(&self) -> Vec<String> {
        let Some(output) = self.kubectl.pod_names().await else {
            debug!("Pod listing unavailable, treating cycle as empty");
            return Vec::new();
        };

        output
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty() && self.matches(name))
            .map(str::to_string)
            .collect()
    }
}
