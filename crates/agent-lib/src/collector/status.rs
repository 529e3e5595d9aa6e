//! Pod lifecycle status resolution

use super::command::{Kubectl, PHASE, TERMINATED_REASON, WAITING_REASON};
use crate::models::NodeStatus;

/// Resolves a pod's lifecycle status.
///
/// Priority: termination reason of the primary container, then its waiting
/// reason, then the pod phase. The first non-empty answer wins and later
/// tiers are not queried.
#[derive(Clone)]
pub struct StatusResolver {
    kubectl: Kubectl,
}

impl StatusResolver {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }

    pub async fn resolve(&self, pod: &str) -> NodeStatus {
        if let Some(reason) = self.field(pod, TERMINATED_REASON).await {
            return NodeStatus::Terminated(reason);
        }
        if let Some(reason) = self.field(pod, WAITING_REASON).await {
            return NodeStatus::Waiting(reason);
        }
        if let Some(phase) = self.field(pod, PHASE).await {
            return NodeStatus::Phase(phase);
        }
        NodeStatus::Unknown
    }

    async fn field(&self, pod: &str, jsonpath: &str) -> Option<String> {
        self.kubectl
            .pod_field(pod, jsonpath)
            .await
            .filter(|value| !value.is_empty())
    }
}
