//! Pod kill events from the cluster event history

use super::command::Kubectl;
use crate::error::EventParseError;
use crate::models::KilledPodEvent;
use chrono::DateTime;
use serde::Deserialize;
use tracing::debug;

const KILLING_REASON: &str = "Killing";
const POD_KIND: &str = "Pod";

/// `kubectl get events -o json` payload
#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<ClusterEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterEvent {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    involved_object: Option<ObjectReference>,
    #[serde(default)]
    last_timestamp: Option<String>,
    #[serde(default)]
    event_time: Option<String>,
    #[serde(default)]
    first_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectReference {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl ClusterEvent {
    fn is_pod_kill(&self) -> bool {
        self.reason.as_deref() == Some(KILLING_REASON)
            && self
                .involved_object
                .as_ref()
                .and_then(|o| o.kind.as_deref())
                == Some(POD_KIND)
    }

    /// Newer clusters leave `lastTimestamp` null and fill `eventTime` instead
    fn timestamp(&self) -> Option<&str> {
        [&self.last_timestamp, &self.event_time, &self.first_timestamp]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|ts| !ts.is_empty())
    }
}

/// Parse an event list into kill events, in emitted order
pub fn parse_kill_events(payload: &str) -> Result<Vec<KilledPodEvent>, EventParseError> {
    let list: EventList = serde_json::from_str(payload)?;

    list.items
        .iter()
        .enumerate()
        .filter(|(_, event)| event.is_pod_kill())
        .map(|(index, event)| -> Result<KilledPodEvent, EventParseError> {
            let pod_name = event
                .involved_object
                .as_ref()
                .and_then(|o| o.name.clone())
                .filter(|name| !name.is_empty())
                .ok_or(EventParseError::MissingName { index })?;

            let raw = event
                .timestamp()
                .ok_or_else(|| EventParseError::MissingTimestamp {
                    pod: pod_name.clone(),
                })?;
            let kill_instant = DateTime::parse_from_rfc3339(raw)
                .map_err(|source| EventParseError::InvalidTimestamp {
                    pod: pod_name.clone(),
                    value: raw.to_string(),
                    source,
                })?
                .timestamp();

            Ok(KilledPodEvent {
                pod_name,
                kill_instant,
            })
        })
        .collect()
}

/// Reads pod kills from the cluster event history
#[derive(Clone)]
pub struct EventStream {
    kubectl: Kubectl,
}

impl EventStream {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }

    /// Kill events currently in the history; empty when the command fails
    pub async fn recent_kills(&self) -> Result<Vec<KilledPodEvent>, EventParseError> {
        match self.kubectl.events_json().await {
            Some(payload) => parse_kill_events(&payload),
            None => {
                debug!("Event history unavailable, no kills this cycle");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::testing::FakeRunner;
    use std::sync::Arc;

    const EVENTS: &str = r#"{
        "apiVersion": "v1",
        "kind": "List",
        "items": [
            {
                "reason": "Scheduled",
                "involvedObject": {"kind": "Pod", "name": "createpod-1"},
                "lastTimestamp": "2023-11-14T22:10:00Z"
            },
            {
                "reason": "Killing",
                "involvedObject": {"kind": "Pod", "name": "createpod-7"},
                "lastTimestamp": "2023-11-14T22:13:20Z"
            },
            {
                "reason": "Killing",
                "involvedObject": {"kind": "Node", "name": "worker-1"},
                "lastTimestamp": "2023-11-14T22:14:00Z"
            },
            {
                "reason": "Killing",
                "involvedObject": {"kind": "Pod", "name": "createpod-2"},
                "lastTimestamp": null,
                "eventTime": "2023-11-14T22:15:00.123456Z"
            }
        ]
    }"#;

    #[test]
    fn test_parse_keeps_pod_kills_in_order() {
        let kills = parse_kill_events(EVENTS).unwrap();
        assert_eq!(
            kills,
            vec![
                KilledPodEvent {
                    pod_name: "createpod-7".to_string(),
                    kill_instant: 1_700_000_000,
                },
                KilledPodEvent {
                    pod_name: "createpod-2".to_string(),
                    kill_instant: 1_700_000_100,
                },
            ]
        );
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_kill_events(r#"{"items": []}"#).unwrap().is_empty());
        assert!(parse_kill_events(r#"{"kind": "List"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(
            parse_kill_events("error: the server doesn't have a resource type"),
            Err(EventParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_kill_without_timestamp_is_error() {
        let payload = r#"{"items": [
            {"reason": "Killing", "involvedObject": {"kind": "Pod", "name": "createpod-1"}}
        ]}"#;
        assert!(matches!(
            parse_kill_events(payload),
            Err(EventParseError::MissingTimestamp { pod }) if pod == "createpod-1"
        ));
    }

    #[test]
    fn test_kill_with_bad_timestamp_is_error() {
        let payload = r#"{"items": [
            {"reason": "Killing", "involvedObject": {"kind": "Pod", "name": "createpod-1"},
             "lastTimestamp": "yesterday"}
        ]}"#;
        assert!(matches!(
            parse_kill_events(payload),
            Err(EventParseError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_kill_without_name_is_error() {
        let payload = r#"{"items": [
            {"reason": "Killing", "involvedObject": {"kind": "Pod"},
             "lastTimestamp": "2023-11-14T22:13:20Z"}
        ]}"#;
        assert!(matches!(
            parse_kill_events(payload),
            Err(EventParseError::MissingName { index: 0 })
        ));
    }

    #[test]
    fn test_non_kill_events_are_not_validated() {
        let payload = r#"{"items": [
            {"reason": "Pulled", "involvedObject": {"kind": "Pod"}},
            {"reason": "Killing", "involvedObject": {"kind": "Pod", "name": "createpod-3"},
             "lastTimestamp": "2023-11-14T22:13:20+00:00"}
        ]}"#;
        let kills = parse_kill_events(payload).unwrap();
        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].pod_name, "createpod-3");
    }

    #[tokio::test]
    async fn test_recent_kills_command_failure_is_empty() {
        let stream = EventStream::new(Kubectl::new(Arc::new(FakeRunner::new())));
        assert!(stream.recent_kills().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_kills_reads_event_list() {
        let runner = Arc::new(FakeRunner::new());
        runner.set("get events -o json", EVENTS);

        let stream = EventStream::new(Kubectl::new(runner));
        let kills = stream.recent_kills().await.unwrap();
        assert_eq!(kills.len(), 2);
        assert_eq!(kills[0].kill_instant, 1_700_000_000);
    }
}
