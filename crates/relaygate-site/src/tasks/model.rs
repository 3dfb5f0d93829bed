//! Task data model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a site configuration generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSerial(String);

impl ConfigSerial {
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a relay is asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskSpec {
    /// Fetch monitoring data; `payload` is handed to the relay's fetcher as-is.
    Fetch {
        payload: serde_json::Value,
        timeout_secs: u64,
    },
    /// Pull the site configuration identified by `serial`.
    RelayConfig { serial: ConfigSerial },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Done,
    Failed,
}

impl TaskStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub relay_id: String,
    pub spec: TaskSpec,
    pub status: TaskStatus,
    /// Unix timestamp of creation; drives expiry of pending tasks.
    pub created_at: i64,
    /// Unix timestamp of the last status transition.
    pub updated_at: i64,
    /// Outcome reported by the relay (DONE) or failure reason (FAILED).
    pub result: Option<String>,
}

impl Task {
    pub(crate) fn new(relay_id: &str, spec: TaskSpec, now: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            relay_id: relay_id.to_string(),
            spec,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            result: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn spec_serializes_with_type_tag() {
        let spec = TaskSpec::RelayConfig {
            serial: ConfigSerial::new("42"),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, serde_json::json!({"type": "relay_config", "serial": "42"}));

        let fetch: TaskSpec = serde_json::from_value(serde_json::json!({
            "type": "fetch",
            "payload": {"host": "db01"},
            "timeout_secs": 30
        }))
        .unwrap();
        assert!(matches!(fetch, TaskSpec::Fetch { timeout_secs: 30, .. }));
    }

    #[test]
    fn status_wire_names_are_uppercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(TaskStatus::Failed.to_string(), "FAILED");
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(TaskStatus::Done.is_terminal());
    }

    #[test]
    fn new_task_is_pending_with_fresh_id() {
        let spec = TaskSpec::RelayConfig {
            serial: ConfigSerial::new("1"),
        };
        let a = Task::new("r1", spec.clone(), 10);
        let b = Task::new("r1", spec, 10);
        assert_eq!(a.status, TaskStatus::Pending);
        assert_eq!(a.created_at, a.updated_at);
        assert_ne!(a.id, b.id);
    }
}
