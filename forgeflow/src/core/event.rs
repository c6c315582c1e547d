//! Build lifecycle event type.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An event emitted during a pipeline run.
///
/// Events are consumed by event sinks for logging, monitoring, or test
/// assertions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildEvent {
    /// The event type (e.g., "stage.provisioned", "pipeline.failed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl BuildEvent {
    /// Creates a new build event.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: crate::utils::iso_timestamp(),
            data: HashMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Creates a "pipeline.started" event.
    #[must_use]
    pub fn pipeline_started(pipeline: &str) -> Self {
        Self::new("pipeline.started").add_data("pipeline", serde_json::json!(pipeline))
    }

    /// Creates a "stage.provisioned" event.
    #[must_use]
    pub fn stage_provisioned(stage: &str, reference: &str) -> Self {
        Self::new("stage.provisioned")
            .add_data("stage", serde_json::json!(stage))
            .add_data("base", serde_json::json!(reference))
    }

    /// Creates a "stage.copied_in" event.
    #[must_use]
    pub fn stage_copied_in(stage: &str, files: u64) -> Self {
        Self::new("stage.copied_in")
            .add_data("stage", serde_json::json!(stage))
            .add_data("files", serde_json::json!(files))
    }

    /// Creates a "stage.executed" event.
    #[must_use]
    pub fn stage_executed(stage: &str, duration_ms: f64) -> Self {
        Self::new("stage.executed")
            .add_data("stage", serde_json::json!(stage))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates an "artifact.transferred" event.
    #[must_use]
    pub fn artifact_transferred(from: &str, to: &str, path: &str) -> Self {
        Self::new("artifact.transferred")
            .add_data("from", serde_json::json!(from))
            .add_data("to", serde_json::json!(to))
            .add_data("path", serde_json::json!(path))
    }

    /// Creates a "stage.finalized" event.
    #[must_use]
    pub fn stage_finalized(stage: &str) -> Self {
        Self::new("stage.finalized").add_data("stage", serde_json::json!(stage))
    }

    /// Creates a "pipeline.completed" event.
    #[must_use]
    pub fn pipeline_completed(pipeline: &str, duration_ms: f64) -> Self {
        Self::new("pipeline.completed")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "pipeline.failed" event.
    #[must_use]
    pub fn pipeline_failed(pipeline: &str, reason: &str) -> Self {
        Self::new("pipeline.failed")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("reason", serde_json::json!(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = BuildEvent::new("stage.provisioned");
        assert_eq!(event.event_type, "stage.provisioned");
        assert!(event.timestamp.contains('T'));
    }

    #[test]
    fn test_lifecycle_constructors() {
        let event = BuildEvent::stage_provisioned("builder", "dir://rust-toolchain");
        assert_eq!(event.event_type, "stage.provisioned");
        assert_eq!(event.data.get("stage"), Some(&serde_json::json!("builder")));
        assert_eq!(
            event.data.get("base"),
            Some(&serde_json::json!("dir://rust-toolchain"))
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = BuildEvent::artifact_transferred("builder", "assembler", "libengine.so");
        let json = serde_json::to_string(&event).unwrap();
        let back: BuildEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, "artifact.transferred");
        assert_eq!(back.data.get("path"), Some(&serde_json::json!("libengine.so")));
    }
}
