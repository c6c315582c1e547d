//! Tracing integration for pipeline runs.
//!
//! Span attribute builders keep field names consistent across the engine
//! and any embedding application; `init_tracing` wires a subscriber for
//! binaries that do not bring their own.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// Span attributes for a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSpanAttributes {
    /// Pipeline name.
    pub pipeline_name: Option<String>,
    /// Run ID.
    pub run_id: Option<String>,
    /// Source revision being built.
    pub commit: Option<String>,
    /// Who or what started the run.
    pub initiator: Option<String>,
}

impl PipelineSpanAttributes {
    /// Creates new pipeline span attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = Some(name.into());
        self
    }

    /// Sets the run ID.
    #[must_use]
    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    /// Sets the source commit.
    #[must_use]
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Converts to flat span attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();

        if let Some(ref v) = self.pipeline_name {
            attrs.insert("pipeline.name".to_string(), v.clone());
        }
        if let Some(ref v) = self.run_id {
            attrs.insert("pipeline.run_id".to_string(), v.clone());
        }
        if let Some(ref v) = self.commit {
            attrs.insert("pipeline.commit".to_string(), v.clone());
        }
        if let Some(ref v) = self.initiator {
            attrs.insert("pipeline.initiator".to_string(), v.clone());
        }

        attrs
    }
}

/// Span attributes for one stage execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage name.
    pub stage_name: String,
    /// Base environment reference.
    pub base: Option<String>,
    /// Final stage status.
    pub status: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error message if the stage failed.
    pub error: Option<String>,
}

impl StageSpanAttributes {
    /// Creates new stage span attributes.
    #[must_use]
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            ..Default::default()
        }
    }

    /// Sets the base reference.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Sets the stage status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Converts to flat span attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("stage.name".to_string(), self.stage_name.clone());

        if let Some(ref v) = self.base {
            attrs.insert("stage.base".to_string(), v.clone());
        }
        if let Some(ref v) = self.status {
            attrs.insert("stage.status".to_string(), v.clone());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("stage.duration_ms".to_string(), v.to_string());
        }
        if let Some(ref v) = self.error {
            attrs.insert("stage.error".to_string(), v.clone());
        }

        attrs
    }
}

/// Measures elapsed time for span duration attributes.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
}

impl Default for SpanTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpanTimer {
    /// Starts a timer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns the elapsed milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        crate::utils::duration_ms(self.start.elapsed())
    }
}

/// Installs a formatted tracing subscriber.
///
/// Uses `RUST_LOG` when set, the given filter otherwise. Calling twice
/// is harmless; the second call is a no-op.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_attributes() {
        let attrs = PipelineSpanAttributes::new()
            .with_pipeline_name("engine")
            .with_run_id("run-1")
            .with_commit("abc1234")
            .to_attributes();

        assert_eq!(attrs.get("pipeline.name"), Some(&"engine".to_string()));
        assert_eq!(attrs.get("pipeline.run_id"), Some(&"run-1".to_string()));
        assert_eq!(attrs.get("pipeline.commit"), Some(&"abc1234".to_string()));
        assert!(!attrs.contains_key("pipeline.initiator"));
    }

    #[test]
    fn test_stage_attributes() {
        let attrs = StageSpanAttributes::new("builder")
            .with_base("dir://toolchain")
            .with_status("sealed")
            .with_duration_ms(42.5)
            .to_attributes();

        assert_eq!(attrs.get("stage.name"), Some(&"builder".to_string()));
        assert_eq!(attrs.get("stage.status"), Some(&"sealed".to_string()));
        assert_eq!(attrs.get("stage.duration_ms"), Some(&"42.5".to_string()));
    }

    #[test]
    fn test_span_timer_advances() {
        let timer = SpanTimer::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_ms() >= 1.0);
    }

    #[test]
    fn test_init_tracing_idempotent() {
        init_tracing("info");
        init_tracing("debug");
    }
}
