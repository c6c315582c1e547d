//! Event sink system for observability.
//!
//! The engine emits [`BuildEvent`]s at every lifecycle transition; sinks
//! route them to logs, collectors, or nothing at all.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::core::BuildEvent;
use parking_lot::RwLock;
use std::sync::Arc;

// Process-global default sink, used when a context is built without an
// explicit sink.
static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the current global event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the current global event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Gets the current global event sink.
///
/// Returns a `NoOpEventSink` if no sink is set.
#[must_use]
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}
