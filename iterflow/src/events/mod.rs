//! Event sink system for pipeline observability.
//!
//! Pipeline passes report their lifecycle (`pipeline.started`,
//! `pipeline.completed`, `pipeline.failed`) to an [`EventSink`]. A pipeline uses
//! its own sink when one is attached, and the process-global sink otherwise.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the process-global event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the process-global event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Gets the process-global event sink.
///
/// Returns a `NoOpEventSink` if no sink is set.
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}

/// Builds the payload shared by all pass events.
pub(crate) fn pass_payload(run_id: Uuid, extra: serde_json::Value) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "run_id": run_id.to_string(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if let (Some(target), serde_json::Value::Object(extra)) = (payload.as_object_mut(), extra) {
        target.extend(extra);
    }
    payload
}
