//! Build event types for JSON output.
//!
//! These events are emitted one JSON object per line when using
//! `--message-format=json`.
//!
//! # Event Types
//!
//! - `component-started`: A component is about to be built
//! - `component-fresh`: A component was satisfied from the build cache
//! - `component-finished`: A component was built successfully
//! - `component-failed`: A component's build failed
//! - `build-finished`: The whole run completed (success or failure)
//!
//! # Stability
//!
//! New fields may be added, but existing fields should not be removed or renamed.

use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

/// A build event emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    #[serde(rename = "component-started")]
    ComponentStarted {
        /// Component identifier (e.g., "zlib v1.2.11")
        component_id: String,
        /// Position in the build order (1-based)
        index: usize,
        /// Number of components in the build order
        total: usize,
    },

    #[serde(rename = "component-fresh")]
    ComponentFresh {
        component_id: String,
        /// Cache key that was hit
        key: String,
    },

    #[serde(rename = "component-finished")]
    ComponentFinished {
        component_id: String,
        key: String,
        /// Where the component installed its artifacts
        install_dir: PathBuf,
        /// Steps actually run (guarded steps that were skipped excluded)
        steps_run: usize,
        duration_ms: u64,
    },

    #[serde(rename = "component-failed")]
    ComponentFailed {
        component_id: String,
        /// Declared index of the failing step, if a step failed
        #[serde(skip_serializing_if = "Option::is_none")]
        step_index: Option<usize>,
        message: String,
    },

    /// Run completed (success or failure).
    #[serde(rename = "build-finished")]
    BuildFinished {
        success: bool,
        /// Components built in this run
        built: usize,
        /// Components satisfied from the cache
        fresh: usize,
        duration_ms: u64,
    },
}

impl BuildEvent {
    pub fn started(component_id: impl Into<String>, index: usize, total: usize) -> Self {
        BuildEvent::ComponentStarted {
            component_id: component_id.into(),
            index,
            total,
        }
    }

    pub fn fresh(component_id: impl Into<String>, key: impl Into<String>) -> Self {
        BuildEvent::ComponentFresh {
            component_id: component_id.into(),
            key: key.into(),
        }
    }

    pub fn failed(
        component_id: impl Into<String>,
        step_index: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        BuildEvent::ComponentFailed {
            component_id: component_id.into(),
            step_index,
            message: message.into(),
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Receives build events as they happen.
pub trait EventSink {
    fn emit(&self, event: &BuildEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &BuildEvent) {}
}

/// Writes events as JSON lines to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSink;

impl EventSink for JsonSink {
    fn emit(&self, event: &BuildEvent) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{}", event.to_json());
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: RefCell<Vec<BuildEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink::default()
    }

    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.borrow().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &BuildEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_serialization() {
        let json = BuildEvent::started("zlib v1.2.11", 1, 4).to_json();
        assert!(json.contains("\"reason\":\"component-started\""));
        assert!(json.contains("\"component_id\":\"zlib v1.2.11\""));
        assert!(json.contains("\"total\":4"));
    }

    #[test]
    fn test_failed_without_step() {
        let json = BuildEvent::failed("curl v7.79.1", None, "checksum mismatch").to_json();
        assert!(json.contains("\"reason\":\"component-failed\""));
        assert!(!json.contains("step_index"));

        let json = BuildEvent::failed("curl v7.79.1", Some(2), "exit code 1").to_json();
        assert!(json.contains("\"step_index\":2"));
    }

    #[test]
    fn test_finished_serialization() {
        let event = BuildEvent::BuildFinished {
            success: true,
            built: 3,
            fresh: 1,
            duration_ms: 2340,
        };
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"build-finished\""));
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"duration_ms\":2340"));
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.emit(&BuildEvent::fresh("zlib v1.2.11", "abc"));
        assert_eq!(sink.events(), vec![BuildEvent::fresh("zlib v1.2.11", "abc")]);
    }
}
