//! The Host Interface's event stream (spec.md §6): `ready`, `execution-started`,
//! `node-executed`, `execution-complete`, `execution-error`, `output`, `flow-changed`,
//! `loading-status`. Modelled directly on `node_engine::events::EventSink` /
//! `WorkflowEvent` — same trait shape, same tagged-enum serialisation, a different set of
//! variants for this engine's own lifecycle.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use flow_contracts::{NodeId, NodeResult};

/// Abstracts over the transport a host wires the event stream through (a channel to a
/// UI thread, an mpsc sender, a test collector).
pub trait EventSink: Send + Sync {
    fn send(&self, event: HostEvent) -> Result<(), EventError>;
}

#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self { message: "channel closed".to_string() }
    }
}

/// Events streamed out of `FlowHost` as a document is edited and executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostEvent {
    /// The interpreter bridge finished initialising and the document is ready to execute.
    Ready,
    /// An execution pass began.
    #[serde(rename_all = "camelCase")]
    ExecutionStarted { target: Option<NodeId> },
    /// A single node finished (successfully or not) during a pass.
    #[serde(rename_all = "camelCase")]
    NodeExecuted { node_id: NodeId, result: NodeResult },
    /// A pass completed; carries every node's current result, not just the ones touched
    /// by this pass.
    #[serde(rename_all = "camelCase")]
    ExecutionComplete { results: HashMap<NodeId, NodeResult> },
    /// A pass failed outright (as opposed to a single node's own recorded failure).
    #[serde(rename_all = "camelCase")]
    ExecutionError { error: String },
    /// A `output`/`external-output` node produced a byte-sequence payload.
    #[serde(rename_all = "camelCase")]
    Output { node_id: NodeId, content: Vec<u8>, file_name: String, mime_type: String, row_count: usize },
    /// The document's nodes, edges, or settings changed.
    FlowChanged,
    /// A free-text progress message for long-running operations (bridge bring-up, large
    /// CSV parses).
    #[serde(rename_all = "camelCase")]
    LoadingStatus { message: String },
}

/// Discards every event. Useful for hosts that poll queries instead of streaming.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: HostEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Collects events in memory, for tests and any host that prefers to drain a buffer.
pub struct VecEventSink {
    events: Mutex<Vec<HostEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self { events: Mutex::new(Vec::new()) }
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: HostEvent) -> Result<(), EventError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_collects_events_in_order() {
        let sink = VecEventSink::new();
        sink.send(HostEvent::Ready).unwrap();
        sink.send(HostEvent::FlowChanged).unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], HostEvent::Ready));
        assert!(matches!(events[1], HostEvent::FlowChanged));
    }

    #[test]
    fn null_sink_drops_everything() {
        let sink = NullEventSink;
        sink.send(HostEvent::Ready).unwrap();
    }
}
