//! Host-agnostic application services over the Flow Graph Model, Execution Engine, and
//! Interpreter Bridge: one plain struct behind the command/query API of spec.md §6,
//! mirroring `pantograph-workflow-service`'s framing of host-agnostic workflow
//! application services. No UI binding lives here — wiring this into a concrete host
//! (Tauri command handlers, a WASM/JS boundary, whatever embeds it) is out of scope.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flow_contracts::{Edge, EdgeId, FlowError, Handle, Node, NodeId, NodeResult, NodeSettings, NodeType, Schema};
use flow_engine::{EngineConfig, ExecutionEngine, ExecutionTarget, ExternalInput};
use flow_graph::{FlowGraph, NodePatch};
use flow_serde::{Encoding, FlowDocument};
use flow_store::LargeContentStore;
use interpreter_bridge::{HostEnvironment, InterpreterBridge};

mod error;
mod events;

pub use error::HostError;
pub use events::{EventError, EventSink, HostEvent, NullEventSink, VecEventSink};
pub use flow_engine::EmittedOutput;

/// Where the document's Large-Content Store lives. Reopened fresh on `import_flow` so an
/// imported document never inherits a previous document's large-content entries.
#[derive(Debug, Clone)]
pub enum StoreLocation {
    InMemory,
    Path(PathBuf),
}

impl StoreLocation {
    fn open(&self) -> Result<LargeContentStore, flow_store::StoreError> {
        match self {
            StoreLocation::InMemory => LargeContentStore::open_in_memory(),
            StoreLocation::Path(path) => LargeContentStore::open(path),
        }
    }
}

/// The whole engine, wired together: one Flow Graph Model, one Execution Engine sharing
/// the document's single Interpreter Bridge, and the event sink the host supplied.
/// Mutation commands are synchronous (the Flow Graph Model's own methods are); only
/// bridge bring-up and execution passes are `async`.
pub struct FlowHost {
    graph: FlowGraph,
    engine: ExecutionEngine,
    bridge: Arc<InterpreterBridge>,
    event_sink: Arc<dyn EventSink>,
    store_location: StoreLocation,
    external_inputs: HashMap<String, ExternalInput>,
    cancel: Arc<AtomicBool>,
    executing: AtomicBool,
}

impl FlowHost {
    pub fn new(store_location: StoreLocation, event_sink: Arc<dyn EventSink>) -> Result<Self, HostError> {
        Self::with_config(store_location, event_sink, EngineConfig::default())
    }

    pub fn with_config(store_location: StoreLocation, event_sink: Arc<dyn EventSink>, config: EngineConfig) -> Result<Self, HostError> {
        let store = store_location.open()?;
        let bridge = Arc::new(InterpreterBridge::new());
        Ok(Self {
            graph: FlowGraph::new(store),
            engine: ExecutionEngine::with_config(bridge.clone(), config),
            bridge,
            event_sink,
            store_location,
            external_inputs: HashMap::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            executing: AtomicBool::new(false),
        })
    }

    // ---- lifecycle ----------------------------------------------------------

    /// Command `initialise()`: bring the shared interpreter up. Emits `ready` on success.
    pub async fn initialise(&self, env: HostEnvironment) -> Result<(), HostError> {
        self.bridge.initialise(env).await?;
        self.emit(HostEvent::Ready);
        Ok(())
    }

    pub async fn is_ready(&self) -> bool {
        self.bridge.is_ready().await
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    // ---- node commands --------------------------------------------------------

    pub fn add_node(&mut self, node_type: NodeType, x: f64, y: f64) -> NodeId {
        let id = self.graph.add_node(node_type, x, y);
        self.emit(HostEvent::FlowChanged);
        id
    }

    pub fn remove_node(&mut self, id: NodeId) -> Result<(), HostError> {
        self.graph.remove_node(id)?;
        self.engine.forget(id);
        self.emit(HostEvent::FlowChanged);
        Ok(())
    }

    pub fn update_node(&mut self, id: NodeId, patch: NodePatch) -> Result<(), HostError> {
        self.graph.update_node(id, patch)?;
        self.emit(HostEvent::FlowChanged);
        Ok(())
    }

    pub fn update_node_settings(&mut self, id: NodeId, settings: NodeSettings) -> Result<(), HostError> {
        self.graph.update_node_settings(id, settings)?;
        self.emit(HostEvent::FlowChanged);
        Ok(())
    }

    pub fn add_edge(&mut self, source: NodeId, source_handle: Handle, target: NodeId, target_handle: Handle) -> Result<EdgeId, HostError> {
        let id = self.graph.add_edge(source, source_handle, target, target_handle)?;
        self.emit(HostEvent::FlowChanged);
        Ok(id)
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Result<(), HostError> {
        self.graph.remove_edge(id)?;
        self.emit(HostEvent::FlowChanged);
        Ok(())
    }

    pub fn set_file_content(&mut self, node_id: NodeId, content: Vec<u8>) -> Result<(), HostError> {
        self.graph.set_file_content(node_id, content)?;
        self.emit(HostEvent::FlowChanged);
        Ok(())
    }

    /// Command `setInputData(name, ...)`: push a named external dataset for later
    /// `external-data` nodes to consume.
    pub fn set_input_data(&mut self, name: impl Into<String>, input: ExternalInput) {
        self.external_inputs.insert(name.into(), input);
        self.emit(HostEvent::FlowChanged);
    }

    // ---- execution --------------------------------------------------------------

    /// Command `executeFlow()`. Returns every node's current result on success.
    pub async fn execute_flow(&mut self) -> Result<HashMap<NodeId, NodeResult>, HostError> {
        self.run(ExecutionTarget::WholeGraph).await
    }

    /// Command `executeNode(id)`.
    pub async fn execute_node(&mut self, id: NodeId) -> Result<NodeResult, HostError> {
        self.run(ExecutionTarget::Node(id)).await?;
        self.graph.get_node_result(id).cloned().ok_or(HostError::Flow(FlowError::UnknownNode(id)))
    }

    async fn run(&mut self, target: ExecutionTarget) -> Result<HashMap<NodeId, NodeResult>, HostError> {
        if self.executing.swap(true, Ordering::SeqCst) {
            return Err(HostError::AlreadyExecuting);
        }
        self.cancel.store(false, Ordering::SeqCst);
        let target_id = match target {
            ExecutionTarget::Node(id) => Some(id),
            ExecutionTarget::WholeGraph => None,
        };
        self.emit(HostEvent::ExecutionStarted { target: target_id });

        let outcome = self.engine.execute(&mut self.graph, target, &self.external_inputs, &self.cancel).await;
        self.executing.store(false, Ordering::SeqCst);

        match outcome {
            Ok(outcome) => {
                for &id in &outcome.executed {
                    if let Some(result) = self.graph.get_node_result(id) {
                        self.emit(HostEvent::NodeExecuted { node_id: id, result: result.clone() });
                    }
                }
                for output in &outcome.outputs {
                    self.emit(HostEvent::Output {
                        node_id: output.node_id,
                        content: output.content.clone(),
                        file_name: output.file_name.clone(),
                        mime_type: output.mime_type.clone(),
                        row_count: output.row_count,
                    });
                }
                let results = self.all_results();
                self.emit(HostEvent::ExecutionComplete { results: results.clone() });
                Ok(results)
            }
            Err(err) => {
                self.emit(HostEvent::ExecutionError { error: err.to_string() });
                Err(err.into())
            }
        }
    }

    /// Command `cancel()`: requests the running pass stop at its next suspension point.
    /// Already-computed node results remain valid (spec.md §7).
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    // ---- whole-document commands ------------------------------------------------

    pub fn clear_flow(&mut self) {
        self.graph.clear();
        self.engine.clear_bindings();
        self.external_inputs.clear();
        self.emit(HostEvent::FlowChanged);
    }

    pub fn export_flow(&self, name: impl Into<String>, id: i64) -> FlowDocument {
        flow_serde::export(&self.graph, name, id)
    }

    pub fn encode_flow(&self, document: &FlowDocument, encoding: Encoding) -> Result<String, HostError> {
        Ok(flow_serde::encode(document, encoding)?)
    }

    /// Command `importFlow(document)`: replace the current document with one decoded
    /// from `text`. The replacement graph is built into a freshly opened, cleared store
    /// and only swapped in once import succeeds, so a malformed document never disturbs
    /// the live one (spec.md §7 import error policy).
    pub fn import_flow(&mut self, text: &str, encoding: Encoding) -> Result<bool, HostError> {
        let document = flow_serde::decode(text, encoding)?;
        let store = self.store_location.open()?;
        store.clear()?;
        let graph = flow_serde::import(&document, store)?;
        self.graph = graph;
        self.engine.clear_bindings();
        self.emit(HostEvent::FlowChanged);
        Ok(true)
    }

    // ---- queries -------------------------------------------------------------------

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.graph.get_node(id)
    }

    pub fn get_nodes(&self) -> Vec<&Node> {
        self.graph.get_nodes()
    }

    pub fn get_edges(&self) -> Vec<&Edge> {
        self.graph.get_edges()
    }

    pub fn get_node_result(&self, id: NodeId) -> Option<&NodeResult> {
        self.graph.get_node_result(id)
    }

    pub fn get_node_input_schema(&self, id: NodeId) -> Option<Schema> {
        self.graph.get_node_input_schema(id)
    }

    pub fn get_left_input_schema(&self, id: NodeId) -> Option<Schema> {
        self.graph.get_left_input_schema(id)
    }

    pub fn get_right_input_schema(&self, id: NodeId) -> Option<Schema> {
        self.graph.get_right_input_schema(id)
    }

    fn all_results(&self) -> HashMap<NodeId, NodeResult> {
        self.graph.get_nodes().into_iter().filter_map(|n| self.graph.get_node_result(n.id).map(|r| (n.id, r.clone()))).collect()
    }

    fn emit(&self, event: HostEvent) {
        if let Err(e) = self.event_sink.send(event) {
            log::warn!(target: "flow_host", "event sink dropped an event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_contracts::{DataType, ManualColumn, ManualInputSettings};

    fn sink() -> Arc<VecEventSink> {
        Arc::new(VecEventSink::new())
    }

    async fn ready_host(sink: Arc<VecEventSink>) -> FlowHost {
        let mut host = FlowHost::new(StoreLocation::InMemory, sink).unwrap();
        host.initialise(HostEnvironment { cross_origin_isolated: true }).await.unwrap();
        host
    }

    #[tokio::test(flavor = "current_thread")]
    async fn initialise_emits_ready() {
        let events = sink();
        let _host = ready_host(events.clone()).await;
        assert!(events.events().iter().any(|e| matches!(e, HostEvent::Ready)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn second_execute_flow_call_is_rejected_while_first_is_running() {
        let events = sink();
        let mut host = ready_host(events).await;
        let input = host.add_node(NodeType::ManualInput, 0.0, 0.0);
        host.update_node_settings(
            input,
            NodeSettings::ManualInput(ManualInputSettings {
                columns: vec![ManualColumn { name: "a".into(), data_type: DataType::Int64 }],
                rows: vec![vec![serde_json::json!(1)]],
            }),
        )
        .unwrap();
        assert!(!host.is_executing());
        let result = host.execute_flow().await;
        assert!(result.is_ok());
        assert!(!host.is_executing());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn execute_flow_populates_node_results_and_emits_completion() {
        let events = sink();
        let mut host = ready_host(events.clone()).await;
        let input = host.add_node(NodeType::ManualInput, 0.0, 0.0);
        host.update_node_settings(
            input,
            NodeSettings::ManualInput(ManualInputSettings {
                columns: vec![ManualColumn { name: "a".into(), data_type: DataType::Int64 }],
                rows: vec![vec![serde_json::json!(1)], vec![serde_json::json!(2)]],
            }),
        )
        .unwrap();

        let results = host.execute_flow().await.unwrap();
        assert!(results.get(&input).unwrap().success);
        assert!(events.events().iter().any(|e| matches!(e, HostEvent::ExecutionComplete { .. })));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn export_then_import_round_trips_the_document() {
        let events = sink();
        let mut host = ready_host(events).await;
        let input = host.add_node(NodeType::ManualInput, 0.0, 0.0);
        host.update_node_settings(
            input,
            NodeSettings::ManualInput(ManualInputSettings {
                columns: vec![ManualColumn { name: "a".into(), data_type: DataType::Int64 }],
                rows: vec![],
            }),
        )
        .unwrap();

        let document = host.export_flow("sample", 1);
        let text = host.encode_flow(&document, Encoding::Json).unwrap();
        host.clear_flow();
        assert!(host.get_nodes().is_empty());

        host.import_flow(&text, Encoding::Json).unwrap();
        assert_eq!(host.get_nodes().len(), 1);
    }
}
