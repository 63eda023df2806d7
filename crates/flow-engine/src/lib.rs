//! The Execution Engine: topological scheduling, per-node lowering to `polars` lazy
//! plans, lazy-handle bookkeeping, and bounded previewing.
//!
//! This crate is the only thing in the workspace that drives both the Flow Graph Model
//! and the Interpreter Bridge at once. It owns no document state of its own beyond the
//! lazy-handle table (`bindings`) — everything else (nodes, edges, caches) lives in
//! `flow_graph::FlowGraph` and is passed in by reference for the duration of a pass.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use polars::prelude::*;

use flow_contracts::{Node, NodeId, NodeResult, NodeSettings, NodeType};
use flow_graph::FlowGraph;
use interpreter_bridge::InterpreterBridge;

mod config;
mod emit;
mod error;
mod output;
mod preview;
mod scripted;
mod source;

pub use config::EngineConfig;
pub use error::EngineError;
pub use output::EmittedOutput;

/// A dataset pushed in from outside the document, consumed by `external-data` nodes
/// (Host API `setInputData`, spec.md §6).
#[derive(Debug, Clone)]
pub struct ExternalInput {
    pub content: Vec<u8>,
    pub format: ExternalInputFormat,
    pub delimiter: Option<char>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalInputFormat {
    Csv,
    Json,
}

/// What a single execution pass targets.
#[derive(Debug, Clone, Copy)]
pub enum ExecutionTarget {
    /// The node and its transitive ancestors.
    Node(NodeId),
    /// Every node in the document.
    WholeGraph,
}

/// The result of a completed (or aborted) execution pass: any `output`/`external-output`
/// payloads produced, in node order. Per-node success/failure/schema/preview is written
/// directly into the `FlowGraph`'s result cache as the pass proceeds, so a caller can
/// read it back (even for an aborted pass, spec.md §7 "already-computed results remain
/// valid") regardless of whether this call returns `Ok` or `Err`.
#[derive(Debug, Default)]
pub struct PassOutcome {
    pub outputs: Vec<EmittedOutput>,
    pub executed: Vec<NodeId>,
}

/// Topological scheduler and per-node `polars` lowering, sharing the document's single
/// Interpreter Bridge for the handful of node types that need user-authored code
/// (`polars_code`, advanced-mode `filter`).
pub struct ExecutionEngine {
    config: EngineConfig,
    bridge: Arc<InterpreterBridge>,
    bindings: HashMap<NodeId, LazyFrame>,
}

impl ExecutionEngine {
    pub fn new(bridge: Arc<InterpreterBridge>) -> Self {
        Self::with_config(bridge, EngineConfig::default())
    }

    pub fn with_config(bridge: Arc<InterpreterBridge>, config: EngineConfig) -> Self {
        Self { config, bridge, bindings: HashMap::new() }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Unbind every known node binding, mirroring `clear()` tearing down `df_*` globals
    /// (spec.md §9 "Global state").
    pub fn clear_bindings(&mut self) {
        self.bindings.clear();
    }

    /// Drop a single node's binding. Called by the Flow Graph Model's `removeNode` via
    /// the host layer so a deleted node's lazy handle doesn't linger.
    pub fn forget(&mut self, id: NodeId) {
        self.bindings.remove(&id);
    }

    /// Run an execution pass over `graph`, per spec.md §4.F "Execution pass".
    ///
    /// Returns `Err` when the *pass itself* cannot proceed (interpreter down, a needed
    /// ancestor unconfigured, a cycle in the selected subset, cancellation observed at a
    /// suspension point). A single node's own execution failure is not reported this
    /// way: it is recorded as `{ success: false, error }` in `graph`'s result cache and
    /// surfaces as `Err(EngineError::ExecFailed)` only after that write, so callers can
    /// always read the failing node's error back out of the graph.
    pub async fn execute(
        &mut self,
        graph: &mut FlowGraph,
        target: ExecutionTarget,
        external_inputs: &HashMap<String, ExternalInput>,
        cancel: &AtomicBool,
    ) -> Result<PassOutcome, EngineError> {
        if !self.bridge.is_ready().await {
            return Err(EngineError::InterpreterUnavailable);
        }

        let subset = self.select_subset(graph, target);
        if subset.len() > self.config.max_nodes_per_pass {
            return Err(EngineError::PassTooLarge { size: subset.len(), max: self.config.max_nodes_per_pass });
        }
        for &id in &subset {
            if !graph.is_setup(id) {
                return Err(EngineError::UpstreamUnconfigured(id));
            }
        }

        let order = graph.topological_order_subset(&subset).map_err(|_| EngineError::CycleDetected)?;

        let mut outcome = PassOutcome::default();
        for id in order {
            if cancel.load(Ordering::SeqCst) {
                return Err(EngineError::Cancelled);
            }

            let node = graph.get_node(id).ok_or(EngineError::UpstreamUnconfigured(id))?.clone();
            match self.execute_one(graph, &node, external_inputs).await {
                Ok(outputs) => {
                    outcome.executed.push(id);
                    outcome.outputs.extend(outputs);
                }
                Err(err) => {
                    let message = err.to_string();
                    graph.set_node_result(id, NodeResult::failure(truncate(&message)));
                    log::warn!(target: "flow_engine", "node {id} failed: {message}");
                    return Err(err);
                }
            }
        }
        Ok(outcome)
    }

    fn select_subset(&self, graph: &FlowGraph, target: ExecutionTarget) -> HashSet<NodeId> {
        match target {
            ExecutionTarget::WholeGraph => graph.get_nodes().into_iter().map(|n| n.id).collect(),
            ExecutionTarget::Node(id) => {
                let mut set = graph.ancestors(id);
                set.insert(id);
                set
            }
        }
    }

    async fn execute_one(
        &mut self,
        graph: &mut FlowGraph,
        node: &Node,
        external_inputs: &HashMap<String, ExternalInput>,
    ) -> Result<Vec<EmittedOutput>, EngineError> {
        let left_id = graph.left_input_id(node.id);
        let right_id = graph.right_input_id(node.id);
        let left = left_id.and_then(|id| self.bindings.get(&id)).cloned();
        let right = right_id.and_then(|id| self.bindings.get(&id)).cloned();

        let file_content = if node.node_type == NodeType::ReadCsv {
            graph.get_file_content(node.id).map_err(flow_contracts::FlowError::from).map_err(engine_from_flow)?
        } else {
            None
        };
        let file_global = self.bind_file_scratch(node, file_content.as_deref()).await?;

        let lowering = emit::lower(
            node,
            left.as_ref(),
            right.as_ref(),
            file_content.as_deref(),
            external_inputs,
            &self.bridge,
            self.config.interpreter_row_sample_cap,
        )
        .await;

        if let Some(name) = &file_global {
            let _ = self.bridge.del_global(name).await;
        }

        let lf = lowering.map_err(|e| attribute_to_node(e, node.id))?;

        let (schema, preview) = preview::materialize(&lf, self.config.preview_row_cap).map_err(|e| EngineError::ExecFailed {
            node_id: node.id,
            traceback: e.to_string(),
        })?;

        let mut outputs = Vec::new();
        if matches!(node.settings, NodeSettings::Output(_) | NodeSettings::ExternalOutput(_)) {
            outputs.push(output::emit(node, &lf)?);
        }

        graph.set_node_result(node.id, NodeResult::ok(schema, Some(preview)));
        self.bindings.insert(node.id, lf);
        Ok(outputs)
    }

    /// Push a node's already-resolved file payload into the interpreter's global
    /// namespace under the reserved `__file_<id>` scratch name just before the node runs
    /// (spec.md §4.F step 4a). Returns the bound name so the caller can unbind it in step
    /// 4e. Only `read_csv` nodes carry a file payload in this taxonomy.
    async fn bind_file_scratch(&self, node: &Node, content: Option<&[u8]>) -> Result<Option<String>, EngineError> {
        let Some(content) = content else {
            return Ok(None);
        };
        let name = format!("__file_{}", node.id);
        let text = String::from_utf8_lossy(content).into_owned();
        self.bridge.set_global(&name, &serde_json::Value::String(text)).await?;
        Ok(Some(name))
    }
}

/// `emit::lower`'s own helpers don't know which node they're lowering for, so they stamp
/// `node_id: 0` on `ExecFailed`. Fill in the real id here, the one place that does know it.
fn attribute_to_node(err: EngineError, node_id: NodeId) -> EngineError {
    match err {
        EngineError::ExecFailed { node_id: 0, traceback } => EngineError::ExecFailed { node_id, traceback },
        other => other,
    }
}

fn engine_from_flow(err: flow_contracts::FlowError) -> EngineError {
    match err {
        flow_contracts::FlowError::StorageFull => EngineError::Storage(flow_store::StoreError::Full("store rejected write".into())),
        flow_contracts::FlowError::StorageUnavailable(msg) => EngineError::Storage(flow_store::StoreError::Unavailable(msg)),
        other => EngineError::ExecFailed { node_id: 0, traceback: other.to_string() },
    }
}

const ERROR_TRUNCATE_BYTES: usize = 8 * 1024;

fn truncate(message: &str) -> String {
    if message.len() <= ERROR_TRUNCATE_BYTES {
        message.to_string()
    } else {
        let mut end = ERROR_TRUNCATE_BYTES;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &message[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_contracts::{Handle, ManualColumn, ManualInputSettings};
    use flow_store::LargeContentStore;
    use interpreter_bridge::HostEnvironment;

    async fn ready_bridge() -> Arc<InterpreterBridge> {
        let bridge = Arc::new(InterpreterBridge::new());
        bridge.initialise(HostEnvironment { cross_origin_isolated: true }).await.unwrap();
        bridge
    }

    fn graph() -> FlowGraph {
        FlowGraph::new(LargeContentStore::open_in_memory().unwrap())
    }

    #[tokio::test(flavor = "current_thread")]
    async fn execute_fails_fast_when_interpreter_is_not_ready() {
        let bridge = Arc::new(InterpreterBridge::new());
        let mut engine = ExecutionEngine::new(bridge);
        let mut g = graph();
        let cancel = AtomicBool::new(false);
        let err = engine.execute(&mut g, ExecutionTarget::WholeGraph, &HashMap::new(), &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::InterpreterUnavailable));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn execute_reports_upstream_unconfigured() {
        let bridge = ready_bridge().await;
        let mut engine = ExecutionEngine::new(bridge);
        let mut g = graph();
        let a = g.add_node(NodeType::ReadCsv, 0.0, 0.0);
        let cancel = AtomicBool::new(false);
        let err = engine.execute(&mut g, ExecutionTarget::Node(a), &HashMap::new(), &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::UpstreamUnconfigured(id) if id == a));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn manual_input_through_preview_round_trips() {
        let bridge = ready_bridge().await;
        let mut engine = ExecutionEngine::new(bridge);
        let mut g = graph();
        let input = g.add_node(NodeType::ManualInput, 0.0, 0.0);
        g.update_node_settings(
            input,
            NodeSettings::ManualInput(ManualInputSettings {
                columns: vec![
                    ManualColumn { name: "id".into(), data_type: flow_contracts::DataType::Int64 },
                    ManualColumn { name: "val".into(), data_type: flow_contracts::DataType::Int64 },
                ],
                rows: vec![
                    vec![serde_json::json!(1), serde_json::json!(10)],
                    vec![serde_json::json!(2), serde_json::json!(20)],
                ],
            }),
        )
        .unwrap();
        let preview_node = g.add_node(NodeType::Preview, 10.0, 0.0);
        g.add_edge(input, Handle::output(0), preview_node, Handle::input(0)).unwrap();

        let cancel = AtomicBool::new(false);
        engine.execute(&mut g, ExecutionTarget::Node(preview_node), &HashMap::new(), &cancel).await.unwrap();

        let result = g.get_node_result(preview_node).unwrap();
        assert!(result.success);
        assert_eq!(result.data.as_ref().unwrap().total_rows, 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn lowering_failure_is_attributed_to_the_failing_node() {
        let bridge = ready_bridge().await;
        let mut engine = ExecutionEngine::new(bridge);
        let mut g = graph();
        let input = g.add_node(NodeType::ManualInput, 0.0, 0.0);
        g.update_node_settings(
            input,
            NodeSettings::ManualInput(ManualInputSettings {
                columns: vec![ManualColumn { name: "id".into(), data_type: flow_contracts::DataType::Int64 }],
                rows: vec![vec![serde_json::json!(1)]],
            }),
        )
        .unwrap();
        let filter_node = g.add_node(NodeType::Filter, 10.0, 0.0);
        g.update_node_settings(filter_node, NodeSettings::Filter(flow_contracts::FilterSettings::default())).unwrap();
        g.add_edge(input, Handle::output(0), filter_node, Handle::input(0)).unwrap();

        let cancel = AtomicBool::new(false);
        let err = engine.execute(&mut g, ExecutionTarget::Node(filter_node), &HashMap::new(), &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::ExecFailed { node_id, .. } if node_id == filter_node));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn oversized_acyclic_pass_is_reported_as_too_large_not_cyclic() {
        let bridge = ready_bridge().await;
        let mut engine = ExecutionEngine::with_config(bridge, EngineConfig::default().with_max_nodes_per_pass(1));
        let mut g = graph();
        let a = g.add_node(NodeType::ManualInput, 0.0, 0.0);
        let b = g.add_node(NodeType::Preview, 10.0, 0.0);
        g.add_edge(a, Handle::output(0), b, Handle::input(0)).unwrap();

        let cancel = AtomicBool::new(false);
        let err = engine.execute(&mut g, ExecutionTarget::WholeGraph, &HashMap::new(), &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::PassTooLarge { size: 2, max: 1 }));
    }
}
