//! The Flow Graph Model: nodes, edges, and the caches derived from them.
//!
//! Owns four logical stores — nodes, edges, per-node results, and large file content —
//! behind a narrow command API. Every derived projection (`input_ids`, `left_input_id`,
//! `right_input_id`, schema) is recomputed from edges and settings alone; none of it is
//! ever written independently.

use std::collections::{HashMap, HashSet};

use flow_contracts::{Edge, EdgeId, FlowError, Handle, HandleKind, Node, NodeId, NodeResult, NodeSettings, NodeType, Schema};
use flow_store::{policy, LargeContentStore, Placement};

mod topo;

/// A position/settings patch applied by `update_node`. Both fields are optional so a
/// caller can move a node without touching its settings or vice versa.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub position: Option<(f64, f64)>,
    pub settings: Option<NodeSettings>,
    pub description: Option<String>,
}

/// In-memory graph plus its derived caches. Not `Sync`-safe to share across threads
/// without external synchronisation — per the concurrency model, the Flow Graph Model's
/// own mutation methods are synchronous and intended to run on one logical task.
pub struct FlowGraph {
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeId, Edge>,
    results: HashMap<NodeId, NodeResult>,
    schema_cache: HashMap<NodeId, Option<Schema>>,
    fingerprints: HashMap<NodeId, String>,
    inline_content: HashMap<NodeId, Vec<u8>>,
    selected: Option<NodeId>,
    next_node_id: NodeId,
    next_edge_id: EdgeId,
    store: LargeContentStore,
}

impl FlowGraph {
    pub fn new(store: LargeContentStore) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            results: HashMap::new(),
            schema_cache: HashMap::new(),
            fingerprints: HashMap::new(),
            inline_content: HashMap::new(),
            selected: None,
            next_node_id: 1,
            next_edge_id: 1,
            store,
        }
    }

    // ---- node commands -------------------------------------------------

    pub fn add_node(&mut self, node_type: NodeType, x: f64, y: f64) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        let node = Node::new(id, node_type, x, y);
        self.fingerprints.insert(id, fingerprint(&node.settings));
        self.nodes.insert(id, node);
        self.recompute_schemas();
        id
    }

    pub fn update_node(&mut self, id: NodeId, patch: NodePatch) -> Result<(), FlowError> {
        let node = self.nodes.get_mut(&id).ok_or(FlowError::UnknownNode(id))?;
        if let Some((x, y)) = patch.position {
            node.x = x;
            node.y = y;
        }
        if let Some(description) = patch.description {
            node.description = description;
        }
        if let Some(settings) = patch.settings {
            node.settings = settings;
            let fp = fingerprint(&node.settings);
            self.fingerprints.insert(id, fp);
        }
        self.recompute_schemas();
        Ok(())
    }

    pub fn update_node_settings(&mut self, id: NodeId, settings: NodeSettings) -> Result<(), FlowError> {
        self.update_node(id, NodePatch { settings: Some(settings), ..Default::default() })
    }

    pub fn remove_node(&mut self, id: NodeId) -> Result<(), FlowError> {
        if self.nodes.remove(&id).is_none() {
            // Idempotent: removing an absent node is not an error (testable property 7).
            return Ok(());
        }
        self.edges.retain(|_, e| e.source_node != id && e.target_node != id);
        self.results.remove(&id);
        self.schema_cache.remove(&id);
        self.fingerprints.remove(&id);
        self.inline_content.remove(&id);
        let _ = self.store.delete(id);
        if self.selected == Some(id) {
            self.selected = None;
        }
        log::debug!(target: "flow_graph", "removed node {id}");
        self.recompute_schemas();
        Ok(())
    }

    /// Insert a node with an explicit identity, bumping the id counter so subsequently
    /// minted ids never collide. Used by Flow Serialisation to rebuild a document's
    /// nodes with their original ids on import.
    pub fn insert_node(&mut self, node: Node) {
        self.next_node_id = self.next_node_id.max(node.id + 1);
        self.fingerprints.insert(node.id, fingerprint(&node.settings));
        self.nodes.insert(node.id, node);
    }

    pub fn select_node(&mut self, id: Option<NodeId>) {
        self.selected = id;
    }

    pub fn selected_node(&self) -> Option<NodeId> {
        self.selected
    }

    // ---- edge commands --------------------------------------------------

    pub fn add_edge(
        &mut self,
        source_node: NodeId,
        source_handle: Handle,
        target_node: NodeId,
        target_handle: Handle,
    ) -> Result<EdgeId, FlowError> {
        if !self.nodes.contains_key(&source_node) {
            return Err(FlowError::UnknownNode(source_node));
        }
        if !self.nodes.contains_key(&target_node) {
            return Err(FlowError::UnknownNode(target_node));
        }

        let duplicate = self.edges.values().any(|e| {
            (e.source_node, e.source_handle, e.target_node, e.target_handle)
                == (source_node, source_handle, target_node, target_handle)
                || (e.target_node, e.target_handle) == (target_node, target_handle)
        });
        if duplicate {
            return Err(FlowError::DuplicateEdge);
        }

        let existing: Vec<&Edge> = self.edges.values().collect();
        if source_node == target_node || topo::is_reachable(target_node, source_node, &existing) {
            return Err(FlowError::CycleDetected);
        }

        let id = self.next_edge_id;
        self.next_edge_id += 1;
        self.edges.insert(id, Edge { id, source_node, source_handle, target_node, target_handle });
        log::debug!(target: "flow_graph", "added edge {id}: {source_node} -> {target_node}");
        self.recompute_schemas();
        Ok(id)
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Result<(), FlowError> {
        if self.edges.remove(&id).is_none() {
            return Err(FlowError::UnknownEdge(id));
        }
        self.recompute_schemas();
        Ok(())
    }

    // ---- large content ----------------------------------------------------

    /// Route `content` through the Large-Content Store per its size policy; retrieval
    /// is transparent to the caller regardless of where the bytes end up living.
    pub fn set_file_content(&mut self, node_id: NodeId, content: Vec<u8>) -> Result<(), FlowError> {
        if !self.nodes.contains_key(&node_id) {
            return Err(FlowError::UnknownNode(node_id));
        }
        match policy(&content) {
            Placement::Inline => {
                self.store.delete(node_id)?;
                self.inline_content.insert(node_id, content);
            }
            Placement::Persistent => {
                self.inline_content.remove(&node_id);
                self.store.put(node_id, &content)?;
            }
        }
        Ok(())
    }

    pub fn get_file_content(&self, node_id: NodeId) -> Result<Option<Vec<u8>>, FlowError> {
        if let Some(content) = self.inline_content.get(&node_id) {
            return Ok(Some(content.clone()));
        }
        Ok(self.store.get(node_id)?)
    }

    // ---- whole-document commands -------------------------------------------

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.results.clear();
        self.schema_cache.clear();
        self.fingerprints.clear();
        self.inline_content.clear();
        let _ = self.store.clear();
        self.selected = None;
    }

    // ---- queries ------------------------------------------------------------

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    pub fn get_edges(&self) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self.edges.values().collect();
        edges.sort_by_key(|e| e.id);
        edges
    }

    pub fn get_node_result(&self, id: NodeId) -> Option<&NodeResult> {
        self.results.get(&id)
    }

    /// Record an execution outcome. Called by the Execution Engine, not by document
    /// mutation commands — results are never invalidated by a settings/edge change until
    /// the node is actually re-run.
    pub fn set_node_result(&mut self, id: NodeId, result: NodeResult) {
        self.results.insert(id, result);
    }

    pub fn get_node_schema(&self, id: NodeId) -> Option<Schema> {
        self.schema_cache.get(&id).cloned().flatten()
    }

    pub fn get_node_input_schema(&self, id: NodeId) -> Option<Schema> {
        self.left_input_id(id).and_then(|left| self.get_node_schema(left))
    }

    pub fn get_left_input_schema(&self, id: NodeId) -> Option<Schema> {
        self.get_node_input_schema(id)
    }

    pub fn get_right_input_schema(&self, id: NodeId) -> Option<Schema> {
        self.right_input_id(id).and_then(|right| self.get_node_schema(right))
    }

    /// Settings fingerprint, used by the Execution Engine and schema cache to decide
    /// whether previously produced results are still valid without re-running inference.
    pub fn settings_fingerprint(&self, id: NodeId) -> Option<&str> {
        self.fingerprints.get(&id).map(String::as_str)
    }

    /// True iff the node's settings carry enough information to attempt execution
    /// (SPEC_FULL.md §4.D `is_setup`).
    pub fn is_setup(&self, id: NodeId) -> bool {
        self.nodes.get(&id).map(|n| n.settings.is_minimally_configured()).unwrap_or(false)
    }

    /// Ordered upstream node identities, derived purely from edges (by ascending target
    /// handle index, then by edge id for ties).
    pub fn input_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut incoming: Vec<&Edge> = self.edges.values().filter(|e| e.target_node == id).collect();
        incoming.sort_by_key(|e| (e.target_handle.index, e.id));
        incoming.into_iter().map(|e| e.source_node).collect()
    }

    pub fn left_input_id(&self, id: NodeId) -> Option<NodeId> {
        self.edges
            .values()
            .find(|e| e.target_node == id && e.target_handle == Handle { kind: HandleKind::Input, index: 0 })
            .map(|e| e.source_node)
    }

    pub fn right_input_id(&self, id: NodeId) -> Option<NodeId> {
        self.edges
            .values()
            .find(|e| e.target_node == id && e.target_handle == Handle { kind: HandleKind::Input, index: 1 })
            .map(|e| e.source_node)
    }

    pub fn topological_order(&self) -> Result<Vec<NodeId>, FlowError> {
        let all: HashSet<NodeId> = self.nodes.keys().copied().collect();
        self.topological_order_subset(&all)
    }

    /// Topological order restricted to `subset`, used by the Execution Engine for
    /// single-node passes (target + its transitive ancestors).
    pub fn topological_order_subset(&self, subset: &HashSet<NodeId>) -> Result<Vec<NodeId>, FlowError> {
        let edges: Vec<&Edge> = self.edges.values().collect();
        topo::topological_order(subset, &edges)
    }

    /// `id`'s transitive ancestors, not including `id` itself.
    pub fn ancestors(&self, id: NodeId) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut stack = self.input_ids(id);
        while let Some(node) = stack.pop() {
            if seen.insert(node) {
                stack.extend(self.input_ids(node));
            }
        }
        seen
    }

    /// Force a full schema cache rebuild. Callers that batch several `insert_node`/edge
    /// mutations (Flow Serialisation's import path) call this once at the end instead of
    /// paying the recompute cost after every insertion.
    pub fn refresh_schemas(&mut self) {
        self.recompute_schemas();
    }

    // ---- internal ------------------------------------------------------------

    fn recompute_schemas(&mut self) {
        let order = match self.topological_order() {
            Ok(order) => order,
            Err(_) => return,
        };
        for id in order {
            let node = match self.nodes.get(&id) {
                Some(n) => n,
                None => continue,
            };
            let left = self.left_input_id(id).and_then(|l| self.schema_cache.get(&l).cloned().flatten());
            let right = self.right_input_id(id).and_then(|r| self.schema_cache.get(&r).cloned().flatten());
            let schema = flow_schema::infer(&node.settings, left.as_ref(), right.as_ref());
            self.schema_cache.insert(id, schema);
        }
    }
}

fn fingerprint(settings: &NodeSettings) -> String {
    let bytes = serde_json::to_vec(settings).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
