//! The on-disk document shape, kept deliberately separate from `flow_contracts::Node` —
//! the document carries *derived* fields (`is_start_node`, `input_ids`, ...) that the
//! live graph computes on demand but a file on disk must store explicitly.

use flow_contracts::{NodeId, NodeSettings, NodeType};
use serde::{Deserialize, Serialize};

pub const CURRENT_DOCUMENT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ExecutionMode {
    #[default]
    Development,
    Performance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionLocation {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowfileSettings {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub execution_location: ExecutionLocation,
    #[serde(default)]
    pub auto_save: bool,
    #[serde(default)]
    pub show_detailed_progress: bool,
}

impl Default for FlowfileSettings {
    fn default() -> Self {
        Self {
            description: String::new(),
            execution_mode: ExecutionMode::default(),
            execution_location: ExecutionLocation::default(),
            auto_save: false,
            show_detailed_progress: false,
        }
    }
}

/// A node as it appears on disk: its identity and settings, plus every field the live
/// graph derives from edges. `outputs` is advisory only — a hint for document readers,
/// never consulted by `import` to reconstruct edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub is_start_node: bool,
    #[serde(default)]
    pub description: String,
    pub x_position: f64,
    pub y_position: f64,
    #[serde(default)]
    pub input_ids: Vec<NodeId>,
    #[serde(default)]
    pub left_input_id: Option<NodeId>,
    #[serde(default)]
    pub right_input_id: Option<NodeId>,
    #[serde(default)]
    pub outputs: Vec<String>,
    pub setting_input: NodeSettings,
    #[serde(default)]
    pub node_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDocument {
    pub flowfile_version: String,
    pub flowfile_id: i64,
    pub flowfile_name: String,
    pub flowfile_settings: FlowfileSettings,
    pub nodes: Vec<SerializedNode>,
}
