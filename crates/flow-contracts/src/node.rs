//! Node identity and the closed node-type taxonomy.

use serde::{Deserialize, Serialize};

use crate::settings::NodeSettings;

/// Unique identifier for a node. Monotonic and positive within a document, and never
/// reused across the lifetime of a document (Data Model invariant, spec.md §3).
pub type NodeId = u64;

/// The closed set of node types a document may contain (spec.md §6 "Node type
/// taxonomy"). `Head`/`Sample` and `Preview`/`ExploreData` are the same operator under
/// two accepted spellings on the wire; the canonical Rust name is used internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    ReadCsv,
    ManualInput,
    #[serde(rename = "external-data")]
    ExternalData,
    Filter,
    Select,
    GroupBy,
    Join,
    Sort,
    Unique,
    #[serde(alias = "sample")]
    Head,
    Pivot,
    Unpivot,
    PolarsCode,
    #[serde(alias = "explore_data")]
    Preview,
    Output,
    #[serde(rename = "external-output")]
    ExternalOutput,
}

impl NodeType {
    /// True for nodes that produce a dataframe without upstream input.
    pub fn is_source(self) -> bool {
        matches!(self, NodeType::ReadCsv | NodeType::ManualInput | NodeType::ExternalData)
    }

    /// True for nodes whose output schema is identical to their (single) input schema.
    pub fn is_pass_through(self) -> bool {
        matches!(
            self,
            NodeType::Filter | NodeType::Sort | NodeType::Unique | NodeType::Head | NodeType::Preview
        )
    }

    /// True for the one binary operator in the taxonomy.
    pub fn is_binary(self) -> bool {
        matches!(self, NodeType::Join)
    }

    /// The canonical wire string for this node type, matching the taxonomy in spec.md §6.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::ReadCsv => "read_csv",
            NodeType::ManualInput => "manual_input",
            NodeType::ExternalData => "external-data",
            NodeType::Filter => "filter",
            NodeType::Select => "select",
            NodeType::GroupBy => "group_by",
            NodeType::Join => "join",
            NodeType::Sort => "sort",
            NodeType::Unique => "unique",
            NodeType::Head => "head",
            NodeType::Pivot => "pivot",
            NodeType::Unpivot => "unpivot",
            NodeType::PolarsCode => "polars_code",
            NodeType::Preview => "preview",
            NodeType::Output => "output",
            NodeType::ExternalOutput => "external-output",
        }
    }
}

/// A node instance: identity, type, canvas position (opaque to the engine), settings,
/// an optional stable reference used as the code-emission binding name, and a free-text
/// description (supplemented from the original Flowfile project's node metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    pub x: f64,
    pub y: f64,
    pub settings: NodeSettings,
    #[serde(default)]
    pub node_reference: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl Node {
    /// Create a node with default settings derived from `node_type`.
    pub fn new(id: NodeId, node_type: NodeType, x: f64, y: f64) -> Self {
        Self {
            id,
            node_type,
            x,
            y,
            settings: NodeSettings::default_for(node_type),
            node_reference: None,
            description: String::new(),
        }
    }

    /// The binding name the Execution Engine uses for this node's lazy handle:
    /// `nodeReference` if present and non-empty, else `df_<id>`.
    pub fn binding_name(&self) -> String {
        match &self.node_reference {
            Some(r) if !r.is_empty() && is_valid_identifier(r) => r.clone(),
            _ => format!("df_{}", self.id),
        }
    }
}

fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
