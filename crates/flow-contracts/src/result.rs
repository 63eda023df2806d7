//! The materialised outcome of running a node: schema, a capped row preview, and
//! success/failure status (spec.md §3 `NodeResult`).

use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// The maximum number of rows a preview may ever contain, per spec.md §9's default (and
/// the open question it raises: hosts MAY request a larger cap but the engine never
/// defaults above this).
pub const PREVIEW_ROW_CAP: usize = 100;

/// A capped, row-major rendering of a dataframe's head, plus the true row count of the
/// full (uncapped) result so callers can tell a preview was truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub total_rows: usize,
}

impl PreviewData {
    pub fn empty(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new(), total_rows: 0 }
    }

    /// True if `total_rows` exceeds the number of rows actually carried in `rows`.
    pub fn is_truncated(&self) -> bool {
        self.total_rows > self.rows.len()
    }
}

/// The outcome of evaluating a single node. `success == false` always pairs with
/// `error.is_some()`; a successful result always carries a schema, and carries preview
/// data only when the node was actually materialised (as opposed to schema-only dry-run
/// inference, spec.md §4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub success: bool,
    #[serde(default)]
    pub schema: Option<Schema>,
    #[serde(default)]
    pub data: Option<PreviewData>,
    #[serde(default)]
    pub error: Option<String>,
}

impl NodeResult {
    pub fn ok(schema: Schema, data: Option<PreviewData>) -> Self {
        Self { success: true, schema: Some(schema), data, error: None }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, schema: None, data: None, error: Some(message.into()) }
    }
}
